//! Bump-allocated node arena.
//!
//! Every expression node lives in one thread-local [`TreePool`]. Nodes are
//! appended at the end of the pool and never freed individually: the only
//! way to release memory is [`tidy_from`], which drops every node allocated
//! at or after a saved [`Cursor`]. Handles carry the generation of the slot
//! they point to, so a handle that outlived a tidy is detected instead of
//! silently reading a recycled slot.

use std::cell::{Cell, RefCell};

use crate::checkpoint::Interruption;
use crate::expression::{Expression, ExpressionNode};

/// Default arena ceiling in bytes.
pub const DEFAULT_POOL_CAPACITY: usize = 256 * 1024;

/// The host poll hook is consulted once every this many allocations or
/// rewrite steps.
const POLL_INTERVAL: u32 = 64;

pub type PoolResult<T = Expression> = Result<T, Interruption>;

/// High-water mark of the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cursor {
  nodes: usize,
  bytes: usize,
}

impl Cursor {
  pub const ORIGIN: Cursor = Cursor { nodes: 0, bytes: 0 };

  pub fn node_count(&self) -> usize {
    self.nodes
  }

  pub fn bytes(&self) -> usize {
    self.bytes
  }
}

struct Slot {
  generation: u32,
  size: usize,
  node: ExpressionNode,
}

pub struct TreePool {
  slots: Vec<Slot>,
  used_bytes: usize,
  capacity: usize,
  generation: u32,
  scheduled_interruption: Option<usize>,
  step_budget: Option<usize>,
  poll_countdown: u32,
}

impl Default for TreePool {
  fn default() -> Self {
    Self::new()
  }
}

impl TreePool {
  pub fn new() -> Self {
    TreePool {
      slots: Vec::new(),
      used_bytes: 0,
      capacity: DEFAULT_POOL_CAPACITY,
      generation: 0,
      scheduled_interruption: None,
      step_budget: None,
      poll_countdown: POLL_INTERVAL,
    }
  }

  fn cursor(&self) -> Cursor {
    Cursor {
      nodes: self.slots.len(),
      bytes: self.used_bytes,
    }
  }

  fn alloc(&mut self, node: ExpressionNode) -> PoolResult {
    if let Some(remaining) = self.scheduled_interruption.as_mut() {
      if *remaining == 0 {
        self.scheduled_interruption = None;
        return Err(Interruption::UserCancel);
      }
      *remaining -= 1;
    }
    let size = node.record_size();
    if self.used_bytes + size > self.capacity {
      return Err(Interruption::ArenaExhausted);
    }
    let index = u32::try_from(self.slots.len())
      .map_err(|_| Interruption::ArenaExhausted)?;
    self.used_bytes += size;
    self.slots.push(Slot {
      generation: self.generation,
      size,
      node,
    });
    Ok(Expression::from_raw(index, self.generation))
  }

  fn slot(&self, e: Expression) -> Option<&Slot> {
    self
      .slots
      .get(e.index() as usize)
      .filter(|slot| slot.generation == e.generation())
  }

  fn tidy_from(&mut self, cursor: Cursor) {
    if cursor.nodes >= self.slots.len() {
      return;
    }
    let freed: usize = self.slots[cursor.nodes..].iter().map(|s| s.size).sum();
    self.slots.truncate(cursor.nodes);
    self.used_bytes -= freed;
    debug_assert_eq!(self.used_bytes, cursor.bytes);
    self.generation = self.generation.wrapping_add(1);
  }

  fn should_poll(&mut self) -> bool {
    self.poll_countdown -= 1;
    if self.poll_countdown == 0 {
      self.poll_countdown = POLL_INTERVAL;
      true
    } else {
      false
    }
  }
}

thread_local! {
  static POOL: RefCell<TreePool> = RefCell::new(TreePool::new());
  // Set by the host (or a poll hook) to cancel the running reduction
  static INTERRUPTION_REQUESTED: Cell<bool> = const { Cell::new(false) };
  static INTERRUPTION_POLL: Cell<Option<fn() -> bool>> = const { Cell::new(None) };
}

fn poll_host() -> PoolResult<()> {
  if let Some(poll) = INTERRUPTION_POLL.with(Cell::get) {
    if poll() {
      INTERRUPTION_REQUESTED.with(|r| r.set(true));
    }
  }
  if INTERRUPTION_REQUESTED.with(Cell::get) {
    return Err(Interruption::UserCancel);
  }
  Ok(())
}

pub(crate) fn alloc(node: ExpressionNode) -> PoolResult {
  let poll = POOL.with(|p| p.borrow_mut().should_poll());
  if poll || INTERRUPTION_REQUESTED.with(Cell::get) {
    poll_host()?;
  }
  POOL.with(|p| p.borrow_mut().alloc(node))
}

/// Runs `f` on the node behind `e`.
///
/// # Panics
///
/// Panics if `e` was tidied away.
pub(crate) fn with_node<R>(e: Expression, f: impl FnOnce(&ExpressionNode) -> R) -> R {
  POOL.with(|p| {
    let pool = p.borrow();
    let slot = pool.slot(e).unwrap_or_else(|| {
      panic!(
        "stale expression handle #{} (generation {})",
        e.index(),
        e.generation()
      )
    });
    f(&slot.node)
  })
}

/// Returns whether the node behind `e` is still allocated.
pub fn is_valid(e: Expression) -> bool {
  POOL.with(|p| p.borrow().slot(e).is_some())
}

pub fn cursor() -> Cursor {
  POOL.with(|p| p.borrow().cursor())
}

/// Frees every node allocated at or after `cursor`.
pub fn tidy_from(cursor: Cursor) {
  POOL.with(|p| p.borrow_mut().tidy_from(cursor));
}

/// Empties the pool and forgets any pending interruption.
pub fn clear_pool() {
  POOL.with(|p| {
    let mut pool = p.borrow_mut();
    pool.tidy_from(Cursor::ORIGIN);
    pool.scheduled_interruption = None;
    pool.step_budget = None;
  });
  INTERRUPTION_REQUESTED.with(|r| r.set(false));
}

pub fn set_pool_capacity(bytes: usize) {
  POOL.with(|p| p.borrow_mut().capacity = bytes);
}

pub fn pool_capacity() -> usize {
  POOL.with(|p| p.borrow().capacity)
}

pub fn used_bytes() -> usize {
  POOL.with(|p| p.borrow().used_bytes)
}

pub fn node_count() -> usize {
  POOL.with(|p| p.borrow().slots.len())
}

/// Asks the running reduction to stop at its next allocation or step.
pub fn request_interruption() {
  INTERRUPTION_REQUESTED.with(|r| r.set(true));
}

/// Installs a hook polled at bounded intervals during reduction, for hosts
/// that detect cancellation themselves (e.g. a key press).
pub fn set_interruption_poll(poll: Option<fn() -> bool>) {
  INTERRUPTION_POLL.with(|p| p.set(poll));
}

/// Makes the allocation after the next `after_allocations` ones fail with
/// [`Interruption::UserCancel`].
pub fn schedule_interruption(after_allocations: usize) {
  POOL.with(|p| p.borrow_mut().scheduled_interruption = Some(after_allocations));
}

pub fn cancel_scheduled_interruption() {
  POOL.with(|p| p.borrow_mut().scheduled_interruption = None);
}

pub(crate) fn clear_interruption_request() {
  INTERRUPTION_REQUESTED.with(|r| r.set(false));
}

/// Installs a rewrite step budget, returning the previous one.
pub(crate) fn replace_step_budget(budget: Option<usize>) -> Option<usize> {
  POOL.with(|p| std::mem::replace(&mut p.borrow_mut().step_budget, budget))
}

/// Accounts for one rewrite step.
pub(crate) fn tick() -> PoolResult<()> {
  let (exhausted, poll) = POOL.with(|p| {
    let mut pool = p.borrow_mut();
    let poll = pool.should_poll();
    let exhausted = match pool.step_budget.as_mut() {
      Some(0) => true,
      Some(budget) => {
        *budget -= 1;
        false
      }
      None => false,
    };
    (exhausted, poll)
  });
  if exhausted {
    return Err(Interruption::Deadline);
  }
  if poll || INTERRUPTION_REQUESTED.with(Cell::get) {
    poll_host()?;
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expression::Expression;

  #[test]
  fn tidy_restores_cursor_and_invalidates_handles() {
    clear_pool();
    let kept = Expression::integer(1).unwrap();
    let mark = cursor();
    let dropped = Expression::integer(2).unwrap();
    assert!(is_valid(dropped));
    tidy_from(mark);
    assert_eq!(cursor(), mark);
    assert!(is_valid(kept));
    assert!(!is_valid(dropped));
    let reused = Expression::integer(3).unwrap();
    assert_eq!(reused.index(), dropped.index());
    assert!(!is_valid(dropped));
  }

  #[test]
  fn capacity_is_a_hard_ceiling() {
    clear_pool();
    set_pool_capacity(200);
    let mut result = Ok(());
    for i in 0..100 {
      if let Err(e) = Expression::integer(i) {
        result = Err(e);
        break;
      }
    }
    assert_eq!(result, Err(Interruption::ArenaExhausted));
    assert!(used_bytes() <= 200);
    set_pool_capacity(DEFAULT_POOL_CAPACITY);
    clear_pool();
  }

  #[test]
  fn scheduled_interruption_fires_once() {
    clear_pool();
    schedule_interruption(2);
    assert!(Expression::integer(1).is_ok());
    assert!(Expression::integer(2).is_ok());
    assert_eq!(Expression::integer(3).err(), Some(Interruption::UserCancel));
    assert!(Expression::integer(4).is_ok());
  }

  #[test]
  fn step_budget_yields_deadline() {
    clear_pool();
    let previous = replace_step_budget(Some(1));
    assert!(tick().is_ok());
    assert_eq!(tick(), Err(Interruption::Deadline));
    replace_step_budget(previous);
  }
}
