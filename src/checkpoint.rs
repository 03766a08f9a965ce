//! Interruption-catching boundaries over the node pool.

use log::debug;
use thiserror::Error;

use crate::pool::{self, Cursor};

/// Rewrite steps a checkpointed body may take before it is stopped.
pub const DEFAULT_STEP_BUDGET: usize = 100_000;

/// Why a checkpointed operation stopped before completing.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interruption {
  #[error("interrupted by the user")]
  UserCancel,
  #[error("reduction exceeded its step budget")]
  Deadline,
  #[error("expression pool exhausted")]
  ArenaExhausted,
}

impl Interruption {
  /// Whether retrying the same request with less work can succeed.
  pub fn is_resource_limit(self) -> bool {
    matches!(self, Interruption::Deadline | Interruption::ArenaExhausted)
  }
}

/// A saved pool cursor plus the boundary that rolls back to it.
#[derive(Debug)]
pub struct Checkpoint {
  cursor: Cursor,
  step_budget: usize,
}

impl Default for Checkpoint {
  fn default() -> Self {
    Self::new()
  }
}

impl Checkpoint {
  pub fn new() -> Self {
    Checkpoint {
      cursor: pool::cursor(),
      step_budget: DEFAULT_STEP_BUDGET,
    }
  }

  pub fn with_step_budget(mut self, steps: usize) -> Self {
    self.step_budget = steps;
    self
  }

  pub fn cursor(&self) -> Cursor {
    self.cursor
  }

  /// Runs `body`. If it is interrupted, every node it allocated is freed
  /// and the interruption is returned as the aborted outcome.
  ///
  /// Only nodes above this checkpoint's own cursor are tidied, so handles
  /// held by enclosing checkpoints stay valid.
  pub fn run<T>(
    self,
    body: impl FnOnce() -> Result<T, Interruption>,
  ) -> Result<T, Interruption> {
    let outer_budget = pool::replace_step_budget(None);
    // An inner boundary never outlives what the enclosing one has left
    let budget = outer_budget.map_or(self.step_budget, |outer| outer.min(self.step_budget));
    pool::replace_step_budget(Some(budget));
    let result = body();
    match outer_budget {
      // Steps taken here count against the enclosing budget too.
      Some(outer) => {
        let left = pool::replace_step_budget(None).unwrap_or(0);
        let spent = budget.saturating_sub(left);
        pool::replace_step_budget(Some(outer.saturating_sub(spent)));
      }
      None => {
        pool::replace_step_budget(None);
      }
    }
    if let Err(interruption) = result {
      debug!(
        "checkpoint aborted ({}), tidying {} nodes",
        interruption,
        pool::node_count().saturating_sub(self.cursor.node_count())
      );
      pool::tidy_from(self.cursor);
      if interruption == Interruption::UserCancel {
        pool::clear_interruption_request();
      }
    }
    result
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expression::Expression;

  #[test]
  fn aborted_body_is_rolled_back() {
    pool::clear_pool();
    let before = pool::cursor();
    let outcome = Checkpoint::new().run(|| {
      Expression::integer(1)?;
      Expression::integer(2)?;
      Err::<(), _>(Interruption::ArenaExhausted)
    });
    assert_eq!(outcome, Err(Interruption::ArenaExhausted));
    assert_eq!(pool::cursor(), before);
  }

  #[test]
  fn inner_checkpoint_keeps_outer_nodes() {
    pool::clear_pool();
    let outcome = Checkpoint::new().run(|| {
      let outer = Expression::integer(7)?;
      let inner = Checkpoint::new().run(|| {
        Expression::integer(8)?;
        Err::<(), _>(Interruption::Deadline)
      });
      assert_eq!(inner, Err(Interruption::Deadline));
      assert!(pool::is_valid(outer));
      Ok(outer)
    });
    let outer = outcome.unwrap();
    assert!(outer.is_identical_to(Expression::integer(7).unwrap()));
  }

  #[test]
  fn inner_budget_is_capped_by_the_outer_one() {
    pool::clear_pool();
    let mut ticks = 0;
    let outcome = Checkpoint::new().with_step_budget(10).run(|| {
      Checkpoint::new().run(|| {
        for _ in 0..20 {
          pool::tick()?;
          ticks += 1;
        }
        Ok(())
      })
    });
    assert_eq!(outcome, Err(Interruption::Deadline));
    assert_eq!(ticks, 10);
  }

  #[test]
  fn user_cancel_is_consumed() {
    pool::clear_pool();
    let outcome = Checkpoint::new().run(|| {
      pool::request_interruption();
      Expression::integer(1)
    });
    assert_eq!(outcome.err(), Some(Interruption::UserCancel));
    assert!(Expression::integer(2).is_ok());
  }
}
