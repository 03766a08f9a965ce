//! The one traversal behind every "does this tree have property X" query.

use std::cell::RefCell;

use crate::context::SymbolicComputation;
use crate::expression::{Expression, NodeKind, PARAMETER_CHILD_INDEX};
use crate::pool::{self, PoolResult};
use crate::symbols::{self, Resolution, SymbolStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrinaryBoolean {
  True,
  False,
  /// Look at the children to decide.
  Unknown,
}

impl From<bool> for TrinaryBoolean {
  fn from(value: bool) -> Self {
    if value {
      TrinaryBoolean::True
    } else {
      TrinaryBoolean::False
    }
  }
}

/// Variables bound by the enclosing parametered expressions, innermost
/// first. Lives on the stack of the traversal that pushed it.
#[derive(Debug, Clone, Copy)]
pub struct IgnoredSymbols<'a> {
  symbol: Expression,
  parent: Option<&'a IgnoredSymbols<'a>>,
}

impl<'a> IgnoredSymbols<'a> {
  pub fn new(symbol: Expression, parent: Option<&'a IgnoredSymbols<'a>>) -> Self {
    IgnoredSymbols { symbol, parent }
  }

  pub fn contains(&self, name: &str) -> bool {
    let mut scope = Some(self);
    while let Some(entry) = scope {
      if entry.symbol.is_symbol_named(name) {
        return true;
      }
      scope = entry.parent;
    }
    false
  }
}

/// Whether `e` is a symbol bound by one of the scopes in `ignored`.
pub fn is_ignored(e: Expression, ignored: Option<&IgnoredSymbols<'_>>) -> bool {
  match (ignored, e.kind()) {
    (Some(scope), NodeKind::Symbol(name)) => scope.contains(&name),
    _ => false,
  }
}

/// The scope a parametered node opens for its body.
pub fn scope_of<'a>(
  parametered: Expression,
  parent: Option<&'a IgnoredSymbols<'a>>,
) -> IgnoredSymbols<'a> {
  IgnoredSymbols::new(parametered.child(PARAMETER_CHILD_INDEX), parent)
}

/// Evaluates `test` at `e`; `Unknown` recurses into the children and ORs
/// their results. Dependencies only expose their main expression, symbols
/// and functions are looked through when `policy` replaces them, and bound
/// variables of parametered expressions never match.
///
/// Definitions expanded on the way are freed before returning.
pub fn recursively_matches(
  e: Expression,
  test: &dyn Fn(Expression) -> TrinaryBoolean,
  store: Option<&SymbolStore>,
  policy: SymbolicComputation,
) -> PoolResult<bool> {
  let cursor = pool::cursor();
  let result = matches_in_scope(e, test, store, policy, None);
  pool::tidy_from(cursor);
  result
}

pub(crate) fn matches_in_scope(
  e: Expression,
  test: &dyn Fn(Expression) -> TrinaryBoolean,
  store: Option<&SymbolStore>,
  policy: SymbolicComputation,
  ignored: Option<&IgnoredSymbols<'_>>,
) -> PoolResult<bool> {
  if is_ignored(e, ignored) {
    return Ok(false);
  }
  match test(e) {
    TrinaryBoolean::True => return Ok(true),
    TrinaryBoolean::False => return Ok(false),
    TrinaryBoolean::Unknown => {}
  }
  let kind = e.kind();
  match &kind {
    NodeKind::Dependency => {
      return matches_in_scope(e.child(0), test, store, policy, ignored);
    }
    NodeKind::Symbol(_) | NodeKind::Function(_) => {
      let expands = if matches!(kind, NodeKind::Symbol(_)) {
        policy.replaces_symbols()
      } else {
        policy.replaces_functions()
      };
      if let (true, Some(store)) = (expands, store) {
        match symbols::expand(e, store, policy)? {
          Some(Resolution::Resolved(definition)) => {
            return matches_in_scope(definition, test, Some(store), policy, ignored);
          }
          Some(Resolution::Circular) => return Ok(false),
          // Undefined: arguments of a function call are still inspected
          None => {}
        }
      }
    }
    _ => {}
  }
  any_child_matches(e, &kind, test, store, policy, ignored)
}

fn any_child_matches(
  e: Expression,
  kind: &NodeKind,
  test: &dyn Fn(Expression) -> TrinaryBoolean,
  store: Option<&SymbolStore>,
  policy: SymbolicComputation,
  ignored: Option<&IgnoredSymbols<'_>>,
) -> PoolResult<bool> {
  let children = e.children();
  let parametered = kind.is_parametered();
  let scope = if parametered {
    Some(scope_of(e, ignored))
  } else {
    None
  };
  // Backwards, so list and matrix entries of n-ary nodes are found early
  for (i, child) in children.iter().enumerate().rev() {
    if parametered && i == PARAMETER_CHILD_INDEX {
      continue;
    }
    let child_scope = match (&scope, i) {
      (Some(scope), 0) => Some(scope),
      _ => ignored,
    };
    if matches_in_scope(*child, test, store, policy, child_scope)? {
      return Ok(true);
    }
  }
  Ok(false)
}

fn matches_kind(e: Expression, test: impl Fn(&NodeKind) -> bool) -> PoolResult<bool> {
  recursively_matches(
    e,
    &|node| {
      if node.matches_kind(&test) {
        TrinaryBoolean::True
      } else {
        TrinaryBoolean::Unknown
      }
    },
    None,
    SymbolicComputation::KeepAllSymbols,
  )
}

pub fn is_undefined_somewhere(e: Expression) -> PoolResult<bool> {
  matches_kind(e, |k| matches!(k, NodeKind::Undefined))
}

pub fn deep_is_list(e: Expression) -> PoolResult<bool> {
  matches_kind(e, |k| matches!(k, NodeKind::List))
}

pub fn deep_is_matrix(e: Expression) -> PoolResult<bool> {
  matches_kind(e, |k| matches!(k, NodeKind::Matrix { .. }))
}

pub fn deep_is_random(e: Expression) -> PoolResult<bool> {
  matches_kind(e, |k| matches!(k, NodeKind::Random))
}

pub fn deep_is_of_kind(
  e: Expression,
  test: impl Fn(&NodeKind) -> bool,
) -> PoolResult<bool> {
  matches_kind(e, test)
}

/// Whether `name` occurs in `e` outside of the scopes that bind it.
pub fn contains_free_symbol(e: Expression, name: &str) -> PoolResult<bool> {
  recursively_matches(
    e,
    &|node| {
      if node.is_symbol_named(name) {
        TrinaryBoolean::True
      } else {
        TrinaryBoolean::Unknown
      }
    },
    None,
    SymbolicComputation::KeepAllSymbols,
  )
}

/// Whether `e` still depends on a symbol after the definitions `policy`
/// allows were looked through.
pub fn deep_is_symbolic(
  e: Expression,
  store: Option<&SymbolStore>,
  policy: SymbolicComputation,
) -> PoolResult<bool> {
  recursively_matches(
    e,
    &|node| match node.kind() {
      NodeKind::Symbol(name) => {
        let expandable = policy.replaces_symbols()
          && store.is_some_and(|s| s.is_defined(&name));
        if expandable {
          TrinaryBoolean::Unknown
        } else {
          TrinaryBoolean::True
        }
      }
      NodeKind::Function(name) => {
        let expandable = policy.replaces_functions()
          && store.is_some_and(|s| s.is_defined(&name));
        if expandable {
          TrinaryBoolean::Unknown
        } else {
          TrinaryBoolean::True
        }
      }
      _ => TrinaryBoolean::Unknown,
    },
    store,
    policy,
  )
}

/// Names of the free symbols of `e`, in order of first appearance.
pub fn variables(e: Expression) -> PoolResult<Vec<String>> {
  let found = RefCell::new(Vec::<String>::new());
  recursively_matches(
    e,
    &|node| {
      if let NodeKind::Symbol(name) = node.kind() {
        let mut found = found.borrow_mut();
        if !found.contains(&name) {
          found.push(name);
        }
      }
      TrinaryBoolean::Unknown
    },
    None,
    SymbolicComputation::KeepAllSymbols,
  )?;
  Ok(found.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::expression::Expression;

  fn sum_of(body: Expression) -> Expression {
    Expression::sum(
      body,
      Expression::symbol("k").unwrap(),
      Expression::integer(1).unwrap(),
      Expression::integer(10).unwrap(),
    )
    .unwrap()
  }

  #[test]
  fn bound_variable_is_not_free() {
    pool::clear_pool();
    let k = Expression::symbol("k").unwrap();
    let sum = sum_of(k);
    assert!(!contains_free_symbol(sum, "k").unwrap());
    assert!(contains_free_symbol(k, "k").unwrap());
  }

  #[test]
  fn free_symbols_under_a_binder_still_match() {
    pool::clear_pool();
    let k = Expression::symbol("k").unwrap();
    let x = Expression::symbol("x").unwrap();
    let sum = sum_of(Expression::multiplication(vec![k, x]).unwrap());
    assert!(contains_free_symbol(sum, "x").unwrap());
    assert!(!contains_free_symbol(sum, "k").unwrap());
    assert_eq!(variables(sum).unwrap(), vec!["x".to_string()]);
  }

  #[test]
  fn dependencies_only_expose_their_main_expression() {
    pool::clear_pool();
    let one = Expression::integer(1).unwrap();
    let undef = Expression::undefined().unwrap();
    let dependency = Expression::dependency(one, vec![undef]).unwrap();
    assert!(!is_undefined_somewhere(dependency).unwrap());
  }

  #[test]
  fn matching_leaves_no_allocations_behind() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    let definition = Expression::symbol("y").unwrap();
    store.define_symbol("a", definition);
    let a = Expression::symbol("a").unwrap();
    let before = pool::cursor();
    assert!(deep_is_symbolic(
      a,
      Some(&store),
      SymbolicComputation::ReplaceAllDefinedSymbols
    )
    .unwrap());
    assert_eq!(pool::cursor(), before);
  }
}
