//! Rewriting expressions to their canonical exact form.
//!
//! [`deep_reduce`] reduces the children of a node, then the node itself
//! with [`shallow_reduce`], which dispatches on the node kind. Rules never
//! fail on mathematically undefined input: they produce the `undef` node
//! instead. The only errors are [`Interruption`]s, caught by the
//! checkpointed entry points at the bottom of this module.

use log::{debug, trace, warn};

use crate::checkpoint::{Checkpoint, Interruption};
use crate::context::{ReductionContext, ReductionTarget};
use crate::expression::{Constant, Expression, NodeKind, PARAMETER_CHILD_INDEX};
use crate::matcher::{self, scope_of, IgnoredSymbols};
use crate::pool::{self, PoolResult};
use crate::symbols::{self, Resolution};

mod arithmetic;
mod containers;
mod derivative;
mod functions;
mod parametered;

pub(crate) use arithmetic::degree_order;
pub use derivative::derive;

pub(crate) type Scope<'s, 'a> = Option<&'s IgnoredSymbols<'a>>;

/// Reduces `e` bottom-up. `scope` holds the variables bound around `e`.
pub fn deep_reduce(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  pool::tick()?;
  let node = e.node();
  if node.children.is_empty() {
    return shallow_reduce(e, ctx, scope);
  }
  let mut children = Vec::with_capacity(node.children.len());
  if node.kind.is_parametered() {
    // Logarithm expansion blows up under derivatives and integrals
    let inner = match node.kind {
      NodeKind::Integral | NodeKind::Derivative => ctx.with_expand_logarithm(false),
      _ => *ctx,
    };
    let body_scope = scope_of(e, scope);
    for (i, child) in node.children.iter().enumerate() {
      children.push(match i {
        0 => deep_reduce(*child, &inner, Some(&body_scope))?,
        PARAMETER_CHILD_INDEX => *child,
        _ => deep_reduce(*child, ctx, scope)?,
      });
    }
  } else {
    for child in &node.children {
      children.push(deep_reduce(*child, ctx, scope)?);
    }
  }
  let unchanged = children.iter().zip(&node.children).all(|(a, b)| a.same_node(*b));
  let e = if unchanged {
    e
  } else {
    Expression::new(node.kind, children)?
  };
  shallow_reduce(e, ctx, scope)
}

/// Builds the node and reduces it, assuming its children are reduced.
pub(crate) fn reduce_new(
  kind: NodeKind,
  children: Vec<Expression>,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  shallow_reduce(Expression::new(kind, children)?, ctx, scope)
}

fn propagates_undefined(kind: &NodeKind) -> bool {
  !matches!(
    kind,
    NodeKind::List | NodeKind::Matrix { .. } | NodeKind::Dependency
  )
}

fn bubbles_dependencies(kind: &NodeKind) -> bool {
  !kind.is_parametered()
    && !matches!(
      kind,
      NodeKind::List | NodeKind::Matrix { .. } | NodeKind::Dependency
    )
}

fn distributes_over_lists(kind: &NodeKind) -> bool {
  matches!(
    kind,
    NodeKind::Addition
      | NodeKind::Subtraction
      | NodeKind::Multiplication
      | NodeKind::Division
      | NodeKind::Opposite
      | NodeKind::Power
      | NodeKind::SquareRoot
      | NodeKind::NthRoot
      | NodeKind::Factorial
      | NodeKind::AbsoluteValue
      | NodeKind::Floor
      | NodeKind::Ceiling
      | NodeKind::Logarithm
      | NodeKind::NaturalLogarithm
      | NodeKind::Trigonometry(_)
      | NodeKind::Conjugate
      | NodeKind::RealPart
      | NodeKind::ImaginaryPart
      | NodeKind::IntegerFunction(_)
  )
}

/// Applies the rule of the node kind of `e`, whose children are reduced.
pub fn shallow_reduce(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  pool::tick()?;
  let result = dispatch(e, ctx, scope)?;
  if !result.same_node(e) {
    trace!("{} => {}", e, result);
  }
  Ok(result)
}

fn dispatch(e: Expression, ctx: &ReductionContext, scope: Scope<'_, '_>) -> PoolResult {
  let node = e.node();
  let kind = node.kind;
  let children = node.children;
  if propagates_undefined(&kind) && children.iter().any(|c| c.is_undefined()) {
    return Expression::undefined();
  }
  if bubbles_dependencies(&kind)
    && children
      .iter()
      .any(|c| c.matches_kind(|k| matches!(k, NodeKind::Dependency)))
  {
    return containers::bubble_up_dependencies(e, ctx, scope);
  }
  if distributes_over_lists(&kind)
    && children
      .iter()
      .any(|c| c.matches_kind(|k| matches!(k, NodeKind::List)))
  {
    return containers::distribute_over_lists(e, ctx, scope);
  }
  match kind {
    NodeKind::Decimal { .. } => match e.rational_value() {
      Some(value) => Expression::rational(value),
      None => match e.decimal_value() {
        Some(value) if value.is_finite() => Expression::float(value),
        _ => Expression::undefined(),
      },
    },
    NodeKind::Addition => arithmetic::reduce_addition(e, ctx, scope),
    NodeKind::Multiplication => arithmetic::reduce_multiplication(e, ctx, scope),
    NodeKind::Power => arithmetic::reduce_power(e, ctx, scope),
    NodeKind::Subtraction => {
      let negated = reduce_new(
        NodeKind::Multiplication,
        vec![Expression::integer(-1)?, children[1]],
        ctx,
        scope,
      )?;
      reduce_new(NodeKind::Addition, vec![children[0], negated], ctx, scope)
    }
    NodeKind::Division => {
      let inverse = reduce_new(
        NodeKind::Power,
        vec![children[1], Expression::integer(-1)?],
        ctx,
        scope,
      )?;
      reduce_new(NodeKind::Multiplication, vec![children[0], inverse], ctx, scope)
    }
    NodeKind::Opposite => reduce_new(
      NodeKind::Multiplication,
      vec![Expression::integer(-1)?, children[0]],
      ctx,
      scope,
    ),
    NodeKind::SquareRoot => reduce_new(
      NodeKind::Power,
      vec![children[0], Expression::fraction(1, 2)?],
      ctx,
      scope,
    ),
    NodeKind::NthRoot => {
      let exponent = reduce_new(
        NodeKind::Power,
        vec![children[1], Expression::integer(-1)?],
        ctx,
        scope,
      )?;
      reduce_new(NodeKind::Power, vec![children[0], exponent], ctx, scope)
    }
    NodeKind::NaturalLogarithm => reduce_new(
      NodeKind::Logarithm,
      vec![children[0], Expression::constant(Constant::E)?],
      ctx,
      scope,
    ),
    NodeKind::Logarithm => functions::reduce_logarithm(e, ctx, scope),
    NodeKind::Trigonometry(f) => functions::reduce_trigonometry(e, f, ctx, scope),
    NodeKind::AbsoluteValue => functions::reduce_absolute_value(e, ctx, scope),
    NodeKind::Floor | NodeKind::Ceiling => functions::reduce_rounding(e, ctx),
    NodeKind::Factorial => functions::reduce_factorial(e),
    NodeKind::Conjugate | NodeKind::RealPart | NodeKind::ImaginaryPart => {
      functions::reduce_complex_part(e, ctx, scope)
    }
    NodeKind::Comparison(op) => functions::reduce_comparison(e, op),
    NodeKind::ListFunction(f) => containers::reduce_list_function(e, f, ctx, scope),
    NodeKind::IntegerFunction(f) => functions::reduce_integer_function(e, f),
    NodeKind::Dependency => containers::reduce_dependency(e),
    NodeKind::Sum | NodeKind::Product => {
      parametered::reduce_sum_or_product(e, ctx, scope)
    }
    NodeKind::Integral => parametered::reduce_integral(e, ctx, scope),
    NodeKind::Derivative => parametered::reduce_derivative(e, ctx, scope),
    NodeKind::Rational(_)
    | NodeKind::Float(_)
    | NodeKind::Constant(_)
    | NodeKind::Boolean(_)
    | NodeKind::Undefined
    | NodeKind::Random
    | NodeKind::Symbol(_)
    | NodeKind::Function(_)
    | NodeKind::List
    | NodeKind::Matrix { .. } => Ok(e),
  }
}

/// Replaces symbols as `ctx` asks, reduces, and drops the dependencies that
/// no longer carry information. A circular definition reduces to `undef`.
fn reduce_resolved(e: Expression, ctx: &ReductionContext) -> PoolResult {
  let e = match symbols::expression_without_symbols(e, ctx.store, ctx.symbolic_computation)? {
    Resolution::Resolved(e) => e,
    Resolution::Circular => {
      debug!("circular definition, reducing to undef");
      return Expression::undefined();
    }
  };
  let reduced = deep_reduce(e, ctx, None)?;
  containers::remove_resolved_dependencies(reduced)
}

/// Reduces a copy of `e`. If the reduction is interrupted, `e` itself is
/// returned.
pub fn clone_and_reduce(e: Expression, ctx: &ReductionContext) -> Expression {
  Checkpoint::new()
    .run(|| reduce_resolved(e.deep_clone()?, ctx))
    .unwrap_or(e)
}

/// Reduces a copy of `e` under a checkpoint. A reduction stopped by a
/// resource limit is retried once at [`ReductionTarget::SystemForApproximation`].
/// When that fails too, the result is `e` with its symbols replaced (or
/// `undef` if that shows something undefined) and the flag is set.
///
/// With `approximate_during_reduction`, symbol-free subtrees of the result
/// are approximated as by [`crate::approximation::deep_approximate_keeping_symbols`].
pub fn clone_and_deep_reduce_with_system_checkpoint(
  e: Expression,
  ctx: &ReductionContext,
  approximate_during_reduction: bool,
) -> (Expression, bool) {
  let attempt = |ctx: &ReductionContext| {
    Checkpoint::new().run(|| {
      let reduced = reduce_resolved(e.deep_clone()?, ctx)?;
      if approximate_during_reduction {
        crate::approximation::deep_approximate_keeping_symbols(reduced, ctx)
      } else {
        Ok(reduced)
      }
    })
  };
  let interruption = match attempt(ctx) {
    Ok(reduced) => return (reduced, false),
    Err(interruption) => interruption,
  };
  if interruption.is_resource_limit() && ctx.target != ReductionTarget::SystemForApproximation {
    debug!("reduction stopped ({}), retrying for approximation", interruption);
    let cheaper = ctx.with_target(ReductionTarget::SystemForApproximation);
    if let Ok(reduced) = attempt(&cheaper) {
      return (reduced, false);
    }
  }
  warn!("reduction failed ({}), keeping the unreduced expression", interruption);
  (fallback(e, ctx).unwrap_or(e), true)
}

fn fallback(e: Expression, ctx: &ReductionContext) -> Result<Expression, Interruption> {
  Checkpoint::new().run(|| {
    let copy = e.deep_clone()?;
    match symbols::expression_without_symbols(copy, ctx.store, ctx.symbolic_computation)? {
      Resolution::Circular => Expression::undefined(),
      Resolution::Resolved(resolved) => {
        if matcher::is_undefined_somewhere(resolved)? {
          Expression::undefined()
        } else {
          Ok(resolved)
        }
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::symbols::SymbolStore;

  fn reduced(text: &str) -> String {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = crate::parse(text).unwrap();
    clone_and_deep_reduce_with_system_checkpoint(e, &ctx, false)
      .0
      .to_string()
  }

  #[test]
  fn canonical_forms() {
    assert_eq!(reduced("1/2+1/3"), "5/6");
    assert_eq!(reduced("x-x"), "0");
    assert_eq!(reduced("2*x+3*x"), "5*x");
    assert_eq!(reduced("x*x"), "x^2");
    assert_eq!(reduced("1.5"), "3/2");
  }

  #[test]
  fn cancelled_reduction_keeps_the_input() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = crate::parse("(1+x)*(2+x)").unwrap();
    pool::request_interruption();
    let (result, failed) = clone_and_deep_reduce_with_system_checkpoint(e, &ctx, false);
    assert!(failed);
    assert!(result.is_identical_to(e));
  }
}
