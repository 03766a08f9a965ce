use num_traits::{Signed, ToPrimitive};

use super::{deep_reduce, derivative, reduce_new, Scope};
use crate::context::{ReductionContext, ReductionTarget};
use crate::expression::{Expression, NodeKind, Number};
use crate::matcher::{self, scope_of};
use crate::pool::PoolResult;
use crate::symbols::substitute_symbol;

/// Sums and products with at most this many terms are expanded.
const MAX_UNROLLED_TERMS: i64 = 100;
/// Highest derivative order computed symbolically.
const MAX_DERIVATIVE_ORDER: i64 = 10;

pub(super) fn reduce_sum_or_product(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let is_sum = e.matches_kind(|k| matches!(k, NodeKind::Sum));
  let node = e.node();
  let [body, variable, lower, upper] = node.children[..] else {
    return Expression::undefined();
  };
  let Some(name) = variable.symbol_name() else {
    return Expression::undefined();
  };
  let neutral = || Expression::integer(if is_sum { 0 } else { 1 });
  let bounds = (Number::of(lower), Number::of(upper));
  if let (Some(a), Some(b)) = &bounds {
    let (Some(a), Some(b)) = (lower.integer_value(), upper.integer_value()) else {
      // Bounds must be integers
      return if a.is_rational() && b.is_rational() {
        Expression::undefined()
      } else {
        Ok(e)
      };
    };
    if b < a {
      return neutral();
    }
    let count = (&b - &a).to_i64().map(|n| n + 1);
    let unrolls = ctx.target != ReductionTarget::SystemForApproximation
      && count.is_some_and(|n| n <= MAX_UNROLLED_TERMS);
    if unrolls {
      let mut terms = Vec::new();
      let mut k = a;
      while k <= b {
        let value = Expression::big_integer(k.clone())?;
        let instance = substitute_symbol(body, &name, value)?;
        terms.push(deep_reduce(instance, ctx, scope)?);
        k += 1;
      }
      let kind = if is_sum {
        NodeKind::Addition
      } else {
        NodeKind::Multiplication
      };
      return reduce_new(kind, terms, ctx, scope);
    }
  }
  if !matcher::contains_free_symbol(body, &name)? {
    // b-a+1 copies of the body
    let difference = reduce_new(
      NodeKind::Subtraction,
      vec![upper, lower],
      ctx,
      scope,
    )?;
    let count = reduce_new(
      NodeKind::Addition,
      vec![difference, Expression::integer(1)?],
      ctx,
      scope,
    )?;
    return if is_sum {
      reduce_new(NodeKind::Multiplication, vec![count, body], ctx, scope)
    } else {
      reduce_new(NodeKind::Power, vec![body, count], ctx, scope)
    };
  }
  Ok(e)
}

pub(super) fn reduce_integral(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let node = e.node();
  let [body, variable, lower, upper] = node.children[..] else {
    return Expression::undefined();
  };
  let Some(name) = variable.symbol_name() else {
    return Expression::undefined();
  };
  if matcher::contains_free_symbol(body, &name)? {
    return Ok(e);
  }
  let width = reduce_new(NodeKind::Subtraction, vec![upper, lower], ctx, scope)?;
  reduce_new(NodeKind::Multiplication, vec![width, body], ctx, scope)
}

/// Derives the body `order` times, then evaluates at the point. Bodies the
/// derivation rules do not cover stay unreduced.
pub(super) fn reduce_derivative(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let node = e.node();
  let [body, variable, point, order] = node.children[..] else {
    return Expression::undefined();
  };
  let Some(name) = variable.symbol_name() else {
    return Expression::undefined();
  };
  let order = match Number::of(order) {
    None => return Ok(e),
    Some(Number::Rational(r)) if r.is_integer() && !r.is_negative() => r.to_integer(),
    Some(_) => return Expression::undefined(),
  };
  let Some(order) = order.to_i64().filter(|n| *n <= MAX_DERIVATIVE_ORDER) else {
    return Ok(e);
  };
  let ctx = ctx.with_expand_logarithm(false);
  let body_scope = scope_of(e, scope);
  let mut current = body;
  for _ in 0..order {
    match derivative::derive(current, &name, &ctx)? {
      Some(derived) => current = deep_reduce(derived, &ctx, Some(&body_scope))?,
      None => return Ok(e),
    }
  }
  let at_point = substitute_symbol(current, &name, point)?;
  deep_reduce(at_point, &ctx, scope)
}

#[cfg(test)]
mod tests {
  use crate::context::ReductionContext;
  use crate::pool;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn reduced(text: &str) -> String {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = crate::parse(text).unwrap();
    deep_reduce(e, &ctx, None).unwrap().to_string()
  }

  #[test]
  fn sums_and_products_unroll() {
    assert_eq!(reduced("sum(k^2,k,1,3)"), "14");
    assert_eq!(reduced("product(k,k,1,5)"), "120");
    assert_eq!(reduced("sum(k,k,3,1)"), "0");
    assert_eq!(reduced("sum(x,k,1,n)"), "n*x");
    assert_eq!(reduced("sum(k,k,1/2,3)"), "undef");
  }

  #[test]
  fn derivatives_at_a_point() {
    assert_eq!(reduced("diff(x^3,x,2)"), "12");
    assert_eq!(reduced("diff(sin(x),x,0)"), "1");
    assert_eq!(reduced("diff(x^3,x,1,2)"), "6");
    assert_eq!(reduced("diff(ln(x),x,y)"), "y^(-1)");
  }

  #[test]
  fn integrals_of_constants() {
    assert_eq!(reduced("int(3,x,1,5)"), "12");
  }
}
