use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};

use super::{containers, reduce_new, Scope};
use crate::context::{ReductionContext, ReductionTarget};
use crate::expression::{
  extract_root, rational_power, simplification_order, Constant, Expression,
  NodeKind, Number,
};
use crate::pool::{self, PoolResult};

/// Largest integer power of a sum expanded for analysis.
const MAX_EXPANDED_POWER: i64 = 10;
/// Trial division bound when pulling perfect powers out of radicands.
const ROOT_EXTRACTION_LIMIT: u32 = 1000;
/// Radicands above this size are left alone.
const MAX_RADICAND_BITS: u64 = 2048;

fn is_kind(e: Expression, kind: NodeKind) -> bool {
  e.matches_kind(|k| *k == kind)
}

fn is_matrix(e: Expression) -> bool {
  e.matches_kind(|k| matches!(k, NodeKind::Matrix { .. }))
}

/// Children of `e`, with nested nodes of the same n-ary kind spliced in.
fn flatten(e: Expression, kind: &NodeKind) -> Vec<Expression> {
  let mut flat = Vec::new();
  for child in e.children() {
    if child.matches_kind(|k| k == kind) {
      flat.extend(flatten(child, kind));
    } else {
      flat.push(child);
    }
  }
  flat
}

fn sort(terms: &mut [Expression]) {
  terms.sort_by(|a, b| simplification_order(*a, *b));
}

/// Splits a term into its numeric coefficient and the rest.
fn split_coefficient(term: Expression) -> PoolResult<(Number, Expression)> {
  if !is_kind(term, NodeKind::Multiplication) {
    return Ok((Number::one(), term));
  }
  let factors = term.children();
  let Some(coefficient) = Number::of(factors[0]) else {
    return Ok((Number::one(), term));
  };
  let rest = if factors.len() == 2 {
    factors[1]
  } else {
    Expression::multiplication(factors[1..].to_vec())?
  };
  Ok((coefficient, rest))
}

fn with_coefficient(coefficient: &Number, rest: Expression) -> PoolResult {
  if coefficient.is_one() {
    return Ok(rest);
  }
  let mut factors = vec![coefficient.to_expression()?];
  if is_kind(rest, NodeKind::Multiplication) {
    factors.extend(rest.children());
  } else {
    factors.push(rest);
  }
  Expression::multiplication(factors)
}

pub(super) fn reduce_addition(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  if e.children().into_iter().any(is_matrix) {
    return containers::add_matrices(e, ctx, scope);
  }
  let mut constant = Number::zero();
  let mut groups: Vec<(Expression, Number)> = Vec::new();
  for term in flatten(e, &NodeKind::Addition) {
    if let Some(value) = Number::of(term) {
      constant = constant.add(&value);
      continue;
    }
    let (coefficient, rest) = split_coefficient(term)?;
    match groups.iter_mut().find(|(r, _)| r.is_identical_to(rest)) {
      Some(group) => group.1 = group.1.add(&coefficient),
      None => groups.push((rest, coefficient)),
    }
  }
  groups.retain(|(_, coefficient)| !coefficient.is_zero());
  if groups.is_empty() {
    return constant.to_expression();
  }
  // Terms are ordered by what multiplies their coefficient
  groups.sort_by(|(a, _), (b, _)| simplification_order(*a, *b));
  let mut terms = Vec::with_capacity(groups.len() + 1);
  if !constant.is_zero() {
    terms.push(constant.to_expression()?);
  }
  for (rest, coefficient) in &groups {
    terms.push(with_coefficient(coefficient, *rest)?);
  }
  if terms.len() == 1 {
    return Ok(terms[0]);
  }
  Expression::addition(terms)
}

fn base_and_exponent(factor: Expression) -> PoolResult<(Expression, Expression)> {
  if is_kind(factor, NodeKind::Power) {
    Ok((factor.child(0), factor.child(1)))
  } else {
    Ok((factor, Expression::integer(1)?))
  }
}

fn has_repeated_base(factors: &[Expression]) -> PoolResult<bool> {
  let mut bases = Vec::with_capacity(factors.len());
  for factor in factors {
    let (base, _) = base_and_exponent(*factor)?;
    if bases.iter().any(|b: &Expression| b.is_identical_to(base)) {
      return Ok(true);
    }
    bases.push(base);
  }
  Ok(false)
}

pub(super) fn reduce_multiplication(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  if e.children().into_iter().any(is_matrix) {
    return containers::multiply_matrices(e, ctx, scope);
  }
  let mut coefficient = Number::one();
  // Each group: base, its exponents, and the factor itself when alone
  let mut groups: Vec<(Expression, Vec<Expression>, Expression)> = Vec::new();
  for factor in flatten(e, &NodeKind::Multiplication) {
    if let Some(value) = Number::of(factor) {
      coefficient = coefficient.mul(&value);
      continue;
    }
    let (base, exponent) = base_and_exponent(factor)?;
    match groups.iter_mut().find(|(b, _, _)| b.is_identical_to(base)) {
      Some(group) => group.1.push(exponent),
      None => groups.push((base, vec![exponent], factor)),
    }
  }
  if coefficient.is_zero() {
    return coefficient.to_expression();
  }

  let mut conditions = Vec::new();
  let mut merged = Vec::with_capacity(groups.len());
  for (base, exponents, factor) in groups {
    if exponents.len() == 1 {
      merged.push(factor);
      continue;
    }
    let exponent = reduce_new(NodeKind::Addition, exponents, ctx, scope)?;
    if exponent.is_zero() && !base.is_number() {
      // x*x^-1 is only 1 where x^-1 is defined
      let inverse = reduce_new(
        NodeKind::Power,
        vec![base, Expression::integer(-1)?],
        ctx,
        scope,
      )?;
      conditions.push(inverse);
    }
    merged.push(reduce_new(NodeKind::Power, vec![base, exponent], ctx, scope)?);
  }

  let mut factors = Vec::with_capacity(merged.len());
  for factor in merged {
    if let Some(value) = Number::of(factor) {
      coefficient = coefficient.mul(&value);
    } else if is_kind(factor, NodeKind::Multiplication) {
      for inner in factor.children() {
        match Number::of(inner) {
          Some(value) => coefficient = coefficient.mul(&value),
          None => factors.push(inner),
        }
      }
    } else {
      factors.push(factor);
    }
  }
  if coefficient.is_zero() {
    return coefficient.to_expression();
  }
  sort(&mut factors);

  let result = if has_repeated_base(&factors)? {
    // Powers split into new factors (sqrt(12) -> 2*sqrt(3)) may merge again
    let mut again = vec![coefficient.to_expression()?];
    again.extend(factors);
    reduce_new(NodeKind::Multiplication, again, ctx, scope)?
  } else if ctx.target == ReductionTarget::SystemForAnalysis
    && factors.iter().any(|f| is_kind(*f, NodeKind::Addition))
  {
    distribute(&coefficient, factors, ctx, scope)?
  } else {
    assemble(&coefficient, factors)?
  };
  if conditions.is_empty() {
    return Ok(result);
  }
  let dependency = Expression::dependency(result, conditions)?;
  containers::reduce_dependency(dependency)
}

fn assemble(coefficient: &Number, factors: Vec<Expression>) -> PoolResult {
  match factors.len() {
    0 => coefficient.to_expression(),
    1 if coefficient.is_one() => Ok(factors[0]),
    _ => {
      let mut all = Vec::with_capacity(factors.len() + 1);
      if !coefficient.is_one() {
        all.push(coefficient.to_expression()?);
      }
      all.extend(factors);
      Expression::multiplication(all)
    }
  }
}

/// `c*(a+b)*rest` as `c*a*rest+c*b*rest`.
fn distribute(
  coefficient: &Number,
  mut factors: Vec<Expression>,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let Some(position) = factors.iter().position(|f| is_kind(*f, NodeKind::Addition)) else {
    return assemble(coefficient, factors);
  };
  let sum = factors.remove(position);
  let mut terms = Vec::with_capacity(sum.number_of_children());
  for term in sum.children() {
    pool::tick()?;
    let mut product = vec![coefficient.to_expression()?, term];
    product.extend(factors.iter().copied());
    terms.push(reduce_new(NodeKind::Multiplication, product, ctx, scope)?);
  }
  reduce_new(NodeKind::Addition, terms, ctx, scope)
}

pub(super) fn reduce_power(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let (base, exponent) = (e.child(0), e.child(1));
  if is_matrix(base) || is_matrix(exponent) {
    return containers::matrix_power(e, ctx, scope);
  }
  let exponent_value = Number::of(exponent);
  if let Some(x) = &exponent_value {
    if x.is_zero() {
      return if base.is_zero() {
        Expression::undefined()
      } else {
        Expression::integer(1)
      };
    }
    if x.is_one() {
      return Ok(base);
    }
  }
  if base.is_zero() {
    return match &exponent_value {
      Some(x) if x.is_negative() => Expression::undefined(),
      Some(_) => Expression::integer(0),
      None => Ok(e),
    };
  }
  if base.is_one() {
    return Expression::integer(1);
  }

  if let (Some(b), Some(x)) = (Number::of(base), &exponent_value) {
    if !b.is_rational() || !x.is_rational() {
      let (b, x) = (b.to_f64(), x.to_f64());
      if b < 0.0 && x.fract() != 0.0 {
        return Ok(e);
      }
      return Expression::float(b.powf(x));
    }
  }
  if let (Some(b), Some(k)) = (base.rational_value(), exponent.integer_value()) {
    return match rational_power(&b, &k) {
      Some(value) => Expression::rational(value),
      None => Ok(e),
    };
  }
  if let (Some(b), Some(x)) = (base.rational_value(), exponent.rational_value()) {
    return rational_root(e, &b, &x, ctx, scope);
  }

  let integer_exponent = exponent.integer_value();
  if let (true, Some(k)) = (base.is_constant(Constant::I), &integer_exponent) {
    let turn: BigInt = ((k % 4) + 4) % 4;
    return match turn.to_u8() {
      Some(0) => Expression::integer(1),
      Some(1) => Ok(base),
      Some(2) => Expression::integer(-1),
      _ => Expression::multiplication(vec![Expression::integer(-1)?, base]),
    };
  }
  if base.is_constant(Constant::E)
    && is_kind(exponent, NodeKind::Logarithm)
    && exponent.child(1).is_constant(Constant::E)
  {
    return Ok(exponent.child(0));
  }
  if let Some(k) = &integer_exponent {
    if is_kind(base, NodeKind::Power) {
      let k = Expression::big_integer(k.clone())?;
      let product = reduce_new(NodeKind::Multiplication, vec![base.child(1), k], ctx, scope)?;
      return reduce_new(NodeKind::Power, vec![base.child(0), product], ctx, scope);
    }
    if is_kind(base, NodeKind::Multiplication) {
      let mut factors = Vec::with_capacity(base.number_of_children());
      for factor in base.children() {
        factors.push(reduce_new(NodeKind::Power, vec![factor, exponent], ctx, scope)?);
      }
      return reduce_new(NodeKind::Multiplication, factors, ctx, scope);
    }
    let expands = ctx.target == ReductionTarget::SystemForAnalysis
      && is_kind(base, NodeKind::Addition)
      && k.to_i64().is_some_and(|k| (2..=MAX_EXPANDED_POWER).contains(&k));
    if expands {
      let mut result = base;
      for _ in 1..k.to_i64().unwrap_or(1) {
        result = expand_product(result, base, ctx, scope)?;
      }
      return Ok(result);
    }
  }
  Ok(e)
}

fn terms_of(e: Expression) -> Vec<Expression> {
  if is_kind(e, NodeKind::Addition) {
    e.children()
  } else {
    vec![e]
  }
}

/// `a*b` with both sides distributed term by term.
fn expand_product(
  a: Expression,
  b: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let mut terms = Vec::new();
  for x in terms_of(a) {
    for y in terms_of(b) {
      pool::tick()?;
      terms.push(reduce_new(NodeKind::Multiplication, vec![x, y], ctx, scope)?);
    }
  }
  reduce_new(NodeKind::Addition, terms, ctx, scope)
}

/// `b^x` for a rational `b` and a non-integer rational `x = p/q`.
fn rational_root(
  e: Expression,
  b: &BigRational,
  x: &BigRational,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let p = x.numer();
  let q = x.denom();
  if b.is_negative() {
    let magnitude = Expression::rational(b.abs())?;
    let even = (q % 2u32).is_zero();
    if even && ctx.is_real() {
      return Expression::undefined();
    }
    if even && *q == BigInt::from(2) {
      // (-a)^(p/2) = a^(p/2) * i^p
      let root = reduce_new(
        NodeKind::Power,
        vec![magnitude, Expression::rational(x.clone())?],
        ctx,
        scope,
      )?;
      let i = reduce_new(
        NodeKind::Power,
        vec![Expression::constant(Constant::I)?, Expression::big_integer(p.clone())?],
        ctx,
        scope,
      )?;
      return reduce_new(NodeKind::Multiplication, vec![root, i], ctx, scope);
    }
    if !even && ctx.is_real() {
      // The real odd root
      let sign = if (p % 2u32).is_zero() { 1 } else { -1 };
      let root = reduce_new(
        NodeKind::Power,
        vec![magnitude, Expression::rational(x.clone())?],
        ctx,
        scope,
      )?;
      return reduce_new(
        NodeKind::Multiplication,
        vec![Expression::integer(sign)?, root],
        ctx,
        scope,
      );
    }
    return Ok(e);
  }

  let Some(index) = q.to_u32() else {
    return Ok(e);
  };
  // b^(p/q) = b^k * b^(r/q) with 0 < r < q
  let k = x.floor().to_integer();
  let r = p - &k * q;
  let Some(whole) = rational_power(b, &k) else {
    return Ok(e);
  };
  let (Some(r), Some(q_minus_r)) = (r.to_u32(), (q - &r).to_u32()) else {
    return Ok(e);
  };
  let bits = b.numer().bits() * u64::from(r) + b.denom().bits() * u64::from(q_minus_r);
  if bits > MAX_RADICAND_BITS {
    return Ok(e);
  }
  // n^r/d^r = n^r*d^(q-r) / d^q, so the radicand is an integer
  let radicand: BigInt = Pow::pow(b.numer(), r) * Pow::pow(b.denom(), q_minus_r);
  let limit = if ctx.target == ReductionTarget::SystemForApproximation {
    0
  } else {
    ROOT_EXTRACTION_LIMIT
  };
  let (outside, inside) = extract_root(&radicand, index, limit);
  if ctx.target == ReductionTarget::SystemForApproximation && !inside.is_one() {
    return Ok(e);
  }
  let coefficient = whole * BigRational::new(outside, b.denom().clone());
  if inside.is_one() {
    return Expression::rational(coefficient);
  }
  let root = Expression::power(
    Expression::big_integer(inside)?,
    Expression::rational(BigRational::new(BigInt::one(), q.clone()))?,
  )?;
  if coefficient.is_one() {
    if root.is_identical_to(e) {
      return Ok(e);
    }
    return Ok(root);
  }
  Expression::multiplication(vec![Expression::rational(coefficient)?, root])
}

/// Orders the terms of a reduced addition by descending degree in `x`.
pub(crate) fn degree_order(a: Expression, b: Expression) -> Ordering {
  fn degree(e: Expression) -> BigRational {
    let factor = if is_kind(e, NodeKind::Multiplication) {
      let children = e.children();
      match children.iter().find(|c| !c.is_number()) {
        Some(f) => *f,
        None => return BigRational::zero(),
      }
    } else {
      e
    };
    if is_kind(factor, NodeKind::Power) {
      return factor.child(1).rational_value().unwrap_or_else(BigRational::zero);
    }
    if factor.is_number() {
      BigRational::zero()
    } else {
      BigRational::one()
    }
  }
  degree(b).cmp(&degree(a))
}

#[cfg(test)]
mod tests {
  use crate::context::{ComplexFormat, ReductionContext, ReductionTarget};
  use crate::pool;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn reduce_with(text: &str, ctx: &ReductionContext) -> String {
    let e = crate::parse(text).unwrap();
    deep_reduce(e, ctx, None).unwrap().to_string()
  }

  #[test]
  fn powers_of_rationals() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    assert_eq!(reduce_with("2^10", &ctx), "1024");
    assert_eq!(reduce_with("2^-2", &ctx), "1/4");
    assert_eq!(reduce_with("0^0", &ctx), "undef");
    assert_eq!(reduce_with("0^-1", &ctx), "undef");
    assert_eq!(reduce_with("sqrt(12)", &ctx), "2*3^(1/2)");
    assert_eq!(reduce_with("sqrt(4/9)", &ctx), "2/3");
    assert_eq!(reduce_with("sqrt(12)*sqrt(3)", &ctx), "6");
  }

  #[test]
  fn roots_of_negative_numbers_depend_on_the_format() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let real = ReductionContext::new(&store);
    let cartesian = real.with_complex_format(ComplexFormat::Cartesian);
    assert_eq!(reduce_with("sqrt(-1)", &real), "undef");
    assert_eq!(reduce_with("sqrt(-1)", &cartesian), "i");
    assert_eq!(reduce_with("sqrt(-4)", &cartesian), "2*i");
    assert_eq!(reduce_with("(-8)^(1/3)", &real), "-2");
    assert_eq!(reduce_with("i^2", &cartesian), "-1");
  }

  #[test]
  fn like_terms_and_cancellation() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    assert_eq!(reduce_with("x+1+x+2", &ctx), "3+2*x");
    assert_eq!(reduce_with("x*y*x", &ctx), "x^2*y");
    assert_eq!(reduce_with("3*x*0", &ctx), "0");
    assert_eq!(reduce_with("x/x", &ctx), "1");
  }

  #[test]
  fn analysis_target_distributes() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store).with_target(ReductionTarget::SystemForAnalysis);
    assert_eq!(reduce_with("(x+1)^2", &ctx), "1+2*x+x^2");
  }
}
