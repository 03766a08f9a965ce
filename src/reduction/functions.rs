use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::{reduce_new, Scope};
use crate::approximation::approximate_to_scalar;
use crate::context::{ApproximationContext, ReductionContext, ReductionTarget};
use crate::expression::{
  small_factorization, ComparisonOperator, Constant, Expression,
  IntegerFunction, NodeKind, Number, TrigonometricFunction,
};
use crate::matcher;
use crate::pool::{self, PoolResult};

/// Largest argument of an exact factorial.
const MAX_EXACT_FACTORIAL: u32 = 1000;
/// Largest `k` of an exact binomial or permutation coefficient.
const MAX_COEFFICIENT_TERMS: u32 = 1000;
/// Largest float factorial argument, 171! overflows `f64`.
const MAX_FLOAT_FACTORIAL: u64 = 170;
/// Trial division bound when expanding logarithms of rationals.
const LOGARITHM_FACTORIZATION_LIMIT: u32 = 100;
/// Largest `k` tried when looking for `log(b^k, b) = k`.
const MAX_EXACT_LOGARITHM: u32 = 64;

fn is_kind(e: Expression, kind: NodeKind) -> bool {
  e.matches_kind(|k| *k == kind)
}

fn rational(numerator: i64, denominator: i64) -> BigRational {
  BigRational::new(numerator.into(), denominator.into())
}

/// Whether `e` is known to be a positive real number.
pub(crate) fn is_positive(e: Expression) -> bool {
  match e.kind() {
    NodeKind::Rational(r) => r.is_positive(),
    NodeKind::Float(f) => f > 0.0,
    NodeKind::Constant(c) => c != Constant::I,
    NodeKind::Power => is_positive(e.child(0)) && is_real(e.child(1)),
    NodeKind::Multiplication | NodeKind::Addition => e.children().into_iter().all(is_positive),
    _ => false,
  }
}

/// Whether `e` is known to be real whatever its free symbols are.
pub(crate) fn is_real(e: Expression) -> bool {
  match e.kind() {
    NodeKind::Rational(_) | NodeKind::Decimal { .. } | NodeKind::Float(_) => true,
    NodeKind::Constant(c) => c != Constant::I,
    NodeKind::Addition | NodeKind::Multiplication => e.children().into_iter().all(is_real),
    NodeKind::Power => {
      let (base, exponent) = (e.child(0), e.child(1));
      is_real(base)
        && is_real(exponent)
        && (exponent.integer_value().is_some() || is_positive(base))
    }
    NodeKind::Logarithm => is_positive(e.child(0)) && is_positive(e.child(1)),
    NodeKind::Trigonometry(f) => {
      is_real(e.child(0))
        && (!f.is_inverse() || f == TrigonometricFunction::ArcTangent)
    }
    NodeKind::AbsoluteValue
    | NodeKind::Floor
    | NodeKind::Ceiling
    | NodeKind::RealPart
    | NodeKind::ImaginaryPart
    | NodeKind::IntegerFunction(_) => true,
    NodeKind::Factorial => is_real(e.child(0)),
    _ => false,
  }
}

fn negative_coefficient(e: Expression) -> bool {
  is_kind(e, NodeKind::Multiplication) && e.child(0).is_negative_number()
}

fn negate(e: Expression, ctx: &ReductionContext, scope: Scope<'_, '_>) -> PoolResult {
  reduce_new(NodeKind::Multiplication, vec![Expression::integer(-1)?, e], ctx, scope)
}

pub(super) fn reduce_logarithm(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let (argument, base) = (e.child(0), e.child(1));
  if let Some(b) = Number::of(base) {
    if b.is_zero() || b.is_one() {
      return Expression::undefined();
    }
    if b.is_negative() {
      return if ctx.is_real() {
        Expression::undefined()
      } else {
        Ok(e)
      };
    }
  }
  if let Some(a) = Number::of(argument) {
    if a.is_zero() {
      return Expression::undefined();
    }
    if a.is_one() {
      return Expression::integer(0);
    }
    if a.is_negative() {
      if ctx.is_real() {
        return Expression::undefined();
      }
      // log(-a) = log(a) + i*pi/ln(b)
      let magnitude = a.abs().to_expression()?;
      let real = reduce_new(NodeKind::Logarithm, vec![magnitude, base], ctx, scope)?;
      let mut factors = vec![
        Expression::constant(Constant::I)?,
        Expression::constant(Constant::Pi)?,
      ];
      if !base.is_constant(Constant::E) {
        let ln = reduce_new(
          NodeKind::Logarithm,
          vec![base, Expression::constant(Constant::E)?],
          ctx,
          scope,
        )?;
        factors.push(reduce_new(
          NodeKind::Power,
          vec![ln, Expression::integer(-1)?],
          ctx,
          scope,
        )?);
      }
      let imaginary = reduce_new(NodeKind::Multiplication, factors, ctx, scope)?;
      return reduce_new(NodeKind::Addition, vec![real, imaginary], ctx, scope);
    }
    let float_base = match Number::of(base) {
      Some(b) if !a.is_rational() || !b.is_rational() => Some(b.to_f64()),
      None if !a.is_rational() && base.is_constant(Constant::E) => Some(std::f64::consts::E),
      _ => None,
    };
    if let Some(b) = float_base {
      return Expression::float(a.to_f64().ln() / b.ln());
    }
  }
  if argument.is_identical_to(base) {
    return Expression::integer(1);
  }
  if let (Some(a), Some(b)) = (argument.rational_value(), base.rational_value()) {
    if let Some(k) = exact_logarithm(&a, &b) {
      return Expression::integer(k);
    }
  }
  if is_kind(argument, NodeKind::Power)
    && argument.child(0).is_identical_to(base)
    && is_positive(base)
    && (ctx.is_real() || is_real(argument.child(1)))
  {
    return Ok(argument.child(1));
  }
  if ctx.expand_logarithm && ctx.target != ReductionTarget::SystemForApproximation {
    if let Some(expanded) = expand_logarithm(argument, base, ctx, scope)? {
      return Ok(expanded);
    }
  }
  Ok(e)
}

/// `k` such that `b^k = a`, for small `k`.
fn exact_logarithm(a: &BigRational, b: &BigRational) -> Option<i64> {
  if !a.is_positive() || !b.is_positive() || b.is_one() {
    return None;
  }
  let inverse = a.recip();
  let limit = a.numer().bits().max(a.denom().bits()) + 1;
  let mut power = b.clone();
  for k in 1..=MAX_EXACT_LOGARITHM {
    if power == *a {
      return Some(i64::from(k));
    }
    if power == inverse {
      return Some(-i64::from(k));
    }
    power *= b;
    if power.numer().bits().max(power.denom().bits()) > limit {
      return None;
    }
  }
  None
}

fn expand_logarithm(
  argument: Expression,
  base: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult<Option<Expression>> {
  let logarithm = |x: Expression| reduce_new(NodeKind::Logarithm, vec![x, base], ctx, scope);
  if is_kind(argument, NodeKind::Multiplication)
    && argument.children().into_iter().all(is_positive)
  {
    let mut terms = Vec::new();
    for factor in argument.children() {
      terms.push(logarithm(factor)?);
    }
    return Ok(Some(reduce_new(NodeKind::Addition, terms, ctx, scope)?));
  }
  if is_kind(argument, NodeKind::Power)
    && is_positive(argument.child(0))
    && (ctx.is_real() || is_real(argument.child(1)))
  {
    let inner = logarithm(argument.child(0))?;
    let product = reduce_new(
      NodeKind::Multiplication,
      vec![argument.child(1), inner],
      ctx,
      scope,
    )?;
    return Ok(Some(product));
  }
  let Some(value) = argument.rational_value() else {
    return Ok(None);
  };
  if !value.is_positive() {
    return Ok(None);
  }
  let (Some(numerator), Some(denominator)) = (
    small_factorization(value.numer(), LOGARITHM_FACTORIZATION_LIMIT),
    small_factorization(value.denom(), LOGARITHM_FACTORIZATION_LIMIT),
  ) else {
    return Ok(None);
  };
  let prime = numerator.len() + denominator.len() == 1
    && numerator.iter().chain(&denominator).all(|(_, m)| *m == 1)
    && denominator.is_empty();
  if prime {
    return Ok(None);
  }
  let mut terms = Vec::new();
  for (sign, factors) in [(1i64, &numerator), (-1, &denominator)] {
    for (p, multiplicity) in factors {
      let coefficient = Expression::integer(sign * i64::from(*multiplicity))?;
      let ln = logarithm(Expression::integer(i64::from(*p))?)?;
      terms.push(reduce_new(NodeKind::Multiplication, vec![coefficient, ln], ctx, scope)?);
    }
  }
  Ok(Some(reduce_new(NodeKind::Addition, terms, ctx, scope)?))
}

/// The argument as a multiple of pi, when it is a known exact angle.
fn turns(argument: Expression, ctx: &ReductionContext) -> Option<BigRational> {
  if let Some(half_turn) = ctx.angle_unit.half_turn() {
    return argument
      .rational_value()
      .map(|r| r / BigRational::from_integer(half_turn.into()));
  }
  if argument.is_zero() {
    return Some(BigRational::zero());
  }
  if argument.is_constant(Constant::Pi) {
    return Some(BigRational::one());
  }
  if is_kind(argument, NodeKind::Multiplication) && argument.number_of_children() == 2 {
    let children = argument.children();
    if children[1].is_constant(Constant::Pi) {
      return children[0].rational_value();
    }
  }
  None
}

/// `c*sqrt(n)`, reduced.
fn scaled_root(coefficient: BigRational, radicand: i64) -> PoolResult {
  let root = Expression::power(Expression::integer(radicand)?, Expression::fraction(1, 2)?)?;
  if coefficient.is_one() {
    return Ok(root);
  }
  Expression::multiplication(vec![Expression::rational(coefficient)?, root])
}

/// `(c, n)` when `e` is `c*sqrt(n)`.
fn as_scaled_root(e: Expression) -> Option<(BigRational, BigInt)> {
  let half = rational(1, 2);
  let root_of = |p: Expression| {
    if is_kind(p, NodeKind::Power) && p.child(1).rational_value() == Some(half.clone()) {
      p.child(0).integer_value()
    } else {
      None
    }
  };
  if let Some(n) = root_of(e) {
    return Some((BigRational::one(), n));
  }
  if is_kind(e, NodeKind::Multiplication) && e.number_of_children() == 2 {
    let children = e.children();
    let c = children[0].rational_value()?;
    return root_of(children[1]).map(|n| (c, n));
  }
  None
}

/// `sin(r*pi)` for the angles with a closed form.
fn exact_sine(r: &BigRational) -> PoolResult<Option<Expression>> {
  let two = BigRational::from_integer(2.into());
  let mut r = r - (r / &two).floor() * &two;
  let sign = if r >= BigRational::one() {
    r -= BigRational::one();
    -1
  } else {
    1
  };
  if r > rational(1, 2) {
    r = BigRational::one() - r;
  }
  let value = match (r.numer().to_i64(), r.denom().to_i64()) {
    (Some(0), _) => Expression::integer(0)?,
    (Some(1), Some(6)) => Expression::fraction(sign, 2)?,
    (Some(1), Some(4)) => scaled_root(rational(sign, 2), 2)?,
    (Some(1), Some(3)) => scaled_root(rational(sign, 2), 3)?,
    (Some(1), Some(2)) => Expression::integer(sign)?,
    _ => return Ok(None),
  };
  Ok(Some(value))
}

/// `asin(v)/pi` for the values with a closed form.
fn exact_arc_sine(v: Expression) -> Option<BigRational> {
  if let Some(value) = v.rational_value() {
    let magnitude = match value.abs() {
      a if a.is_zero() => BigRational::zero(),
      a if a == rational(1, 2) => rational(1, 6),
      a if a.is_one() => rational(1, 2),
      _ => return None,
    };
    return Some(if value.is_negative() { -magnitude } else { magnitude });
  }
  let (c, n) = as_scaled_root(v)?;
  let magnitude = match (c.abs() == rational(1, 2), n.to_i64()) {
    (true, Some(2)) => rational(1, 4),
    (true, Some(3)) => rational(1, 3),
    _ => return None,
  };
  Some(if c.is_negative() { -magnitude } else { magnitude })
}

/// `atan(v)/pi` for the values with a closed form.
fn exact_arc_tangent(v: Expression) -> Option<BigRational> {
  if let Some(value) = v.rational_value() {
    let magnitude = match value.abs() {
      a if a.is_zero() => BigRational::zero(),
      a if a.is_one() => rational(1, 4),
      _ => return None,
    };
    return Some(if value.is_negative() { -magnitude } else { magnitude });
  }
  let (c, n) = as_scaled_root(v)?;
  if n != BigInt::from(3) {
    return None;
  }
  let magnitude = if c.abs().is_one() {
    rational(1, 3)
  } else if c.abs() == rational(1, 3) {
    rational(1, 6)
  } else {
    return None;
  };
  Some(if c.is_negative() { -magnitude } else { magnitude })
}

/// An angle of `r*pi` radians in the active unit.
fn angle(r: BigRational, ctx: &ReductionContext, scope: Scope<'_, '_>) -> PoolResult {
  match ctx.angle_unit.half_turn() {
    Some(half_turn) => Expression::rational(r * BigRational::from_integer(half_turn.into())),
    None if r.is_zero() => Expression::integer(0),
    None => reduce_new(
      NodeKind::Multiplication,
      vec![Expression::rational(r)?, Expression::constant(Constant::Pi)?],
      ctx,
      scope,
    ),
  }
}

pub(super) fn reduce_trigonometry(
  e: Expression,
  f: TrigonometricFunction,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  use TrigonometricFunction::*;
  let argument = e.child(0);
  if let Some(Number::Float(x)) = Number::of(argument) {
    return reduce_numeric_trigonometry(e, f, x, ctx);
  }
  match f {
    Sine | Cosine | Tangent => {
      if let Some(r) = turns(argument, ctx) {
        let half = rational(1, 2);
        let value = match f {
          Sine => exact_sine(&r)?,
          Cosine => exact_sine(&(r + half))?,
          _ => match (exact_sine(&r)?, exact_sine(&(&r + half))?) {
            (Some(_), Some(cosine)) if cosine.is_zero() => Some(Expression::undefined()?),
            (Some(sine), Some(cosine)) => {
              let inverse = reduce_new(
                NodeKind::Power,
                vec![cosine, Expression::integer(-1)?],
                ctx,
                scope,
              )?;
              Some(reduce_new(NodeKind::Multiplication, vec![sine, inverse], ctx, scope)?)
            }
            _ => None,
          },
        };
        if let Some(value) = value {
          return Ok(value);
        }
      }
    }
    ArcSine | ArcCosine => {
      if let Some(value) = argument.rational_value() {
        if value.abs() > BigRational::one() {
          return if ctx.is_real() {
            Expression::undefined()
          } else {
            Ok(e)
          };
        }
      }
      if let Some(r) = exact_arc_sine(argument) {
        let r = if f == ArcCosine { rational(1, 2) - r } else { r };
        return angle(r, ctx, scope);
      }
    }
    ArcTangent => {
      if let Some(r) = exact_arc_tangent(argument) {
        return angle(r, ctx, scope);
      }
    }
  }
  // Parity
  if negative_coefficient(argument) && f != ArcCosine {
    let positive = negate(argument, ctx, scope)?;
    let image = reduce_new(NodeKind::Trigonometry(f), vec![positive], ctx, scope)?;
    return if f == Cosine {
      Ok(image)
    } else {
      negate(image, ctx, scope)
    };
  }
  Ok(e)
}

fn reduce_numeric_trigonometry(
  e: Expression,
  f: TrigonometricFunction,
  x: f64,
  ctx: &ReductionContext,
) -> PoolResult {
  use TrigonometricFunction::*;
  let unit = ctx.angle_unit;
  let value = match f {
    Sine => unit.to_radians(x).sin(),
    Cosine => unit.to_radians(x).cos(),
    Tangent => unit.to_radians(x).tan(),
    ArcSine | ArcCosine if x.abs() > 1.0 => {
      return if ctx.is_real() {
        Expression::undefined()
      } else {
        Ok(e)
      };
    }
    ArcSine => unit.from_radians(x.asin()),
    ArcCosine => unit.from_radians(x.acos()),
    ArcTangent => unit.from_radians(x.atan()),
  };
  Expression::float(value)
}

pub(super) fn reduce_absolute_value(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let argument = e.child(0);
  if let Some(value) = Number::of(argument) {
    return value.abs().to_expression();
  }
  if is_positive(argument) || is_kind(argument, NodeKind::AbsoluteValue) {
    return Ok(argument);
  }
  if argument.is_constant(Constant::I) {
    return Expression::integer(1);
  }
  if negative_coefficient(argument) {
    let positive = negate(argument, ctx, scope)?;
    return reduce_new(NodeKind::AbsoluteValue, vec![positive], ctx, scope);
  }
  if let Some((re, im)) = cartesian_parts(argument, ctx, scope)? {
    if !im.is_zero() {
      let square = |x: Expression| {
        reduce_new(NodeKind::Power, vec![x, Expression::integer(2)?], ctx, scope)
      };
      let sum = reduce_new(NodeKind::Addition, vec![square(re)?, square(im)?], ctx, scope)?;
      return reduce_new(NodeKind::Power, vec![sum, Expression::fraction(1, 2)?], ctx, scope);
    }
  }
  Ok(e)
}

pub(super) fn has_free_names(e: Expression) -> PoolResult<bool> {
  matcher::deep_is_of_kind(e, |k| {
    matches!(k, NodeKind::Symbol(_) | NodeKind::Function(_) | NodeKind::Random)
  })
}

pub(super) fn reduce_rounding(e: Expression, ctx: &ReductionContext) -> PoolResult {
  let floor = is_kind(e, NodeKind::Floor);
  let argument = e.child(0);
  match Number::of(argument) {
    Some(Number::Rational(r)) => {
      return Expression::rational(if floor { r.floor() } else { r.ceil() });
    }
    Some(Number::Float(x)) => {
      return Expression::float(if floor { x.floor() } else { x.ceil() });
    }
    None => {}
  }
  if !is_real(argument) || has_free_names(argument)? {
    return Ok(e);
  }
  let value: f64 = approximate_to_scalar(argument, &ApproximationContext::from(ctx));
  let nearest = value.round();
  // Too close to an integer to trust the approximation
  if !value.is_finite() || (value - nearest).abs() <= 1e-9 * value.abs().max(1.0) {
    return Ok(e);
  }
  let rounded = if floor { value.floor() } else { value.ceil() };
  match rounded.to_i64() {
    Some(n) => Expression::integer(n),
    None => Ok(e),
  }
}

pub(super) fn reduce_factorial(e: Expression) -> PoolResult {
  let argument = e.child(0);
  match Number::of(argument) {
    Some(Number::Rational(r)) => {
      if !r.is_integer() || r.is_negative() {
        return Expression::undefined();
      }
      let Some(n) = r.to_integer().to_u32().filter(|n| *n <= MAX_EXACT_FACTORIAL) else {
        return Ok(e);
      };
      let mut product = BigInt::one();
      for k in 2..=n {
        product *= k;
        pool::tick()?;
      }
      Expression::big_integer(product)
    }
    Some(Number::Float(x)) => {
      if x < 0.0 || x.fract() != 0.0 {
        return Expression::undefined();
      }
      if x > MAX_FLOAT_FACTORIAL as f64 {
        return Expression::undefined();
      }
      let mut product = 1.0;
      for k in 2..=x as u64 {
        product *= k as f64;
        pool::tick()?;
      }
      Expression::float(product)
    }
    None => Ok(e),
  }
}

/// `binomial(n, k)` for rational `n`, `permute(n, k)` and the euclidean
/// `quo(a, b)` and `rem(a, b)`, whose remainder is never negative.
pub(super) fn reduce_integer_function(e: Expression, f: IntegerFunction) -> PoolResult {
  let (Some(Number::Rational(a)), Some(Number::Rational(b))) =
    (Number::of(e.child(0)), Number::of(e.child(1)))
  else {
    return Ok(e);
  };
  let natural = |r: &BigRational| r.is_integer() && !r.is_negative();
  match f {
    IntegerFunction::Binomial => {
      if !natural(&b) {
        return Expression::undefined();
      }
      let Some(k) = b.to_integer().to_u32().filter(|k| *k <= MAX_COEFFICIENT_TERMS) else {
        return Ok(e);
      };
      let mut coefficient = BigRational::one();
      for i in 0..k {
        coefficient = coefficient * (&a - rational(i.into(), 1)) / rational((i + 1).into(), 1);
        pool::tick()?;
      }
      Expression::rational(coefficient)
    }
    IntegerFunction::Permute => {
      if !natural(&a) || !natural(&b) {
        return Expression::undefined();
      }
      if b > a {
        return Expression::integer(0);
      }
      let Some(k) = b.to_integer().to_u32().filter(|k| *k <= MAX_COEFFICIENT_TERMS) else {
        return Ok(e);
      };
      let n = a.to_integer();
      let mut coefficient = BigInt::one();
      for i in 0..k {
        coefficient *= &n - i;
        pool::tick()?;
      }
      Expression::big_integer(coefficient)
    }
    IntegerFunction::Quotient | IntegerFunction::Remainder => {
      if !a.is_integer() || !b.is_integer() || b.is_zero() {
        return Expression::undefined();
      }
      let (a, b) = (a.to_integer(), b.to_integer());
      let mut remainder = &a % &b;
      if remainder.is_negative() {
        remainder += b.abs();
      }
      if f == IntegerFunction::Remainder {
        Expression::big_integer(remainder)
      } else {
        Expression::big_integer((a - remainder) / b)
      }
    }
  }
}

/// `(re, im)` of `e` when it is visibly of the form `a+b*i` with `a` and
/// `b` real.
fn cartesian_parts(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult<Option<(Expression, Expression)>> {
  if e.is_constant(Constant::I) {
    return Ok(Some((Expression::integer(0)?, Expression::integer(1)?)));
  }
  if is_real(e) {
    return Ok(Some((e, Expression::integer(0)?)));
  }
  match e.kind() {
    NodeKind::Multiplication => {
      let (imaginary, real): (Vec<Expression>, Vec<Expression>) =
        e.children().into_iter().partition(|f| f.is_constant(Constant::I));
      if imaginary.len() != 1 || !real.iter().all(|f| is_real(*f)) {
        return Ok(None);
      }
      let im = reduce_new(NodeKind::Multiplication, real, ctx, scope)?;
      Ok(Some((Expression::integer(0)?, im)))
    }
    NodeKind::Addition => {
      let (mut re, mut im) = (Vec::new(), Vec::new());
      for term in e.children() {
        let Some((a, b)) = cartesian_parts(term, ctx, scope)? else {
          return Ok(None);
        };
        re.push(a);
        im.push(b);
      }
      Ok(Some((
        reduce_new(NodeKind::Addition, re, ctx, scope)?,
        reduce_new(NodeKind::Addition, im, ctx, scope)?,
      )))
    }
    _ => Ok(None),
  }
}

pub(super) fn reduce_complex_part(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let kind = e.kind();
  let argument = e.child(0);
  let Some((re, im)) = cartesian_parts(argument, ctx, scope)? else {
    return Ok(e);
  };
  match kind {
    NodeKind::RealPart => Ok(re),
    NodeKind::ImaginaryPart => Ok(im),
    _ if im.is_zero() => Ok(argument),
    _ => {
      let negated = reduce_new(
        NodeKind::Multiplication,
        vec![Expression::integer(-1)?, Expression::constant(Constant::I)?, im],
        ctx,
        scope,
      )?;
      reduce_new(NodeKind::Addition, vec![re, negated], ctx, scope)
    }
  }
}

pub(super) fn reduce_comparison(e: Expression, op: ComparisonOperator) -> PoolResult {
  let (a, b) = (e.child(0), e.child(1));
  if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
    return match x.compare(&y) {
      Some(ordering) => Expression::boolean(op.holds(ordering)),
      None => Expression::undefined(),
    };
  }
  if a.is_identical_to(b) && !a.is_random() {
    return Expression::boolean(op.holds(Ordering::Equal));
  }
  Ok(e)
}

#[cfg(test)]
mod tests {
  use crate::context::{AngleUnit, ComplexFormat, ReductionContext};
  use crate::expression::Expression;
  use crate::pool;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn reduce_with(text: &str, ctx: &ReductionContext) -> String {
    let e = crate::parse(text).unwrap();
    deep_reduce(e, ctx, None).unwrap().to_string()
  }

  #[test]
  fn logarithms() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let real = ReductionContext::new(&store);
    assert_eq!(reduce_with("log(1000)", &real), "3");
    assert_eq!(reduce_with("log(1/8,2)", &real), "-3");
    assert_eq!(reduce_with("ln(e^x)", &real), "x");
    assert_eq!(reduce_with("log(0)", &real), "undef");
    assert_eq!(reduce_with("log(-1)", &real), "undef");
    let cartesian = real.with_complex_format(ComplexFormat::Cartesian);
    assert_eq!(reduce_with("ln(-1)", &cartesian), "pi*i");
  }

  #[test]
  fn exact_trigonometric_values() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let radian = ReductionContext::new(&store);
    assert_eq!(reduce_with("sin(pi/6)", &radian), "1/2");
    assert_eq!(reduce_with("cos(pi)", &radian), "-1");
    assert_eq!(reduce_with("sin(-x)", &radian), "-1*sin(x)");
    assert_eq!(reduce_with("tan(pi/2)", &radian), "undef");
    assert_eq!(reduce_with("acos(0)", &radian), "1/2*pi");
    let degree = radian.with_angle_unit(AngleUnit::Degree);
    assert_eq!(reduce_with("cos(60)", &degree), "1/2");
    assert_eq!(reduce_with("atan(1)", &degree), "45");
    assert_eq!(reduce_with("asin(2)", &degree), "undef");
  }

  #[test]
  fn other_functions() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    assert_eq!(reduce_with("5!", &ctx), "120");
    assert_eq!(reduce_with("(-1)!", &ctx), "undef");
    assert_eq!(reduce_with("abs(-3/2)", &ctx), "3/2");
    assert_eq!(reduce_with("floor(7/2)", &ctx), "3");
    assert_eq!(reduce_with("ceil(pi)", &ctx), "4");
    assert_eq!(reduce_with("1<2", &ctx), "true");
    assert_eq!(reduce_with("x=x", &ctx), "true");
    let cartesian = ctx.with_complex_format(ComplexFormat::Cartesian);
    assert_eq!(reduce_with("re(3+2*i)", &cartesian), "3");
    assert_eq!(reduce_with("im(3+2*i)", &cartesian), "2");
    assert_eq!(reduce_with("abs(3+4*i)", &cartesian), "5");
  }

  #[test]
  fn float_factorials_are_bounded() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let factorial = |x: f64| {
      let e = Expression::factorial(Expression::float(x).unwrap()).unwrap();
      deep_reduce(e, &ctx, None).unwrap()
    };
    assert_eq!(factorial(5.0).to_string(), "120");
    assert!(factorial(1e12).is_undefined());
    assert!(factorial(171.0).is_undefined());
    assert!(factorial(2.5).is_undefined());
  }

  #[test]
  fn integer_functions() {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    assert_eq!(reduce_with("binomial(5,2)", &ctx), "10");
    assert_eq!(reduce_with("binomial(3,5)", &ctx), "0");
    assert_eq!(reduce_with("binomial(1/2,2)", &ctx), "-1/8");
    assert_eq!(reduce_with("binomial(5,-1)", &ctx), "undef");
    assert_eq!(reduce_with("permute(5,2)", &ctx), "20");
    assert_eq!(reduce_with("permute(2,5)", &ctx), "0");
    assert_eq!(reduce_with("permute(-2,1)", &ctx), "undef");
    assert_eq!(reduce_with("quo(-7,2)", &ctx), "-4");
    assert_eq!(reduce_with("rem(-7,2)", &ctx), "1");
    assert_eq!(reduce_with("rem(7,-2)", &ctx), "1");
    assert_eq!(reduce_with("quo(7,-2)", &ctx), "-3");
    assert_eq!(reduce_with("rem(7,0)", &ctx), "undef");
    assert_eq!(reduce_with("quo(1/2,3)", &ctx), "undef");
    assert_eq!(reduce_with("binomial(n,2)", &ctx), "binomial(n,2)");
  }
}
