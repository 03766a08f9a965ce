use std::cmp::Ordering;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};

use super::{Expression, NodeKind};
use crate::pool::{self, PoolResult};

/// A numeric leaf: exact rational, or float once something was approximated.
#[derive(Debug, Clone, PartialEq)]
pub enum Number {
  Rational(BigRational),
  Float(f64),
}

/// Decimals scaled by more than this power of ten have no exact value.
pub const MAX_DECIMAL_EXPONENT: u32 = 1000;

/// The exact value of `mantissa * 10^exponent`, `None` past
/// [`MAX_DECIMAL_EXPONENT`].
pub(crate) fn decimal_to_rational(
  mantissa: &BigInt,
  exponent: i32,
) -> Option<BigRational> {
  let magnitude = exponent.unsigned_abs();
  if magnitude > MAX_DECIMAL_EXPONENT {
    return None;
  }
  let scale = BigInt::from(10).pow(magnitude);
  Some(if exponent >= 0 {
    BigRational::from_integer(mantissa * scale)
  } else {
    BigRational::new(mantissa.clone(), scale)
  })
}

/// The nearest `f64` to `mantissa * 10^exponent`; infinite or zero when
/// out of range.
pub(crate) fn decimal_to_f64(mantissa: &BigInt, exponent: i32) -> f64 {
  format!("{}e{}", mantissa, exponent)
    .parse()
    .unwrap_or(f64::NAN)
}

impl Number {
  /// The value of a number node, `None` for any other kind.
  pub fn of(e: Expression) -> Option<Number> {
    pool::with_node(e, |n| match &n.kind {
      NodeKind::Rational(r) => Some(Number::Rational(r.clone())),
      NodeKind::Decimal { mantissa, exponent } => {
        decimal_to_rational(mantissa, *exponent).map(Number::Rational)
      }
      NodeKind::Float(f) => Some(Number::Float(*f)),
      _ => None,
    })
  }

  pub fn integer(value: i64) -> Number {
    Number::Rational(BigRational::from_integer(value.into()))
  }

  pub fn zero() -> Number {
    Number::integer(0)
  }

  pub fn one() -> Number {
    Number::integer(1)
  }

  pub fn to_f64(&self) -> f64 {
    match self {
      Number::Rational(r) => r.to_f64().unwrap_or(f64::NAN),
      Number::Float(f) => *f,
    }
  }

  pub fn is_zero(&self) -> bool {
    match self {
      Number::Rational(r) => r.is_zero(),
      Number::Float(f) => *f == 0.0,
    }
  }

  pub fn is_one(&self) -> bool {
    match self {
      Number::Rational(r) => r.is_one(),
      Number::Float(f) => *f == 1.0,
    }
  }

  pub fn is_negative(&self) -> bool {
    match self {
      Number::Rational(r) => r.is_negative(),
      Number::Float(f) => *f < 0.0,
    }
  }

  pub fn is_rational(&self) -> bool {
    matches!(self, Number::Rational(_))
  }

  pub fn add(&self, other: &Number) -> Number {
    match (self, other) {
      (Number::Rational(a), Number::Rational(b)) => Number::Rational(a + b),
      _ => Number::Float(self.to_f64() + other.to_f64()),
    }
  }

  pub fn mul(&self, other: &Number) -> Number {
    match (self, other) {
      (Number::Rational(a), Number::Rational(b)) => Number::Rational(a * b),
      _ => Number::Float(self.to_f64() * other.to_f64()),
    }
  }

  pub fn neg(&self) -> Number {
    match self {
      Number::Rational(r) => Number::Rational(-r),
      Number::Float(f) => Number::Float(-f),
    }
  }

  pub fn abs(&self) -> Number {
    match self {
      Number::Rational(r) => Number::Rational(r.abs()),
      Number::Float(f) => Number::Float(f.abs()),
    }
  }

  /// Numeric ordering; floats are compared by value.
  pub fn compare(&self, other: &Number) -> Option<Ordering> {
    match (self, other) {
      (Number::Rational(a), Number::Rational(b)) => Some(a.cmp(b)),
      _ => self.to_f64().partial_cmp(&other.to_f64()),
    }
  }

  pub fn to_expression(&self) -> PoolResult {
    match self {
      Number::Rational(r) => Expression::rational(r.clone()),
      Number::Float(f) => Expression::float(*f),
    }
  }
}

/// `base^exponent` for an integer exponent, or `None` if the result would
/// not be a reasonable calculator rational (or `0^-n`).
pub fn rational_power(base: &BigRational, exponent: &BigInt) -> Option<BigRational> {
  const MAX_RESULT_BITS: u64 = 4096;
  let magnitude = exponent.abs().to_u32()?;
  let bits = base.numer().bits().max(base.denom().bits());
  if bits.saturating_mul(u64::from(magnitude)) > MAX_RESULT_BITS {
    return None;
  }
  if base.is_zero() && exponent.is_negative() {
    return None;
  }
  let value = Pow::pow(base, magnitude);
  if exponent.is_negative() {
    Some(value.recip())
  } else {
    Some(value)
  }
}

/// Splits `n` into `(a, b)` with `n = a^index * b` and `b` free of any
/// `index`-th power factor that trial division up to `limit` could find.
pub fn extract_root(n: &BigInt, index: u32, limit: u32) -> (BigInt, BigInt) {
  let mut outside = BigInt::one();
  let mut inside = n.clone();
  let exact = inside.nth_root(index);
  if Pow::pow(&exact, index) == inside {
    return (exact, BigInt::one());
  }
  let mut p = 2u32;
  while p <= limit {
    let prime = BigInt::from(p);
    let power = Pow::pow(&prime, index);
    while (&inside % &power).is_zero() {
      inside /= &power;
      outside *= &prime;
    }
    p += if p == 2 { 1 } else { 2 };
  }
  let rest = inside.nth_root(index);
  if Pow::pow(&rest, index) == inside {
    return (outside * rest, BigInt::one());
  }
  (outside, inside)
}

/// Factorization by trial division, `None` if a cofactor above `limit`
/// remains.
pub fn small_factorization(n: &BigInt, limit: u32) -> Option<Vec<(u32, u32)>> {
  let mut rest = n.abs();
  let mut factors = Vec::new();
  let mut p = 2u32;
  while p <= limit && !rest.is_one() {
    let prime = BigInt::from(p);
    let mut multiplicity = 0;
    while (&rest % &prime).is_zero() {
      rest /= &prime;
      multiplicity += 1;
    }
    if multiplicity > 0 {
      factors.push((p, multiplicity));
    }
    p += if p == 2 { 1 } else { 2 };
  }
  if rest.is_one() {
    Some(factors)
  } else {
    None
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn int(n: i64) -> BigInt {
    BigInt::from(n)
  }

  #[test]
  fn root_extraction() {
    assert_eq!(extract_root(&int(8), 2, 100), (int(2), int(2)));
    assert_eq!(extract_root(&int(27), 3, 100), (int(3), int(1)));
    assert_eq!(extract_root(&int(12), 2, 100), (int(2), int(3)));
    assert_eq!(extract_root(&int(7), 2, 100), (int(1), int(7)));
  }

  #[test]
  fn powers_stay_bounded() {
    let two = BigRational::from_integer(int(2));
    assert_eq!(
      rational_power(&two, &int(-3)),
      Some(BigRational::new(int(1), int(8)))
    );
    assert_eq!(rational_power(&two, &int(100_000)), None);
    assert_eq!(rational_power(&BigRational::zero(), &int(-1)), None);
  }

  #[test]
  fn factorization() {
    assert_eq!(small_factorization(&int(12), 100), Some(vec![(2, 2), (3, 1)]));
    assert_eq!(small_factorization(&int(1009 * 2), 100), None);
  }
}
