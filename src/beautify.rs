//! Cosmetic rewrites of reduced expressions for display.
//!
//! Reduced trees only use additions, products and powers. Beautification
//! turns them back into the forms people write: `-x` rather than `-1*x`,
//! `x/y` rather than `x*y^(-1)`, `sqrt(x)`, `root(x,n)`, `ln(x)` and
//! subtractions. The result is for display only and is not reduced again.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed};

use crate::expression::{Constant, Expression, NodeKind, Number};
use crate::pool::PoolResult;
use crate::reduction::degree_order;

pub fn beautify(e: Expression) -> PoolResult {
  let kind = e.kind();
  match kind {
    NodeKind::Addition => beautify_sum(e),
    NodeKind::Multiplication => beautify_product(e),
    NodeKind::Power => beautify_power(e.child(0), e.child(1)),
    NodeKind::Logarithm if e.child(1).is_constant(Constant::E) => {
      Expression::natural_logarithm(beautify(e.child(0))?)
    }
    _ if e.number_of_children() == 0 => Ok(e),
    _ => {
      let children = e
        .children()
        .into_iter()
        .map(beautify)
        .collect::<PoolResult<Vec<_>>>()?;
      e.with_children(children)
    }
  }
}

fn exact_exponent(exponent: Expression) -> Option<BigRational> {
  match exponent.kind() {
    NodeKind::Rational(r) => Some(r),
    _ => None,
  }
}

/// `base^exponent` for a positive exponent, written with a root when the
/// exponent is a unit fraction.
fn positive_power(base: Expression, exponent: &BigRational) -> PoolResult {
  let base = beautify(base)?;
  if exponent.is_one() {
    return Ok(base);
  }
  if exponent.numer().is_one() {
    if exponent.denom() == &BigInt::from(2) {
      return Expression::square_root(base);
    }
    return Expression::nth_root(base, Expression::big_integer(exponent.denom().clone())?);
  }
  Expression::power(base, Expression::rational(exponent.clone())?)
}

fn beautify_power(base: Expression, exponent: Expression) -> PoolResult {
  match exact_exponent(exponent) {
    Some(r) if r.is_negative() => {
      Expression::division(Expression::integer(1)?, positive_power(base, &-r)?)
    }
    Some(r) => positive_power(base, &r),
    None => Expression::power(beautify(base)?, beautify(exponent)?),
  }
}

fn product_of(mut factors: Vec<Expression>) -> PoolResult {
  if factors.len() == 1 {
    return Ok(factors.remove(0));
  }
  Expression::multiplication(factors)
}

fn beautify_product(e: Expression) -> PoolResult {
  let mut negative = false;
  let mut numerator = Vec::new();
  let mut denominator = Vec::new();
  for factor in e.children() {
    match factor.kind() {
      NodeKind::Rational(r) => {
        negative ^= r.is_negative();
        let r = r.abs();
        if !r.numer().is_one() {
          numerator.push(Expression::big_integer(r.numer().clone())?);
        }
        if !r.denom().is_one() {
          denominator.push(Expression::big_integer(r.denom().clone())?);
        }
      }
      NodeKind::Float(value) if value < 0.0 => {
        negative = !negative;
        numerator.push(Expression::float(-value)?);
      }
      NodeKind::Power => match exact_exponent(factor.child(1)) {
        Some(r) if r.is_negative() => {
          denominator.push(positive_power(factor.child(0), &-r)?);
        }
        _ => numerator.push(beautify(factor)?),
      },
      _ => numerator.push(beautify(factor)?),
    }
  }
  if numerator.is_empty() {
    numerator.push(Expression::integer(1)?);
  }
  let top = product_of(numerator)?;
  let quotient = if denominator.is_empty() {
    top
  } else {
    Expression::division(top, product_of(denominator)?)?
  };
  if negative {
    Expression::opposite(quotient)
  } else {
    Ok(quotient)
  }
}

/// The opposite of a term that displays with a leading minus sign.
fn negated_term(term: Expression) -> PoolResult<Option<Expression>> {
  if let Some(n) = Number::of(term) {
    return if n.is_negative() {
      n.neg().to_expression().map(Some)
    } else {
      Ok(None)
    };
  }
  if !term.matches_kind(|k| matches!(k, NodeKind::Multiplication)) {
    return Ok(None);
  }
  let mut factors = term.children();
  let Some(coefficient) = Number::of(factors[0]).filter(Number::is_negative) else {
    return Ok(None);
  };
  let magnitude = coefficient.neg();
  if magnitude.is_one() {
    factors.remove(0);
  } else {
    factors[0] = magnitude.to_expression()?;
  }
  product_of(factors).map(Some)
}

fn beautify_sum(e: Expression) -> PoolResult {
  let mut terms = e.children();
  terms.sort_by(|a, b| degree_order(*a, *b));
  let mut sum: Option<Expression> = None;
  for term in terms {
    let next = match (sum, negated_term(term)?) {
      (None, _) => beautify(term)?,
      (Some(left), Some(magnitude)) => Expression::subtraction(left, beautify(magnitude)?)?,
      (Some(left), None) => {
        let right = beautify(term)?;
        if left.matches_kind(|k| matches!(k, NodeKind::Addition)) {
          let mut children = left.children();
          children.push(right);
          Expression::addition(children)?
        } else {
          Expression::addition(vec![left, right])?
        }
      }
    };
    sum = Some(next);
  }
  match sum {
    Some(sum) => Ok(sum),
    None => Expression::integer(0),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::ReductionContext;
  use crate::pool;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn beautified(text: &str) -> String {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let reduced = deep_reduce(crate::parse(text).unwrap(), &ctx, None).unwrap();
    beautify(reduced).unwrap().to_string()
  }

  #[test]
  fn signs_and_fractions() {
    assert_eq!(beautified("sin(-x)"), "-sin(x)");
    assert_eq!(beautified("1/x"), "1/x");
    assert_eq!(beautified("y/x^2"), "y/x^2");
    assert_eq!(beautified("acos(0)"), "pi/2");
  }

  #[test]
  fn roots_and_logarithms() {
    assert_eq!(beautified("sqrt(12)"), "2*sqrt(3)");
    assert_eq!(beautified("root(x,3)"), "root(x,3)");
    assert_eq!(beautified("ln(x)"), "ln(x)");
  }

  #[test]
  fn sums_read_by_descending_degree() {
    assert_eq!(beautified("x^2+2*x+1"), "x^2+2*x+1");
    assert_eq!(beautified("x-y"), "x-y");
    assert_eq!(beautified("1-x^2"), "-x^2+1");
  }
}
