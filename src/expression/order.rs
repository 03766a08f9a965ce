use std::cmp::Ordering;

use super::{Expression, NodeKind, Number};

fn rank(kind: &NodeKind) -> u8 {
  match kind {
    NodeKind::Rational(_) | NodeKind::Decimal { .. } | NodeKind::Float(_) => 0,
    NodeKind::Constant(_) => 1,
    NodeKind::Symbol(_) => 2,
    NodeKind::Power => 3,
    NodeKind::Multiplication => 4,
    NodeKind::Addition => 5,
    NodeKind::Function(_) => 6,
    NodeKind::SquareRoot | NodeKind::NthRoot => 7,
    NodeKind::Logarithm | NodeKind::NaturalLogarithm => 8,
    NodeKind::Trigonometry(_) => 9,
    NodeKind::AbsoluteValue => 10,
    NodeKind::Floor => 11,
    NodeKind::Ceiling => 12,
    NodeKind::Factorial => 13,
    NodeKind::Conjugate => 14,
    NodeKind::RealPart => 15,
    NodeKind::ImaginaryPart => 16,
    NodeKind::Subtraction => 17,
    NodeKind::Division => 18,
    NodeKind::Opposite => 19,
    NodeKind::ListFunction(_) => 31,
    NodeKind::IntegerFunction(_) => 32,
    NodeKind::Sum => 20,
    NodeKind::Product => 21,
    NodeKind::Integral => 22,
    NodeKind::Derivative => 23,
    NodeKind::Random => 24,
    NodeKind::Comparison(_) => 25,
    NodeKind::Boolean(_) => 26,
    NodeKind::List => 27,
    NodeKind::Matrix { .. } => 28,
    NodeKind::Dependency => 29,
    NodeKind::Undefined => 30,
  }
}

fn payload_order(a: &NodeKind, b: &NodeKind) -> Ordering {
  match (a, b) {
    (NodeKind::Constant(x), NodeKind::Constant(y)) => x.cmp(y),
    (NodeKind::Symbol(x), NodeKind::Symbol(y))
    | (NodeKind::Function(x), NodeKind::Function(y)) => x.cmp(y),
    (NodeKind::Trigonometry(x), NodeKind::Trigonometry(y)) => x.cmp(y),
    (NodeKind::Comparison(x), NodeKind::Comparison(y)) => x.cmp(y),
    (NodeKind::ListFunction(x), NodeKind::ListFunction(y)) => x.cmp(y),
    (NodeKind::IntegerFunction(x), NodeKind::IntegerFunction(y)) => x.cmp(y),
    (NodeKind::Boolean(x), NodeKind::Boolean(y)) => x.cmp(y),
    (
      NodeKind::Matrix { rows: r1, columns: c1 },
      NodeKind::Matrix { rows: r2, columns: c2 },
    ) => (r1, c1).cmp(&(r2, c2)),
    _ => Ordering::Equal,
  }
}

/// Splits `x^n` into its base and exponent; other nodes are their own base.
fn power_key(e: Expression, kind: &NodeKind) -> (Expression, Option<Expression>) {
  if *kind == NodeKind::Power {
    (e.child(0), Some(e.child(1)))
  } else {
    (e, None)
  }
}

fn structural_order(a: Expression, b: Expression) -> Ordering {
  if a.same_node(b) {
    return Ordering::Equal;
  }
  if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
    let by_value = x.compare(&y).unwrap_or(Ordering::Equal);
    // Exact before float at equal values
    return by_value.then(y.is_rational().cmp(&x.is_rational()));
  }
  let (ka, kb) = (a.kind(), b.kind());
  rank(&ka)
    .cmp(&rank(&kb))
    .then_with(|| payload_order(&ka, &kb))
    .then_with(|| {
      let (ca, cb) = (a.children(), b.children());
      for (x, y) in ca.iter().zip(&cb) {
        let order = simplification_order(*x, *y);
        if order != Ordering::Equal {
          return order;
        }
      }
      ca.len().cmp(&cb.len())
    })
}

/// Canonical order of operands in reduced additions and multiplications:
/// numbers first, then constants, symbols and composite nodes. Powers sort
/// by their base, right after the base itself. Equal results mean
/// structurally identical trees.
pub fn simplification_order(a: Expression, b: Expression) -> Ordering {
  if a.same_node(b) {
    return Ordering::Equal;
  }
  let (ka, kb) = (a.kind(), b.kind());
  if ka.is_number() || kb.is_number() {
    return structural_order(a, b);
  }
  let (base_a, exponent_a) = power_key(a, &ka);
  let (base_b, exponent_b) = power_key(b, &kb);
  structural_order(base_a, base_b).then_with(|| match (exponent_a, exponent_b) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Less,
    (Some(_), None) => Ordering::Greater,
    (Some(x), Some(y)) => simplification_order(x, y),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn numbers_then_constants_then_symbols() {
    crate::pool::clear_pool();
    let two = Expression::integer(2).unwrap();
    let pi = Expression::constant(super::super::Constant::Pi).unwrap();
    let x = Expression::symbol("x").unwrap();
    let y = Expression::symbol("y").unwrap();
    assert_eq!(simplification_order(two, pi), Ordering::Less);
    assert_eq!(simplification_order(pi, x), Ordering::Less);
    assert_eq!(simplification_order(y, x), Ordering::Greater);
    let x2 = Expression::symbol("x").unwrap();
    assert_eq!(simplification_order(x, x2), Ordering::Equal);
  }

  #[test]
  fn powers_follow_their_base() {
    crate::pool::clear_pool();
    let x = Expression::symbol("x").unwrap();
    let y = Expression::symbol("y").unwrap();
    let two = Expression::integer(2).unwrap();
    let x_squared = Expression::power(x, two).unwrap();
    assert_eq!(simplification_order(x, x_squared), Ordering::Less);
    assert_eq!(simplification_order(x_squared, y), Ordering::Less);
  }
}
