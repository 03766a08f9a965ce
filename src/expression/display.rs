use std::fmt;

use num_bigint::BigInt;
use num_traits::{One, Signed};

use super::{Constant, Expression, NodeKind};

const COMPARISON: u8 = 1;
const ADDITIVE: u8 = 2;
const MULTIPLICATIVE: u8 = 3;
const PREFIX: u8 = 4;
const POWER: u8 = 5;
const POSTFIX: u8 = 6;
const ATOM: u8 = 7;

fn precedence(e: Expression) -> u8 {
  match e.kind() {
    NodeKind::Rational(r) if !r.denom().is_one() => MULTIPLICATIVE,
    NodeKind::Rational(r) if r.is_negative() => PREFIX,
    NodeKind::Decimal { mantissa, .. } if mantissa.is_negative() => PREFIX,
    NodeKind::Float(f) if f < 0.0 => PREFIX,
    NodeKind::Comparison(_) => COMPARISON,
    NodeKind::Addition | NodeKind::Subtraction => ADDITIVE,
    NodeKind::Multiplication | NodeKind::Division => MULTIPLICATIVE,
    NodeKind::Opposite => PREFIX,
    NodeKind::Power => POWER,
    NodeKind::Factorial => POSTFIX,
    NodeKind::Dependency => precedence(e.child(0)),
    _ => ATOM,
  }
}

fn parenthesized(e: Expression, below: u8) -> String {
  let text = render(e);
  if precedence(e) < below {
    format!("({})", text)
  } else {
    text
  }
}

/// Like [`parenthesized`], also wrapping operands that start with a sign.
fn operand(e: Expression, below: u8) -> String {
  let text = parenthesized(e, below);
  if text.starts_with('-') {
    format!("({})", text)
  } else {
    text
  }
}

/// Zeros written out before a decimal switches to `E` notation.
const MAX_PADDING: usize = 20;

fn decimal_text(mantissa: &BigInt, exponent: i32) -> String {
  let digits = mantissa.abs().to_string();
  let sign = if mantissa.is_negative() { "-" } else { "" };
  let shift = exponent.unsigned_abs() as usize;
  let padding = if exponent >= 0 {
    shift
  } else {
    shift.saturating_sub(digits.len())
  };
  if padding > MAX_PADDING {
    return format!("{}{}E{}", sign, digits, exponent);
  }
  if exponent >= 0 {
    return format!("{}{}{}", sign, digits, "0".repeat(shift));
  }
  let text = if digits.len() > shift {
    let (int, frac) = digits.split_at(digits.len() - shift);
    format!("{}.{}", int, frac)
  } else {
    format!("0.{}{}", "0".repeat(shift - digits.len()), digits)
  };
  format!("{}{}", sign, text)
}

/// Shortest text that reads back as the same `f64`.
pub fn float_text(value: f64) -> String {
  if value.is_infinite() {
    return "undef".to_string();
  }
  let magnitude = value.abs();
  if magnitude != 0.0 && !(1e-6..1e16).contains(&magnitude) {
    format!("{:e}", value).replace('e', "E")
  } else {
    format!("{}", value)
  }
}

fn call(name: &str, arguments: &[Expression]) -> String {
  let arguments: Vec<String> = arguments.iter().map(|a| render(*a)).collect();
  format!("{}({})", name, arguments.join(","))
}

fn render(e: Expression) -> String {
  let node = e.node();
  let children = &node.children;
  match &node.kind {
    NodeKind::Rational(r) => {
      if r.denom().is_one() {
        r.numer().to_string()
      } else {
        format!("{}/{}", r.numer(), r.denom())
      }
    }
    NodeKind::Decimal { mantissa, exponent } => decimal_text(mantissa, *exponent),
    NodeKind::Float(f) => float_text(*f),
    NodeKind::Constant(Constant::Pi) => "pi".to_string(),
    NodeKind::Constant(Constant::E) => "e".to_string(),
    NodeKind::Constant(Constant::I) => "i".to_string(),
    NodeKind::Boolean(b) => b.to_string(),
    NodeKind::Undefined => "undef".to_string(),
    NodeKind::Random => "random()".to_string(),
    NodeKind::Symbol(name) => name.clone(),
    NodeKind::Function(name) => call(name, children),
    NodeKind::Addition => {
      let mut text = String::new();
      for (i, child) in children.iter().enumerate() {
        let term = parenthesized(*child, ADDITIVE);
        if i > 0 && !term.starts_with('-') {
          text.push('+');
        }
        text.push_str(&term);
      }
      text
    }
    NodeKind::Subtraction => format!(
      "{}-{}",
      parenthesized(children[0], ADDITIVE),
      operand(children[1], MULTIPLICATIVE)
    ),
    NodeKind::Multiplication => {
      let factors: Vec<String> = children
        .iter()
        .enumerate()
        .map(|(i, c)| {
          if i == 0 {
            parenthesized(*c, MULTIPLICATIVE)
          } else {
            operand(*c, PREFIX)
          }
        })
        .collect();
      factors.join("*")
    }
    NodeKind::Division => format!(
      "{}/{}",
      parenthesized(children[0], MULTIPLICATIVE),
      operand(children[1], PREFIX)
    ),
    NodeKind::Opposite => format!("-{}", operand(children[0], MULTIPLICATIVE)),
    NodeKind::Power => {
      let base = children[0];
      let base_text = if precedence(base) <= POWER {
        format!("({})", render(base))
      } else {
        operand(base, ATOM)
      };
      format!("{}^{}", base_text, operand(children[1], ATOM))
    }
    NodeKind::Factorial => format!("{}!", operand(children[0], ATOM)),
    NodeKind::SquareRoot => call("sqrt", children),
    NodeKind::NthRoot => call("root", children),
    NodeKind::AbsoluteValue => call("abs", children),
    NodeKind::Floor => call("floor", children),
    NodeKind::Ceiling => call("ceil", children),
    NodeKind::Logarithm => call("log", children),
    NodeKind::NaturalLogarithm => call("ln", children),
    NodeKind::Trigonometry(f) => call(f.name(), children),
    NodeKind::Conjugate => call("conj", children),
    NodeKind::RealPart => call("re", children),
    NodeKind::ImaginaryPart => call("im", children),
    NodeKind::ListFunction(f) => call(f.name(), children),
    NodeKind::IntegerFunction(f) => call(f.name(), children),
    NodeKind::Comparison(op) => format!(
      "{}{}{}",
      parenthesized(children[0], ADDITIVE),
      op.symbol(),
      parenthesized(children[1], ADDITIVE)
    ),
    NodeKind::List => {
      let items: Vec<String> = children.iter().map(|c| render(*c)).collect();
      format!("{{{}}}", items.join(","))
    }
    NodeKind::Matrix { columns, .. } => {
      let mut text = String::from("[");
      for row in children.chunks((*columns).max(1)) {
        let entries: Vec<String> = row.iter().map(|c| render(*c)).collect();
        text.push_str(&format!("[{}]", entries.join(",")));
      }
      text.push(']');
      text
    }
    NodeKind::Dependency => render(children[0]),
    NodeKind::Sum => call("sum", children),
    NodeKind::Product => call("product", children),
    NodeKind::Integral => call("int", children),
    NodeKind::Derivative => {
      if children[3].is_one() {
        call("diff", &children[..3])
      } else {
        call("diff", children)
      }
    }
  }
}

impl fmt::Display for Expression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&render(*self))
  }
}

impl fmt::Debug for Expression {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if crate::pool::is_valid(*self) {
      write!(f, "Expression({})", render(*self))
    } else {
      write!(f, "Expression(#{} stale)", self.index)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decimals_render_with_their_point() {
    assert_eq!(decimal_text(&BigInt::from(15), -1), "1.5");
    assert_eq!(decimal_text(&BigInt::from(-5), -3), "-0.005");
    assert_eq!(decimal_text(&BigInt::from(12), 2), "1200");
  }

  #[test]
  fn floats_use_exponent_when_large() {
    assert_eq!(float_text(0.8333333333333334), "0.8333333333333334");
    assert_eq!(float_text(1.0), "1");
    assert_eq!(float_text(1.5e20), "1.5E20");
  }
}
