//! Flat byte form of expression trees.
//!
//! Layout: a little-endian `u32` total size (header included) followed by
//! one record per node in pre-order. A record is a `u8` tag, the payload
//! of the node kind, then a `u32` child count.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;
use thiserror::Error;

use super::{
  ComparisonOperator, Constant, Expression, IntegerFunction, ListFunction,
  NodeKind, TrigonometricFunction,
};
use crate::checkpoint::Interruption;
use crate::pool;

const MAX_DEPTH: usize = 512;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("buffer ends in the middle of a record")]
  Truncated,
  #[error("unknown node tag {0}")]
  UnknownTag(u8),
  #[error("invalid payload for node tag {0}")]
  InvalidPayload(u8),
  #[error("size header says {declared} bytes, buffer holds {actual}")]
  SizeMismatch { declared: usize, actual: usize },
  #[error("tree nests deeper than {MAX_DEPTH} levels")]
  TooDeep,
  #[error(transparent)]
  Interrupted(#[from] Interruption),
}

fn tag(kind: &NodeKind) -> u8 {
  match kind {
    NodeKind::Rational(_) => 0,
    NodeKind::Decimal { .. } => 1,
    NodeKind::Float(_) => 2,
    NodeKind::Constant(_) => 3,
    NodeKind::Boolean(_) => 4,
    NodeKind::Undefined => 5,
    NodeKind::Random => 6,
    NodeKind::Symbol(_) => 7,
    NodeKind::Function(_) => 8,
    NodeKind::Addition => 9,
    NodeKind::Subtraction => 10,
    NodeKind::Multiplication => 11,
    NodeKind::Division => 12,
    NodeKind::Opposite => 13,
    NodeKind::Power => 14,
    NodeKind::SquareRoot => 15,
    NodeKind::NthRoot => 16,
    NodeKind::Factorial => 17,
    NodeKind::AbsoluteValue => 18,
    NodeKind::Floor => 19,
    NodeKind::Ceiling => 20,
    NodeKind::Logarithm => 21,
    NodeKind::NaturalLogarithm => 22,
    NodeKind::Trigonometry(_) => 23,
    NodeKind::Conjugate => 24,
    NodeKind::RealPart => 25,
    NodeKind::ImaginaryPart => 26,
    NodeKind::Comparison(_) => 27,
    NodeKind::List => 28,
    NodeKind::Matrix { .. } => 29,
    NodeKind::Dependency => 30,
    NodeKind::Sum => 31,
    NodeKind::Product => 32,
    NodeKind::Integral => 33,
    NodeKind::Derivative => 34,
    NodeKind::ListFunction(_) => 35,
    NodeKind::IntegerFunction(_) => 36,
  }
}

const CONSTANTS: [Constant; 3] = [Constant::Pi, Constant::E, Constant::I];

const TRIGONOMETRY: [TrigonometricFunction; 6] = [
  TrigonometricFunction::Sine,
  TrigonometricFunction::Cosine,
  TrigonometricFunction::Tangent,
  TrigonometricFunction::ArcSine,
  TrigonometricFunction::ArcCosine,
  TrigonometricFunction::ArcTangent,
];

const LIST_FUNCTIONS: [ListFunction; 5] = [
  ListFunction::Minimum,
  ListFunction::Maximum,
  ListFunction::Sum,
  ListFunction::Product,
  ListFunction::Sort,
];

const INTEGER_FUNCTIONS: [IntegerFunction; 4] = [
  IntegerFunction::Binomial,
  IntegerFunction::Permute,
  IntegerFunction::Quotient,
  IntegerFunction::Remainder,
];

const COMPARISONS: [ComparisonOperator; 6] = [
  ComparisonOperator::Equal,
  ComparisonOperator::NotEqual,
  ComparisonOperator::Less,
  ComparisonOperator::LessOrEqual,
  ComparisonOperator::Greater,
  ComparisonOperator::GreaterOrEqual,
];

fn position<T: PartialEq>(table: &[T], value: &T) -> u8 {
  table.iter().position(|v| v == value).unwrap_or(0) as u8
}

struct Writer {
  bytes: Vec<u8>,
}

impl Writer {
  fn u32(&mut self, value: usize) {
    self.bytes.extend_from_slice(&(value as u32).to_le_bytes());
  }

  fn big(&mut self, value: &BigInt) {
    let raw = value.to_signed_bytes_le();
    self.u32(raw.len());
    self.bytes.extend_from_slice(&raw);
  }

  fn text(&mut self, value: &str) {
    self.u32(value.len());
    self.bytes.extend_from_slice(value.as_bytes());
  }

  fn node(&mut self, e: Expression) {
    let node = e.node();
    self.bytes.push(tag(&node.kind));
    match &node.kind {
      NodeKind::Rational(r) => {
        self.big(r.numer());
        self.big(r.denom());
      }
      NodeKind::Decimal { mantissa, exponent } => {
        self.big(mantissa);
        self.bytes.extend_from_slice(&exponent.to_le_bytes());
      }
      NodeKind::Float(f) => self.bytes.extend_from_slice(&f.to_bits().to_le_bytes()),
      NodeKind::Constant(c) => self.bytes.push(position(&CONSTANTS, c)),
      NodeKind::Boolean(b) => self.bytes.push(u8::from(*b)),
      NodeKind::Symbol(name) | NodeKind::Function(name) => self.text(name),
      NodeKind::Trigonometry(f) => self.bytes.push(position(&TRIGONOMETRY, f)),
      NodeKind::Comparison(op) => self.bytes.push(position(&COMPARISONS, op)),
      NodeKind::ListFunction(f) => self.bytes.push(position(&LIST_FUNCTIONS, f)),
      NodeKind::IntegerFunction(f) => {
        self.bytes.push(position(&INTEGER_FUNCTIONS, f))
      }
      NodeKind::Matrix { rows, columns } => {
        self.u32(*rows);
        self.u32(*columns);
      }
      _ => {}
    }
    self.u32(node.children.len());
    for child in node.children {
      self.node(child);
    }
  }
}

struct Reader<'a> {
  bytes: &'a [u8],
  offset: usize,
}

impl<'a> Reader<'a> {
  fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
    let end = self.offset.checked_add(n).ok_or(DecodeError::Truncated)?;
    let slice = self.bytes.get(self.offset..end).ok_or(DecodeError::Truncated)?;
    self.offset = end;
    Ok(slice)
  }

  fn u8(&mut self) -> Result<u8, DecodeError> {
    Ok(self.take(1)?[0])
  }

  fn u32(&mut self) -> Result<usize, DecodeError> {
    let raw = self.take(4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize)
  }

  fn i32(&mut self) -> Result<i32, DecodeError> {
    let raw = self.take(4)?;
    Ok(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
  }

  fn f64(&mut self) -> Result<f64, DecodeError> {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(self.take(8)?);
    Ok(f64::from_bits(u64::from_le_bytes(raw)))
  }

  fn big(&mut self) -> Result<BigInt, DecodeError> {
    let len = self.u32()?;
    Ok(BigInt::from_signed_bytes_le(self.take(len)?))
  }

  fn text(&mut self, tag: u8) -> Result<String, DecodeError> {
    let len = self.u32()?;
    String::from_utf8(self.take(len)?.to_vec())
      .map_err(|_| DecodeError::InvalidPayload(tag))
  }

  fn indexed<T: Copy>(&mut self, tag: u8, table: &[T]) -> Result<T, DecodeError> {
    let i = self.u8()? as usize;
    table.get(i).copied().ok_or(DecodeError::InvalidPayload(tag))
  }

  fn kind(&mut self, tag: u8) -> Result<NodeKind, DecodeError> {
    Ok(match tag {
      0 => {
        let numerator = self.big()?;
        let denominator = self.big()?;
        if denominator.is_zero() {
          return Err(DecodeError::InvalidPayload(tag));
        }
        NodeKind::Rational(BigRational::new(numerator, denominator))
      }
      1 => NodeKind::Decimal {
        mantissa: self.big()?,
        exponent: self.i32()?,
      },
      2 => NodeKind::Float(self.f64()?),
      3 => NodeKind::Constant(self.indexed(tag, &CONSTANTS)?),
      4 => NodeKind::Boolean(self.u8()? != 0),
      5 => NodeKind::Undefined,
      6 => NodeKind::Random,
      7 => NodeKind::Symbol(self.text(tag)?),
      8 => NodeKind::Function(self.text(tag)?),
      9 => NodeKind::Addition,
      10 => NodeKind::Subtraction,
      11 => NodeKind::Multiplication,
      12 => NodeKind::Division,
      13 => NodeKind::Opposite,
      14 => NodeKind::Power,
      15 => NodeKind::SquareRoot,
      16 => NodeKind::NthRoot,
      17 => NodeKind::Factorial,
      18 => NodeKind::AbsoluteValue,
      19 => NodeKind::Floor,
      20 => NodeKind::Ceiling,
      21 => NodeKind::Logarithm,
      22 => NodeKind::NaturalLogarithm,
      23 => NodeKind::Trigonometry(self.indexed(tag, &TRIGONOMETRY)?),
      24 => NodeKind::Conjugate,
      25 => NodeKind::RealPart,
      26 => NodeKind::ImaginaryPart,
      27 => NodeKind::Comparison(self.indexed(tag, &COMPARISONS)?),
      28 => NodeKind::List,
      29 => NodeKind::Matrix {
        rows: self.u32()?,
        columns: self.u32()?,
      },
      30 => NodeKind::Dependency,
      31 => NodeKind::Sum,
      32 => NodeKind::Product,
      33 => NodeKind::Integral,
      34 => NodeKind::Derivative,
      35 => NodeKind::ListFunction(self.indexed(tag, &LIST_FUNCTIONS)?),
      36 => NodeKind::IntegerFunction(self.indexed(tag, &INTEGER_FUNCTIONS)?),
      other => return Err(DecodeError::UnknownTag(other)),
    })
  }

  fn node(&mut self, depth: usize) -> Result<Expression, DecodeError> {
    if depth > MAX_DEPTH {
      return Err(DecodeError::TooDeep);
    }
    let tag = self.u8()?;
    let kind = self.kind(tag)?;
    let count = self.u32()?;
    // Every child record takes at least five bytes
    if count > self.bytes.len().saturating_sub(self.offset) / 5 {
      return Err(DecodeError::Truncated);
    }
    if let NodeKind::Matrix { rows, columns } = kind {
      if rows.checked_mul(columns) != Some(count) {
        return Err(DecodeError::InvalidPayload(tag));
      }
    }
    let mut children = Vec::with_capacity(count);
    for _ in 0..count {
      children.push(self.node(depth + 1)?);
    }
    Ok(Expression::new(kind, children)?)
  }
}

impl Expression {
  /// Serializes the tree rooted here.
  pub fn to_bytes(self) -> Vec<u8> {
    let mut writer = Writer {
      bytes: vec![0; 4],
    };
    writer.node(self);
    let size = (writer.bytes.len() as u32).to_le_bytes();
    writer.bytes[..4].copy_from_slice(&size);
    writer.bytes
  }

  /// Rebuilds a tree from [`Expression::to_bytes`] output, allocating fresh
  /// nodes in the pool. A rejected buffer leaves the pool as it was.
  pub fn from_address(bytes: &[u8]) -> Result<Expression, DecodeError> {
    let start = pool::cursor();
    let decoded = decode(bytes);
    if decoded.is_err() {
      pool::tidy_from(start);
    }
    decoded
  }
}

fn decode(bytes: &[u8]) -> Result<Expression, DecodeError> {
  let mut reader = Reader { bytes, offset: 0 };
  let declared = reader.u32()?;
  if declared > bytes.len() || declared < 4 {
    return Err(DecodeError::SizeMismatch {
      declared,
      actual: bytes.len(),
    });
  }
  reader.bytes = &bytes[..declared];
  let root = reader.node(0)?;
  if reader.offset != declared {
    return Err(DecodeError::SizeMismatch {
      declared,
      actual: reader.offset,
    });
  }
  Ok(root)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Expression {
    let x = Expression::symbol("x").unwrap();
    let half = Expression::fraction(-1, 2).unwrap();
    let power = Expression::power(x, half).unwrap();
    let decimal = Expression::decimal(BigInt::from(-15), -1).unwrap();
    let matrix = Expression::matrix(1, 2, vec![power, decimal]).unwrap();
    let pi = Expression::constant(Constant::Pi).unwrap();
    let f = Expression::function("f", pi).unwrap();
    Expression::list(vec![matrix, f, Expression::float(0.25).unwrap()]).unwrap()
  }

  #[test]
  fn decoded_tree_is_identical_and_fresh() {
    pool::clear_pool();
    let tree = sample();
    let bytes = tree.to_bytes();
    assert_eq!(
      u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
      bytes.len()
    );
    let copy = Expression::from_address(&bytes).unwrap();
    assert!(copy.is_identical_to(tree));
    assert!(!copy.same_node(tree));
  }

  #[test]
  fn truncated_buffers_are_rejected() {
    pool::clear_pool();
    let bytes = sample().to_bytes();
    let mut cut = bytes[..bytes.len() - 3].to_vec();
    let size = (cut.len() as u32).to_le_bytes();
    cut[..4].copy_from_slice(&size);
    assert!(Expression::from_address(&cut).is_err());
    assert!(matches!(
      Expression::from_address(&bytes[..2]),
      Err(DecodeError::Truncated)
    ));
  }

  #[test]
  fn rejected_buffers_release_their_nodes() {
    pool::clear_pool();
    let bytes = sample().to_bytes();
    let mut tampered = bytes.clone();
    // Last record is the float; its tag becomes unknown
    let last_tag = tampered.len() - 13;
    tampered[last_tag] = 200;
    let before = pool::cursor();
    assert!(Expression::from_address(&tampered).is_err());
    assert_eq!(pool::cursor(), before);
  }

  #[test]
  fn function_payloads_survive() {
    pool::clear_pool();
    for text in ["sort({2,1})", "rem(7,2)", "atan(x)"] {
      let tree = crate::parse(text).unwrap();
      let copy = Expression::from_address(&tree.to_bytes()).unwrap();
      assert_eq!(copy.to_string(), text);
    }
  }

  #[test]
  fn unknown_tags_are_rejected() {
    pool::clear_pool();
    let bytes = vec![9, 0, 0, 0, 200, 0, 0, 0, 0];
    assert!(matches!(
      Expression::from_address(&bytes),
      Err(DecodeError::UnknownTag(200))
    ));
  }
}
