//! Expression nodes and the handles that reference them.
//!
//! An [`Expression`] is a copyable reference into the thread-local node
//! pool. Copying a handle shares the node, [`Expression::deep_clone`]
//! duplicates the whole tree into fresh nodes. Nodes are immutable once
//! allocated: rewrites build new nodes and leave the old ones to be tidied
//! by the enclosing checkpoint.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive};

use crate::pool::{self, PoolResult};

mod codec;
mod display;
mod number;
mod order;

pub use codec::DecodeError;
pub use number::{
  extract_root, rational_power, small_factorization, Number, MAX_DECIMAL_EXPONENT,
};
pub use order::simplification_order;

/// Index of the parametered child (the body) of sum, product, integral and
/// derivative nodes.
pub const PARAMETERED_CHILD_INDEX: usize = 0;
/// Index of the bound variable of parametered nodes.
pub const PARAMETER_CHILD_INDEX: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Constant {
  Pi,
  E,
  I,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrigonometricFunction {
  Sine,
  Cosine,
  Tangent,
  ArcSine,
  ArcCosine,
  ArcTangent,
}

impl TrigonometricFunction {
  pub fn name(self) -> &'static str {
    match self {
      TrigonometricFunction::Sine => "sin",
      TrigonometricFunction::Cosine => "cos",
      TrigonometricFunction::Tangent => "tan",
      TrigonometricFunction::ArcSine => "asin",
      TrigonometricFunction::ArcCosine => "acos",
      TrigonometricFunction::ArcTangent => "atan",
    }
  }

  pub fn is_inverse(self) -> bool {
    matches!(
      self,
      TrigonometricFunction::ArcSine
        | TrigonometricFunction::ArcCosine
        | TrigonometricFunction::ArcTangent
    )
  }
}

/// Functions of a whole list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ListFunction {
  Minimum,
  Maximum,
  Sum,
  Product,
  Sort,
}

impl ListFunction {
  pub fn name(self) -> &'static str {
    match self {
      ListFunction::Minimum => "min",
      ListFunction::Maximum => "max",
      ListFunction::Sum => "sum",
      ListFunction::Product => "product",
      ListFunction::Sort => "sort",
    }
  }
}

/// Two-argument functions of integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IntegerFunction {
  Binomial,
  Permute,
  Quotient,
  Remainder,
}

impl IntegerFunction {
  pub fn name(self) -> &'static str {
    match self {
      IntegerFunction::Binomial => "binomial",
      IntegerFunction::Permute => "permute",
      IntegerFunction::Quotient => "quo",
      IntegerFunction::Remainder => "rem",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComparisonOperator {
  Equal,
  NotEqual,
  Less,
  LessOrEqual,
  Greater,
  GreaterOrEqual,
}

impl ComparisonOperator {
  pub fn symbol(self) -> &'static str {
    match self {
      ComparisonOperator::Equal => "=",
      ComparisonOperator::NotEqual => "!=",
      ComparisonOperator::Less => "<",
      ComparisonOperator::LessOrEqual => "<=",
      ComparisonOperator::Greater => ">",
      ComparisonOperator::GreaterOrEqual => ">=",
    }
  }

  pub fn holds(self, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match self {
      ComparisonOperator::Equal => ordering == Equal,
      ComparisonOperator::NotEqual => ordering != Equal,
      ComparisonOperator::Less => ordering == Less,
      ComparisonOperator::LessOrEqual => ordering != Greater,
      ComparisonOperator::Greater => ordering == Greater,
      ComparisonOperator::GreaterOrEqual => ordering != Less,
    }
  }
}

/// The type tag of a node, with the payload of leaf kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
  Rational(BigRational),
  /// `mantissa * 10^exponent`, as typed by the user.
  Decimal {
    mantissa: BigInt,
    exponent: i32,
  },
  Float(f64),
  Constant(Constant),
  Boolean(bool),
  Undefined,
  Random,
  Symbol(String),
  /// User function applied to its single child.
  Function(String),
  Addition,
  Subtraction,
  Multiplication,
  Division,
  Opposite,
  Power,
  SquareRoot,
  /// Children: radicand, index.
  NthRoot,
  Factorial,
  AbsoluteValue,
  Floor,
  Ceiling,
  /// Children: argument, base.
  Logarithm,
  NaturalLogarithm,
  Trigonometry(TrigonometricFunction),
  Conjugate,
  RealPart,
  ImaginaryPart,
  Comparison(ComparisonOperator),
  /// Child: the list.
  ListFunction(ListFunction),
  IntegerFunction(IntegerFunction),
  List,
  Matrix {
    rows: usize,
    columns: usize,
  },
  /// Children: main expression, list of conditions.
  Dependency,
  /// Children: body, variable, lower bound, upper bound.
  Sum,
  Product,
  Integral,
  /// Children: body, variable, point, order.
  Derivative,
}

impl NodeKind {
  pub fn is_number(&self) -> bool {
    matches!(
      self,
      NodeKind::Rational(_) | NodeKind::Decimal { .. } | NodeKind::Float(_)
    )
  }

  pub fn is_parametered(&self) -> bool {
    matches!(
      self,
      NodeKind::Sum | NodeKind::Product | NodeKind::Integral | NodeKind::Derivative
    )
  }

  pub fn is_n_ary(&self) -> bool {
    matches!(self, NodeKind::Addition | NodeKind::Multiplication)
  }

  pub fn is_container(&self) -> bool {
    matches!(self, NodeKind::List | NodeKind::Matrix { .. })
  }
}

#[derive(Debug, Clone)]
pub struct ExpressionNode {
  pub kind: NodeKind,
  pub children: Vec<Expression>,
}

impl ExpressionNode {
  /// Bytes this node occupies in the pool.
  pub(crate) fn record_size(&self) -> usize {
    let payload = match &self.kind {
      NodeKind::Rational(r) => {
        8 + (r.numer().bits() as usize + r.denom().bits() as usize) / 8
      }
      NodeKind::Decimal { mantissa, .. } => 8 + mantissa.bits() as usize / 8,
      NodeKind::Float(_) => 8,
      NodeKind::Symbol(name) | NodeKind::Function(name) => name.len() + 1,
      NodeKind::Matrix { .. } => 8,
      _ => 0,
    };
    16 + 4 * self.children.len() + payload
  }
}

/// Handle to a node in the pool.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Expression {
  index: u32,
  generation: u32,
}

impl Expression {
  pub(crate) fn from_raw(index: u32, generation: u32) -> Self {
    Expression { index, generation }
  }

  pub(crate) fn index(self) -> u32 {
    self.index
  }

  pub(crate) fn generation(self) -> u32 {
    self.generation
  }

  pub fn new(kind: NodeKind, children: Vec<Expression>) -> PoolResult {
    pool::alloc(ExpressionNode { kind, children })
  }

  pub fn node(self) -> ExpressionNode {
    pool::with_node(self, Clone::clone)
  }

  pub fn kind(self) -> NodeKind {
    pool::with_node(self, |n| n.kind.clone())
  }

  pub fn children(self) -> Vec<Expression> {
    pool::with_node(self, |n| n.children.clone())
  }

  pub fn child(self, i: usize) -> Expression {
    pool::with_node(self, |n| n.children[i])
  }

  pub fn number_of_children(self) -> usize {
    pool::with_node(self, |n| n.children.len())
  }

  /// Whether both handles reference the very same node.
  pub fn same_node(self, other: Expression) -> bool {
    self.index == other.index && self.generation == other.generation
  }

  pub fn matches_kind(self, test: impl FnOnce(&NodeKind) -> bool) -> bool {
    pool::with_node(self, |n| test(&n.kind))
  }

  pub fn is_undefined(self) -> bool {
    self.matches_kind(|k| matches!(k, NodeKind::Undefined))
  }

  pub fn is_number(self) -> bool {
    self.matches_kind(NodeKind::is_number)
  }

  pub fn is_parametered(self) -> bool {
    self.matches_kind(NodeKind::is_parametered)
  }

  pub fn is_random(self) -> bool {
    self.matches_kind(|k| matches!(k, NodeKind::Random))
  }

  pub fn is_constant(self, constant: Constant) -> bool {
    self.matches_kind(|k| *k == NodeKind::Constant(constant))
  }

  pub fn is_symbol_named(self, name: &str) -> bool {
    self.matches_kind(|k| matches!(k, NodeKind::Symbol(s) if s == name))
  }

  pub fn symbol_name(self) -> Option<String> {
    pool::with_node(self, |n| match &n.kind {
      NodeKind::Symbol(name) | NodeKind::Function(name) => Some(name.clone()),
      _ => None,
    })
  }

  /// Exact value of rational and decimal nodes.
  pub fn rational_value(self) -> Option<BigRational> {
    pool::with_node(self, |n| match &n.kind {
      NodeKind::Rational(r) => Some(r.clone()),
      NodeKind::Decimal { mantissa, exponent } => {
        number::decimal_to_rational(mantissa, *exponent)
      }
      _ => None,
    })
  }

  /// Nearest `f64` of a decimal node, also when it is too large to be
  /// exact.
  pub fn decimal_value(self) -> Option<f64> {
    pool::with_node(self, |n| match &n.kind {
      NodeKind::Decimal { mantissa, exponent } => {
        Some(number::decimal_to_f64(mantissa, *exponent))
      }
      _ => None,
    })
  }

  pub fn integer_value(self) -> Option<BigInt> {
    self
      .rational_value()
      .filter(BigRational::is_integer)
      .map(|r| r.to_integer())
  }

  pub fn small_integer_value(self) -> Option<i64> {
    self.integer_value().and_then(|i| i.to_i64())
  }

  pub fn is_zero(self) -> bool {
    Number::of(self).is_some_and(|n| n.is_zero())
  }

  pub fn is_one(self) -> bool {
    Number::of(self).is_some_and(|n| n.is_one())
  }

  pub fn is_minus_one(self) -> bool {
    self.rational_value().is_some_and(|r| r == -BigRational::one())
  }

  pub fn is_negative_number(self) -> bool {
    Number::of(self).is_some_and(|n| n.is_negative())
  }

  pub fn is_positive_rational(self) -> bool {
    self.rational_value().is_some_and(|r| r.is_positive())
  }

  /// Structural equality.
  pub fn is_identical_to(self, other: Expression) -> bool {
    if self.same_node(other) {
      return true;
    }
    let (a, b) = (self.node(), other.node());
    a.kind == b.kind
      && a.children.len() == b.children.len()
      && a
        .children
        .iter()
        .zip(&b.children)
        .all(|(x, y)| x.is_identical_to(*y))
  }

  pub fn deep_clone(self) -> PoolResult {
    let node = self.node();
    let children = node
      .children
      .iter()
      .map(|c| c.deep_clone())
      .collect::<PoolResult<Vec<_>>>()?;
    Expression::new(node.kind, children)
  }

  /// A node of the same kind over `children`.
  pub fn with_children(self, children: Vec<Expression>) -> PoolResult {
    Expression::new(self.kind(), children)
  }

  pub fn replace_child(self, index: usize, child: Expression) -> PoolResult {
    let mut children = self.children();
    children[index] = child;
    self.with_children(children)
  }

  /// Number of nodes in the tree.
  pub fn tree_size(self) -> usize {
    1 + self
      .children()
      .into_iter()
      .map(Expression::tree_size)
      .sum::<usize>()
  }

  // Builders

  pub fn rational(value: BigRational) -> PoolResult {
    Expression::new(NodeKind::Rational(value), vec![])
  }

  pub fn integer(value: i64) -> PoolResult {
    Expression::rational(BigRational::from_integer(value.into()))
  }

  pub fn big_integer(value: BigInt) -> PoolResult {
    Expression::rational(BigRational::from_integer(value))
  }

  pub fn fraction(numerator: i64, denominator: i64) -> PoolResult {
    if denominator == 0 {
      return Expression::undefined();
    }
    Expression::rational(BigRational::new(numerator.into(), denominator.into()))
  }

  pub fn decimal(mantissa: BigInt, exponent: i32) -> PoolResult {
    Expression::new(NodeKind::Decimal { mantissa, exponent }, vec![])
  }

  pub fn float(value: f64) -> PoolResult {
    if value.is_nan() {
      return Expression::undefined();
    }
    Expression::new(NodeKind::Float(value), vec![])
  }

  pub fn boolean(value: bool) -> PoolResult {
    Expression::new(NodeKind::Boolean(value), vec![])
  }

  pub fn undefined() -> PoolResult {
    Expression::new(NodeKind::Undefined, vec![])
  }

  pub fn random() -> PoolResult {
    Expression::new(NodeKind::Random, vec![])
  }

  pub fn constant(constant: Constant) -> PoolResult {
    Expression::new(NodeKind::Constant(constant), vec![])
  }

  pub fn symbol(name: &str) -> PoolResult {
    Expression::new(NodeKind::Symbol(name.to_string()), vec![])
  }

  pub fn function(name: &str, argument: Expression) -> PoolResult {
    Expression::new(NodeKind::Function(name.to_string()), vec![argument])
  }

  pub fn addition(terms: Vec<Expression>) -> PoolResult {
    Expression::new(NodeKind::Addition, terms)
  }

  pub fn multiplication(factors: Vec<Expression>) -> PoolResult {
    Expression::new(NodeKind::Multiplication, factors)
  }

  pub fn subtraction(a: Expression, b: Expression) -> PoolResult {
    Expression::new(NodeKind::Subtraction, vec![a, b])
  }

  pub fn division(a: Expression, b: Expression) -> PoolResult {
    Expression::new(NodeKind::Division, vec![a, b])
  }

  pub fn opposite(a: Expression) -> PoolResult {
    Expression::new(NodeKind::Opposite, vec![a])
  }

  pub fn power(base: Expression, exponent: Expression) -> PoolResult {
    Expression::new(NodeKind::Power, vec![base, exponent])
  }

  pub fn square_root(a: Expression) -> PoolResult {
    Expression::new(NodeKind::SquareRoot, vec![a])
  }

  pub fn nth_root(a: Expression, index: Expression) -> PoolResult {
    Expression::new(NodeKind::NthRoot, vec![a, index])
  }

  pub fn factorial(a: Expression) -> PoolResult {
    Expression::new(NodeKind::Factorial, vec![a])
  }

  pub fn absolute_value(a: Expression) -> PoolResult {
    Expression::new(NodeKind::AbsoluteValue, vec![a])
  }

  pub fn logarithm(a: Expression, base: Expression) -> PoolResult {
    Expression::new(NodeKind::Logarithm, vec![a, base])
  }

  pub fn natural_logarithm(a: Expression) -> PoolResult {
    Expression::new(NodeKind::NaturalLogarithm, vec![a])
  }

  pub fn trigonometry(f: TrigonometricFunction, a: Expression) -> PoolResult {
    Expression::new(NodeKind::Trigonometry(f), vec![a])
  }

  pub fn comparison(
    op: ComparisonOperator,
    a: Expression,
    b: Expression,
  ) -> PoolResult {
    Expression::new(NodeKind::Comparison(op), vec![a, b])
  }

  pub fn list(items: Vec<Expression>) -> PoolResult {
    Expression::new(NodeKind::List, items)
  }

  pub fn matrix(
    rows: usize,
    columns: usize,
    entries: Vec<Expression>,
  ) -> PoolResult {
    debug_assert_eq!(rows * columns, entries.len());
    Expression::new(NodeKind::Matrix { rows, columns }, entries)
  }

  pub fn dependency(
    main: Expression,
    conditions: Vec<Expression>,
  ) -> PoolResult {
    let conditions = Expression::list(conditions)?;
    Expression::new(NodeKind::Dependency, vec![main, conditions])
  }

  pub fn sum(
    body: Expression,
    variable: Expression,
    lower: Expression,
    upper: Expression,
  ) -> PoolResult {
    Expression::new(NodeKind::Sum, vec![body, variable, lower, upper])
  }

  pub fn product(
    body: Expression,
    variable: Expression,
    lower: Expression,
    upper: Expression,
  ) -> PoolResult {
    Expression::new(NodeKind::Product, vec![body, variable, lower, upper])
  }

  pub fn integral(
    body: Expression,
    variable: Expression,
    lower: Expression,
    upper: Expression,
  ) -> PoolResult {
    Expression::new(NodeKind::Integral, vec![body, variable, lower, upper])
  }

  pub fn derivative(
    body: Expression,
    variable: Expression,
    point: Expression,
    order: Expression,
  ) -> PoolResult {
    Expression::new(NodeKind::Derivative, vec![body, variable, point, order])
  }
}
