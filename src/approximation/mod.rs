//! Numeric evaluation of expression trees.
//!
//! [`approximate`] evaluates a tree to an [`Evaluation`] in `f32` or `f64`
//! without touching the tree. Every node it allocates along the way (symbol
//! definitions pulled from the store, mostly) is tidied before it returns.

use std::cmp::Ordering;
use std::fmt::{Debug, Display, LowerExp};

use log::debug;
use num_bigint::BigInt;
use num_complex::Complex;
use num_rational::BigRational;
use num_traits::{Float, FloatConst, FromPrimitive, One, ToPrimitive, Zero};

use crate::context::{ApproximationContext, ComplexFormat, ReductionContext};
use crate::expression::{
  ComparisonOperator, Constant, Expression, IntegerFunction, ListFunction,
  NodeKind, TrigonometricFunction, PARAMETER_CHILD_INDEX,
};
use crate::matcher::{self, IgnoredSymbols};
use crate::pool::{self, PoolResult};
use crate::reduction::shallow_reduce;
use crate::symbols::{expression_without_symbols, Resolution};

mod calculus;

/// Floating point types the approximator computes in.
pub trait Scalar:
  Float + FloatConst + FromPrimitive + Display + LowerExp + Debug + 'static
{
}

impl<T> Scalar for T where
  T: Float + FloatConst + FromPrimitive + Display + LowerExp + Debug + 'static
{
}

/// Terms evaluated at most by a numeric sum or product.
const MAX_ITERATIONS: i64 = 100_000;
/// Largest factorial argument, 171! overflows `f64`.
const MAX_FACTORIAL: i64 = 170;

pub(crate) fn scalar<T: Scalar>(value: f64) -> T {
  T::from_f64(value).unwrap_or_else(T::nan)
}

fn rational_to<T: Scalar>(r: &BigRational) -> T {
  scalar(r.to_f64().unwrap_or(f64::NAN))
}

/// The value of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<T> {
  Number(Complex<T>),
  Boolean(bool),
  List(Vec<Evaluation<T>>),
  Matrix {
    rows: usize,
    columns: usize,
    entries: Vec<Complex<T>>,
  },
  Undefined,
}

impl<T: Scalar> Evaluation<T> {
  pub fn real(value: T) -> Self {
    Evaluation::number(Complex::new(value, T::zero()))
  }

  /// A number, or `Undefined` when a part is not finite. Components
  /// negligible next to the modulus are flushed to zero.
  pub fn number(z: Complex<T>) -> Self {
    if !z.re.is_finite() || !z.im.is_finite() {
      return Evaluation::Undefined;
    }
    let negligible = z.norm() * T::epsilon() * scalar(16.0);
    let flush = |x: T| if x.abs() <= negligible { T::zero() } else { x };
    Evaluation::Number(Complex::new(flush(z.re), flush(z.im)))
  }

  pub fn is_undefined(&self) -> bool {
    matches!(self, Evaluation::Undefined)
  }

  pub fn as_number(&self) -> Option<Complex<T>> {
    match self {
      Evaluation::Number(z) => Some(*z),
      _ => None,
    }
  }

  pub fn as_real(&self) -> Option<T> {
    self.as_number().filter(|z| z.im.is_zero()).map(|z| z.re)
  }

  /// The real value, NaN for anything else.
  pub fn to_scalar(&self) -> T {
    self.as_real().unwrap_or_else(T::nan)
  }

  fn has_nonreal(&self) -> bool {
    match self {
      Evaluation::Number(z) => !z.im.is_zero(),
      Evaluation::List(items) => items.iter().any(Evaluation::has_nonreal),
      Evaluation::Matrix { entries, .. } => entries.iter().any(|z| !z.im.is_zero()),
      Evaluation::Boolean(_) | Evaluation::Undefined => false,
    }
  }

  /// Float nodes for this value, complex numbers written in `format`.
  pub fn to_expression(&self, format: ComplexFormat) -> PoolResult {
    match self {
      Evaluation::Number(z) => complex_expression(*z, format),
      Evaluation::Boolean(b) => Expression::boolean(*b),
      Evaluation::List(items) => {
        let items = items
          .iter()
          .map(|item| item.to_expression(format))
          .collect::<PoolResult<Vec<_>>>()?;
        Expression::list(items)
      }
      Evaluation::Matrix {
        rows,
        columns,
        entries,
      } => {
        let entries = entries
          .iter()
          .map(|z| complex_expression(*z, format))
          .collect::<PoolResult<Vec<_>>>()?;
        Expression::matrix(*rows, *columns, entries)
      }
      Evaluation::Undefined => Expression::undefined(),
    }
  }

  /// Calculator text for this value.
  pub fn text(&self, format: ComplexFormat) -> String {
    match self {
      Evaluation::Number(z) => complex_text(*z, format),
      Evaluation::Boolean(b) => b.to_string(),
      Evaluation::List(items) => {
        let items: Vec<String> = items.iter().map(|item| item.text(format)).collect();
        format!("{{{}}}", items.join(","))
      }
      Evaluation::Matrix {
        rows,
        columns,
        entries,
      } => {
        let mut text = String::from("[");
        for row in 0..*rows {
          let cells: Vec<String> = entries[row * columns..(row + 1) * columns]
            .iter()
            .map(|z| complex_text(*z, format))
            .collect();
          text.push_str(&format!("[{}]", cells.join(",")));
        }
        text.push(']');
        text
      }
      Evaluation::Undefined => "undef".to_string(),
    }
  }
}

fn scalar_text<T: Scalar>(value: T) -> String {
  if !value.is_finite() {
    return "undef".to_string();
  }
  if value.is_zero() {
    return "0".to_string();
  }
  let magnitude = value.abs();
  if magnitude < scalar(1e-6) || magnitude >= scalar(1e16) {
    format!("{:e}", value).replace('e', "E")
  } else {
    format!("{}", value)
  }
}

fn complex_text<T: Scalar>(z: Complex<T>, format: ComplexFormat) -> String {
  if format == ComplexFormat::Polar && !z.im.is_zero() {
    let (r, theta) = z.to_polar();
    let rotation = format!("e^({}*i)", scalar_text(theta));
    return if r.is_one() {
      rotation
    } else {
      format!("{}*{}", scalar_text(r), rotation)
    };
  }
  if z.im.is_zero() {
    return scalar_text(z.re);
  }
  let imaginary = if z.im.is_one() {
    "i".to_string()
  } else if (-z.im).is_one() {
    "-i".to_string()
  } else {
    format!("{}*i", scalar_text(z.im))
  };
  if z.re.is_zero() {
    imaginary
  } else if z.im < T::zero() {
    format!("{}{}", scalar_text(z.re), imaginary)
  } else {
    format!("{}+{}", scalar_text(z.re), imaginary)
  }
}

fn complex_expression<T: Scalar>(z: Complex<T>, format: ComplexFormat) -> PoolResult {
  let float = |x: T| Expression::float(x.to_f64().unwrap_or(f64::NAN));
  let i = || Expression::constant(Constant::I);
  if z.im.is_zero() {
    return float(z.re);
  }
  match format {
    ComplexFormat::Real => Expression::undefined(),
    ComplexFormat::Cartesian => {
      let imaginary = Expression::multiplication(vec![float(z.im)?, i()?])?;
      if z.re.is_zero() {
        Ok(imaginary)
      } else {
        Expression::addition(vec![float(z.re)?, imaginary])
      }
    }
    ComplexFormat::Polar => {
      let (r, theta) = z.to_polar();
      let angle = Expression::multiplication(vec![float(theta)?, i()?])?;
      let rotation = Expression::power(Expression::constant(Constant::E)?, angle)?;
      Expression::multiplication(vec![float(r)?, rotation])
    }
  }
}

/// Evaluates `e` in `T`. Non-real results are `Undefined` in the real
/// complex format; so is anything interrupted on the way.
pub fn approximate<T: Scalar>(e: Expression, ctx: &ApproximationContext) -> Evaluation<T> {
  let start = pool::cursor();
  let evaluation = evaluate_tree(e, ctx);
  pool::tidy_from(start);
  evaluation.unwrap_or_else(|interruption| {
    debug!("approximation of {} stopped ({})", e, interruption);
    Evaluation::Undefined
  })
}

/// [`approximate`] narrowed to a real scalar, NaN when undefined or not
/// real.
pub fn approximate_to_scalar<T: Scalar>(e: Expression, ctx: &ApproximationContext) -> T {
  approximate::<T>(e, ctx).to_scalar()
}

fn evaluate_tree<T: Scalar>(
  e: Expression,
  ctx: &ApproximationContext,
) -> PoolResult<Evaluation<T>> {
  let mut approximator = Approximator {
    ctx,
    bindings: Vec::new(),
    encountered_complex: false,
  };
  let evaluation = approximator.evaluate(e)?;
  if ctx.complex_format == ComplexFormat::Real
    && (approximator.encountered_complex || evaluation.has_nonreal())
  {
    return Ok(Evaluation::Undefined);
  }
  Ok(evaluation)
}

/// Replaces the subtrees of `e` that do not depend on any symbol by their
/// `f64` approximation and reduces the parents of what collapsed. Exact
/// rationals, symbols, random draws and the containers themselves stay.
pub fn deep_approximate_keeping_symbols(e: Expression, ctx: &ReductionContext) -> PoolResult {
  let approximation = ApproximationContext::from(ctx);
  keep_symbols(e, ctx, &approximation, None)
}

fn keep_symbols(
  e: Expression,
  ctx: &ReductionContext,
  approximation: &ApproximationContext,
  scope: Option<&IgnoredSymbols<'_>>,
) -> PoolResult {
  let kind = e.kind();
  let is_leaf_kept = matches!(
    kind,
    NodeKind::Rational(_)
      | NodeKind::Decimal { .. }
      | NodeKind::Float(_)
      | NodeKind::Symbol(_)
      | NodeKind::Boolean(_)
      | NodeKind::Undefined
      | NodeKind::Random
  );
  if is_leaf_kept {
    return Ok(e);
  }
  let collapses = !kind.is_container()
    && !matcher::deep_is_symbolic(e, approximation.store, ctx.symbolic_computation)?
    && !matcher::deep_is_random(e)?
    && !matcher::deep_is_list(e)?
    && !matcher::deep_is_matrix(e)?;
  if collapses {
    let cursor = pool::cursor();
    let value = evaluate_tree::<f64>(e, approximation)?;
    pool::tidy_from(cursor);
    return value.to_expression(ctx.complex_format);
  }

  let children = e.children();
  let inner_scope = if kind.is_parametered() {
    Some(matcher::scope_of(e, scope))
  } else {
    None
  };
  let mut approximated = Vec::with_capacity(children.len());
  let mut changed = false;
  for (i, child) in children.iter().enumerate() {
    let skipped = (kind.is_parametered() && i == PARAMETER_CHILD_INDEX)
      || (kind == NodeKind::Logarithm && i == 1 && child.is_constant(Constant::E));
    let new_child = if skipped {
      *child
    } else if kind.is_parametered() && i == 0 {
      keep_symbols(*child, ctx, approximation, inner_scope.as_ref())?
    } else {
      keep_symbols(*child, ctx, approximation, scope)?
    };
    changed |= !new_child.same_node(*child);
    approximated.push(new_child);
  }
  if !changed {
    return Ok(e);
  }
  shallow_reduce(e.with_children(approximated)?, ctx, scope)
}

struct Approximator<'c, 'a, T> {
  ctx: &'c ApproximationContext<'a>,
  /// Variables bound by enclosing sums, products, integrals and
  /// derivatives; the innermost binding is last.
  bindings: Vec<(String, Complex<T>)>,
  encountered_complex: bool,
}

impl<T: Scalar> Approximator<'_, '_, T> {
  fn evaluate(&mut self, e: Expression) -> PoolResult<Evaluation<T>> {
    let node = e.node();
    let children = &node.children;
    let evaluation = match &node.kind {
      NodeKind::Rational(r) => Evaluation::real(rational_to(r)),
      NodeKind::Decimal { .. } => match e.rational_value() {
        Some(r) => Evaluation::real(rational_to(&r)),
        None => Evaluation::real(scalar(e.decimal_value().unwrap_or(f64::NAN))),
      },
      NodeKind::Float(x) => Evaluation::real(scalar(*x)),
      NodeKind::Constant(Constant::Pi) => Evaluation::real(T::PI()),
      NodeKind::Constant(Constant::E) => Evaluation::real(T::E()),
      NodeKind::Constant(Constant::I) => Evaluation::Number(Complex::i()),
      NodeKind::Boolean(b) => Evaluation::Boolean(*b),
      NodeKind::Undefined => Evaluation::Undefined,
      NodeKind::Random => Evaluation::real(scalar(rand::random::<f64>())),
      NodeKind::Symbol(name) => self.symbol(e, name)?,
      NodeKind::Function(name) => self.function(e, name)?,
      NodeKind::List => {
        let items = children
          .iter()
          .map(|c| self.evaluate(*c))
          .collect::<PoolResult<Vec<_>>>()?;
        Evaluation::List(items)
      }
      NodeKind::Matrix { rows, columns } => {
        let mut entries = Vec::with_capacity(children.len());
        for child in children {
          match self.evaluate(*child)?.as_number() {
            Some(z) => entries.push(z),
            None => return Ok(Evaluation::Undefined),
          }
        }
        Evaluation::Matrix {
          rows: *rows,
          columns: *columns,
          entries,
        }
      }
      NodeKind::Dependency => {
        for condition in children[1].children() {
          if self.evaluate(condition)?.is_undefined() {
            return Ok(Evaluation::Undefined);
          }
        }
        self.evaluate(children[0])?
      }
      NodeKind::Sum | NodeKind::Product => self.iterate(e)?,
      NodeKind::Integral => self.integrate(e)?,
      NodeKind::Derivative => self.differentiate(e)?,
      NodeKind::ListFunction(f) => list_function(*f, self.evaluate(children[0])?),
      kind => {
        let arguments = children
          .iter()
          .map(|c| self.evaluate(*c))
          .collect::<PoolResult<Vec<_>>>()?;
        self.apply(kind, e, arguments)
      }
    };
    if evaluation.has_nonreal() {
      self.encountered_complex = true;
    }
    Ok(evaluation)
  }

  fn symbol(&mut self, e: Expression, name: &str) -> PoolResult<Evaluation<T>> {
    if let Some((_, value)) = self.bindings.iter().rev().find(|(bound, _)| bound == name) {
      return Ok(Evaluation::Number(*value));
    }
    if let Some(value) = self.ctx.bindings.get(name) {
      return Ok(Evaluation::real(scalar(*value)));
    }
    match self.ctx.store {
      Some(store) if store.is_defined(name) && !store.is_function(name) => self.definition(e),
      _ => Ok(Evaluation::Undefined),
    }
  }

  fn function(&mut self, e: Expression, name: &str) -> PoolResult<Evaluation<T>> {
    match self.ctx.store {
      Some(store) if store.is_function(name) => self.definition(e),
      _ => Ok(Evaluation::Undefined),
    }
  }

  /// Evaluates what the store defines behind a symbol or function node.
  fn definition(&mut self, e: Expression) -> PoolResult<Evaluation<T>> {
    let Some(store) = self.ctx.store else {
      return Ok(Evaluation::Undefined);
    };
    let policy = crate::context::SymbolicComputation::ReplaceAllDefinedSymbols;
    match expression_without_symbols(e, store, policy)? {
      Resolution::Circular => {
        debug!("{} is circularly defined", e);
        Ok(Evaluation::Undefined)
      }
      Resolution::Resolved(resolved) => self.evaluate(resolved),
    }
  }

  /// Evaluates `body` with `name` bound to `value`, dropping the nodes the
  /// evaluation allocated.
  fn evaluate_bound(
    &mut self,
    body: Expression,
    name: &str,
    value: Complex<T>,
  ) -> PoolResult<Evaluation<T>> {
    let cursor = pool::cursor();
    self.bindings.push((name.to_string(), value));
    let evaluation = self.evaluate(body);
    self.bindings.pop();
    pool::tidy_from(cursor);
    evaluation
  }

  fn real_child(&mut self, e: Expression) -> PoolResult<Option<T>> {
    Ok(self.evaluate(e)?.as_real())
  }

  fn iterate(&mut self, e: Expression) -> PoolResult<Evaluation<T>> {
    let is_sum = e.matches_kind(|k| matches!(k, NodeKind::Sum));
    let [body, variable, lower, upper] = e.children()[..] else {
      return Ok(Evaluation::Undefined);
    };
    let Some(name) = variable.symbol_name() else {
      return Ok(Evaluation::Undefined);
    };
    let (Some(a), Some(b)) = (self.real_child(lower)?, self.real_child(upper)?) else {
      return Ok(Evaluation::Undefined);
    };
    let (Some(a), Some(b)) = (
      a.to_i64().filter(|_| a.fract().is_zero()),
      b.to_i64().filter(|_| b.fract().is_zero()),
    ) else {
      return Ok(Evaluation::Undefined);
    };
    let mut accumulated: Complex<T> = if is_sum {
      Complex::zero()
    } else {
      Complex::one()
    };
    if b.saturating_sub(a) >= MAX_ITERATIONS {
      return Ok(Evaluation::Undefined);
    }
    for k in a..=b {
      let value = Complex::new(scalar(k as f64), T::zero());
      let Some(term) = self.evaluate_bound(body, &name, value)?.as_number() else {
        return Ok(Evaluation::Undefined);
      };
      if is_sum {
        accumulated = accumulated + term;
      } else {
        accumulated = accumulated * term;
      }
    }
    Ok(Evaluation::number(accumulated))
  }

  fn integrate(&mut self, e: Expression) -> PoolResult<Evaluation<T>> {
    let [body, variable, lower, upper] = e.children()[..] else {
      return Ok(Evaluation::Undefined);
    };
    let Some(name) = variable.symbol_name() else {
      return Ok(Evaluation::Undefined);
    };
    let (Some(a), Some(b)) = (self.real_child(lower)?, self.real_child(upper)?) else {
      return Ok(Evaluation::Undefined);
    };
    let mut f = |x: T| -> PoolResult<Option<T>> {
      Ok(self.evaluate_bound(body, &name, Complex::new(x, T::zero()))?.as_real())
    };
    let value = calculus::integrate(&mut f, a, b)?;
    Ok(value.map_or(Evaluation::Undefined, Evaluation::real))
  }

  fn differentiate(&mut self, e: Expression) -> PoolResult<Evaluation<T>> {
    let [body, variable, point, order] = e.children()[..] else {
      return Ok(Evaluation::Undefined);
    };
    let Some(name) = variable.symbol_name() else {
      return Ok(Evaluation::Undefined);
    };
    let (Some(x), Some(order)) = (self.real_child(point)?, self.real_child(order)?) else {
      return Ok(Evaluation::Undefined);
    };
    let Some(order) = order.to_u32().filter(|_| order.fract().is_zero()) else {
      return Ok(Evaluation::Undefined);
    };
    let mut f = |x: T| -> PoolResult<Option<T>> {
      Ok(self.evaluate_bound(body, &name, Complex::new(x, T::zero()))?.as_real())
    };
    let value = calculus::differentiate(&mut f, x, order)?;
    Ok(value.map_or(Evaluation::Undefined, Evaluation::real))
  }

  /// Applies an operator node to its evaluated arguments. Lists distribute
  /// element-wise, matrices go through the matrix operations.
  fn apply(
    &mut self,
    kind: &NodeKind,
    e: Expression,
    arguments: Vec<Evaluation<T>>,
  ) -> Evaluation<T> {
    if arguments.iter().any(Evaluation::is_undefined) {
      return Evaluation::Undefined;
    }
    let list_length = arguments.iter().find_map(|a| match a {
      Evaluation::List(items) => Some(items.len()),
      _ => None,
    });
    if let Some(length) = list_length {
      let mut results = Vec::with_capacity(length);
      for index in 0..length {
        let mut row = Vec::with_capacity(arguments.len());
        for argument in &arguments {
          match argument {
            Evaluation::List(items) if items.len() == length => row.push(items[index].clone()),
            Evaluation::List(_) => return Evaluation::Undefined,
            other => row.push(other.clone()),
          }
        }
        results.push(self.apply(kind, e, row));
      }
      return Evaluation::List(results);
    }
    if arguments.iter().any(|a| matches!(a, Evaluation::Matrix { .. })) {
      return matrix_operation(kind, arguments);
    }
    if let NodeKind::Comparison(op) = kind {
      return compare(*op, &arguments);
    }
    let numbers: Option<Vec<Complex<T>>> = arguments.iter().map(Evaluation::as_number).collect();
    match numbers {
      Some(numbers) => self.operate(kind, e, &numbers),
      None => Evaluation::Undefined,
    }
  }

  fn operate(&mut self, kind: &NodeKind, e: Expression, z: &[Complex<T>]) -> Evaluation<T> {
    let result = match kind {
      NodeKind::Addition => z.iter().fold(Complex::zero(), |sum, term| sum + term),
      NodeKind::Multiplication => z.iter().fold(Complex::one(), |product, factor| product * factor),
      NodeKind::Subtraction => z[0] - z[1],
      NodeKind::Opposite => -z[0],
      NodeKind::Division => {
        if z[1].is_zero() {
          return Evaluation::Undefined;
        }
        z[0] / z[1]
      }
      NodeKind::Power => return self.power(z[0], z[1], e.child(1)),
      NodeKind::SquareRoot => return self.root(z[0], 2),
      NodeKind::NthRoot => {
        let index = z[1];
        return match index.re.to_u32() {
          Some(n) if index.im.is_zero() && index.re.fract().is_zero() && n > 0 => self.root(z[0], n),
          _ if index.is_zero() => Evaluation::Undefined,
          _ => self.power(z[0], index.inv(), e.child(1)),
        };
      }
      NodeKind::Factorial => return factorial(z[0]),
      NodeKind::IntegerFunction(f) => return integer_function(*f, z[0], z[1]),
      NodeKind::AbsoluteValue => Complex::new(z[0].norm(), T::zero()),
      NodeKind::Floor | NodeKind::Ceiling => {
        if !z[0].im.is_zero() {
          return Evaluation::Undefined;
        }
        let rounded = if *kind == NodeKind::Floor {
          z[0].re.floor()
        } else {
          z[0].re.ceil()
        };
        Complex::new(rounded, T::zero())
      }
      NodeKind::Logarithm => return logarithm(z[0], z[1]),
      NodeKind::NaturalLogarithm => return logarithm(z[0], Complex::new(T::E(), T::zero())),
      NodeKind::Trigonometry(f) => return self.trigonometry(*f, z[0]),
      NodeKind::Conjugate => z[0].conj(),
      NodeKind::RealPart => Complex::new(z[0].re, T::zero()),
      NodeKind::ImaginaryPart => Complex::new(z[0].im, T::zero()),
      _ => return Evaluation::Undefined,
    };
    Evaluation::number(result)
  }

  fn power(&mut self, base: Complex<T>, exponent: Complex<T>, exponent_node: Expression) -> Evaluation<T> {
    if base.is_zero() {
      return if exponent.im.is_zero() && exponent.re > T::zero() {
        Evaluation::real(T::zero())
      } else {
        Evaluation::Undefined
      };
    }
    let is_real = base.im.is_zero() && exponent.im.is_zero();
    if is_real {
      let (b, x) = (base.re, exponent.re);
      if b > T::zero() && x == scalar(0.5) {
        return Evaluation::real(b.sqrt());
      }
      if b > T::zero() || x.fract().is_zero() {
        return Evaluation::real(b.powf(x));
      }
      if self.ctx.complex_format == ComplexFormat::Real {
        if let Some(odd_numerator) = odd_denominator_parity(exponent_node) {
          let magnitude = (-b).powf(x);
          return Evaluation::real(if odd_numerator { -magnitude } else { magnitude });
        }
      }
    }
    if exponent.im.is_zero() && exponent.re.fract().is_zero() {
      if let Some(n) = exponent.re.to_i32() {
        return Evaluation::number(base.powi(n));
      }
    }
    Evaluation::number(base.powc(exponent))
  }

  fn root(&mut self, radicand: Complex<T>, index: u32) -> Evaluation<T> {
    let n = scalar::<T>(f64::from(index));
    let real_root = |x: T| match index {
      2 => x.sqrt(),
      3 => x.cbrt(),
      _ => x.powf(n.recip()),
    };
    if radicand.im.is_zero() {
      let x = radicand.re;
      if x >= T::zero() {
        return Evaluation::real(real_root(x));
      }
      if index % 2 == 1 && self.ctx.complex_format == ComplexFormat::Real {
        return Evaluation::real(-real_root(-x));
      }
    }
    if radicand.is_zero() {
      return Evaluation::real(T::zero());
    }
    if index == 2 {
      return Evaluation::number(radicand.sqrt());
    }
    Evaluation::number(radicand.powf(n.recip()))
  }

  fn trigonometry(&mut self, f: TrigonometricFunction, z: Complex<T>) -> Evaluation<T> {
    let half_turn = self.ctx.angle_unit.half_turn();
    let to_radians = match half_turn {
      None => T::one(),
      Some(h) => T::PI() / scalar(h as f64),
    };
    if !f.is_inverse() {
      let angle = z * to_radians;
      // Multiples of half a turn come out as rounding noise
      let noise = T::epsilon() * angle.norm().max(T::one());
      let snap = |x: T| if x.abs() < noise { T::zero() } else { x };
      if angle.im.is_zero() {
        let (sine, cosine) = (snap(angle.re.sin()), snap(angle.re.cos()));
        return match f {
          TrigonometricFunction::Sine => Evaluation::real(sine),
          TrigonometricFunction::Cosine => Evaluation::real(cosine),
          _ if cosine.is_zero() => Evaluation::Undefined,
          _ => Evaluation::real(sine / cosine),
        };
      }
      return match f {
        TrigonometricFunction::Sine => Evaluation::number(angle.sin()),
        TrigonometricFunction::Cosine => Evaluation::number(angle.cos()),
        _ if angle.cos().norm() < noise => Evaluation::Undefined,
        _ => Evaluation::number(angle.tan()),
      };
    }
    let in_domain = z.im.is_zero() && (f == TrigonometricFunction::ArcTangent || z.re.abs() <= T::one());
    let radians = if in_domain {
      let x = z.re;
      Complex::new(
        match f {
          TrigonometricFunction::ArcSine => x.asin(),
          TrigonometricFunction::ArcCosine => x.acos(),
          _ => x.atan(),
        },
        T::zero(),
      )
    } else {
      match f {
        TrigonometricFunction::ArcSine => z.asin(),
        TrigonometricFunction::ArcCosine => z.acos(),
        _ => z.atan(),
      }
    };
    Evaluation::number(radians / to_radians)
  }
}

/// For an exact exponent p/q with q odd, whether p is odd.
fn odd_denominator_parity(exponent: Expression) -> Option<bool> {
  let node = exponent.node();
  let value = match &node.kind {
    NodeKind::Rational(_) | NodeKind::Decimal { .. } => exponent.rational_value()?,
    NodeKind::Division => {
      let (p, q) = (node.children[0].integer_value()?, node.children[1].integer_value()?);
      if q.is_zero() {
        return None;
      }
      BigRational::new(p, q)
    }
    NodeKind::Opposite => return odd_denominator_parity(node.children[0]),
    _ => return None,
  };
  let is_odd = |n: &BigInt| !(n % 2u32).is_zero();
  is_odd(value.denom()).then(|| is_odd(value.numer()))
}

fn factorial<T: Scalar>(z: Complex<T>) -> Evaluation<T> {
  let n = z.re;
  if !z.im.is_zero() || !n.fract().is_zero() || n < T::zero() {
    return Evaluation::Undefined;
  }
  match n.to_i64() {
    Some(n) if n <= MAX_FACTORIAL => {
      let value = (2..=n).fold(T::one(), |product, k| product * scalar(k as f64));
      Evaluation::real(value)
    }
    _ => Evaluation::Undefined,
  }
}

fn list_function<T: Scalar>(f: ListFunction, list: Evaluation<T>) -> Evaluation<T> {
  let Evaluation::List(items) = list else {
    return Evaluation::Undefined;
  };
  let Some(values) = items.iter().map(Evaluation::as_number).collect::<Option<Vec<_>>>() else {
    return Evaluation::Undefined;
  };
  match f {
    ListFunction::Sum => Evaluation::number(values.iter().fold(Complex::zero(), |sum, z| sum + z)),
    ListFunction::Product => {
      Evaluation::number(values.iter().fold(Complex::one(), |product, z| product * z))
    }
    ListFunction::Minimum | ListFunction::Maximum | ListFunction::Sort => {
      // Only real values are ordered
      let Some(mut reals) = values
        .iter()
        .map(|z| z.im.is_zero().then_some(z.re))
        .collect::<Option<Vec<T>>>()
      else {
        return Evaluation::Undefined;
      };
      reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
      let chosen = match f {
        ListFunction::Minimum => reals.first(),
        ListFunction::Maximum => reals.last(),
        _ => return Evaluation::List(reals.into_iter().map(Evaluation::real).collect()),
      };
      chosen.map_or(Evaluation::Undefined, |x| Evaluation::real(*x))
    }
  }
}

fn integer_function<T: Scalar>(f: IntegerFunction, a: Complex<T>, b: Complex<T>) -> Evaluation<T> {
  if !a.im.is_zero() || !b.im.is_zero() {
    return Evaluation::Undefined;
  }
  let (n, k) = (a.re, b.re);
  let is_integer = |x: T| x.fract().is_zero();
  let is_natural = |x: T| is_integer(x) && x >= T::zero();
  match f {
    IntegerFunction::Binomial | IntegerFunction::Permute => {
      let valid = is_natural(k) && (f == IntegerFunction::Binomial || is_natural(n));
      if !valid || k > scalar(MAX_ITERATIONS as f64) {
        return Evaluation::Undefined;
      }
      if f == IntegerFunction::Permute && k > n {
        return Evaluation::real(T::zero());
      }
      let mut coefficient = T::one();
      let mut i = T::zero();
      while i < k && coefficient.is_finite() {
        coefficient = coefficient * (n - i);
        if f == IntegerFunction::Binomial {
          coefficient = coefficient / (i + T::one());
        }
        i = i + T::one();
      }
      Evaluation::real(if is_integer(n) { coefficient.round() } else { coefficient })
    }
    IntegerFunction::Quotient | IntegerFunction::Remainder => {
      if !is_integer(n) || !is_integer(k) || k.is_zero() {
        return Evaluation::Undefined;
      }
      let mut remainder = n % k;
      if remainder < T::zero() {
        remainder = remainder + k.abs();
      }
      if f == IntegerFunction::Remainder {
        Evaluation::real(remainder)
      } else {
        Evaluation::real(((n - remainder) / k).round())
      }
    }
  }
}

fn logarithm<T: Scalar>(argument: Complex<T>, base: Complex<T>) -> Evaluation<T> {
  if argument.is_zero() || base.is_zero() {
    return Evaluation::Undefined;
  }
  let (a, b) = (argument, base);
  if a.im.is_zero() && b.im.is_zero() && a.re > T::zero() && b.re > T::zero() {
    if b.re.is_one() {
      return Evaluation::Undefined;
    }
    return Evaluation::real(a.re.ln() / b.re.ln());
  }
  let denominator = b.ln();
  if denominator.is_zero() {
    return Evaluation::Undefined;
  }
  Evaluation::number(a.ln() / denominator)
}

fn compare<T: Scalar>(op: ComparisonOperator, arguments: &[Evaluation<T>]) -> Evaluation<T> {
  let [left, right] = arguments else {
    return Evaluation::Undefined;
  };
  if let (Some(a), Some(b)) = (left.as_real(), right.as_real()) {
    return match a.partial_cmp(&b) {
      Some(ordering) => Evaluation::Boolean(op.holds(ordering)),
      None => Evaluation::Undefined,
    };
  }
  match op {
    ComparisonOperator::Equal => Evaluation::Boolean(left == right),
    ComparisonOperator::NotEqual => Evaluation::Boolean(left != right),
    _ => Evaluation::Undefined,
  }
}

struct Grid<T> {
  rows: usize,
  columns: usize,
  entries: Vec<Complex<T>>,
}

impl<T: Scalar> Grid<T> {
  fn of(evaluation: &Evaluation<T>) -> Option<Grid<T>> {
    match evaluation {
      Evaluation::Matrix {
        rows,
        columns,
        entries,
      } => Some(Grid {
        rows: *rows,
        columns: *columns,
        entries: entries.clone(),
      }),
      _ => None,
    }
  }

  fn identity(size: usize) -> Grid<T> {
    let entries = (0..size * size)
      .map(|k| if k / size == k % size { Complex::one() } else { Complex::zero() })
      .collect();
    Grid {
      rows: size,
      columns: size,
      entries,
    }
  }

  fn map(self, f: impl Fn(Complex<T>) -> Complex<T>) -> Grid<T> {
    Grid {
      entries: self.entries.into_iter().map(f).collect(),
      ..self
    }
  }

  fn add(self, other: &Grid<T>) -> Option<Grid<T>> {
    if self.rows != other.rows || self.columns != other.columns {
      return None;
    }
    let entries = self.entries.iter().zip(&other.entries).map(|(a, b)| a + b).collect();
    Some(Grid { entries, ..self })
  }

  fn product(&self, other: &Grid<T>) -> Option<Grid<T>> {
    if self.columns != other.rows {
      return None;
    }
    let mut entries = vec![Complex::zero(); self.rows * other.columns];
    for i in 0..self.rows {
      for j in 0..other.columns {
        entries[i * other.columns + j] = (0..self.columns)
          .map(|k| self.entries[i * self.columns + k] * other.entries[k * other.columns + j])
          .fold(Complex::zero(), |sum, term| sum + term);
      }
    }
    Some(Grid {
      rows: self.rows,
      columns: other.columns,
      entries,
    })
  }

  /// Square-and-multiply power of a square grid.
  fn power(self, mut n: u32) -> Option<Grid<T>> {
    let mut result = Grid::identity(self.rows);
    let mut square = self;
    while n > 0 {
      if n & 1 == 1 {
        result = result.product(&square)?;
      }
      n >>= 1;
      if n > 0 {
        square = square.product(&square)?;
      }
    }
    Some(result)
  }

  fn into_evaluation(self) -> Evaluation<T> {
    if self.entries.iter().any(|z| !z.re.is_finite() || !z.im.is_finite()) {
      return Evaluation::Undefined;
    }
    Evaluation::Matrix {
      rows: self.rows,
      columns: self.columns,
      entries: self.entries,
    }
  }
}

fn matrix_operation<T: Scalar>(kind: &NodeKind, arguments: Vec<Evaluation<T>>) -> Evaluation<T> {
  let result = match kind {
    NodeKind::Addition => {
      let mut grids = arguments.iter().map(Grid::of);
      let Some(Some(first)) = grids.next() else {
        return Evaluation::Undefined;
      };
      grids.try_fold(first, |sum, grid| sum.add(&grid?))
    }
    NodeKind::Subtraction => match (Grid::of(&arguments[0]), Grid::of(&arguments[1])) {
      (Some(a), Some(b)) => a.add(&b.map(|z| -z)),
      _ => None,
    },
    NodeKind::Opposite => Grid::of(&arguments[0]).map(|a| a.map(|z| -z)),
    NodeKind::Multiplication => {
      let mut scale = Complex::<T>::one();
      let mut grid: Option<Grid<T>> = None;
      for argument in &arguments {
        match (argument, Grid::of(argument)) {
          (Evaluation::Number(z), _) => scale = scale * z,
          (_, Some(next)) => {
            grid = match grid {
              None => Some(next),
              Some(current) => match current.product(&next) {
                Some(product) => Some(product),
                None => return Evaluation::Undefined,
              },
            }
          }
          _ => return Evaluation::Undefined,
        }
      }
      grid.map(|g| g.map(|z| z * scale))
    }
    NodeKind::Division => match (Grid::of(&arguments[0]), arguments[1].as_number()) {
      (Some(a), Some(z)) if !z.is_zero() => Some(a.map(|entry| entry / z)),
      _ => None,
    },
    NodeKind::Power => {
      let exponent = arguments[1].as_real().filter(|x| x.fract().is_zero() && *x >= T::zero());
      match (Grid::of(&arguments[0]), exponent.and_then(|x| x.to_u32())) {
        (Some(a), Some(n)) if a.rows == a.columns => a.power(n),
        _ => None,
      }
    }
    _ => None,
  };
  result.map_or(Evaluation::Undefined, Grid::into_evaluation)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::context::AngleUnit;
  use crate::symbols::SymbolStore;

  fn value(text: &str, ctx: &ApproximationContext) -> Evaluation<f64> {
    pool::clear_pool();
    approximate::<f64>(crate::parse(text).unwrap(), ctx)
  }

  fn real(text: &str) -> f64 {
    value(text, &ApproximationContext::new()).to_scalar()
  }

  #[test]
  fn arithmetic() {
    assert_eq!(real("1+2*3"), 7.0);
    assert_eq!(real("2^10"), 1024.0);
    assert_eq!(real("5!"), 120.0);
    assert_eq!(real("abs(-2.5)"), 2.5);
    assert!(real("1/0").is_nan());
  }

  #[test]
  fn complex_results_depend_on_the_format() {
    assert_eq!(value("sqrt(-1)", &ApproximationContext::new()), Evaluation::Undefined);
    let cartesian = ApproximationContext::new().with_complex_format(ComplexFormat::Cartesian);
    assert_eq!(
      value("sqrt(-1)", &cartesian),
      Evaluation::Number(Complex::new(0.0, 1.0))
    );
    assert_eq!(value("sqrt(-4)", &cartesian).text(ComplexFormat::Cartesian), "2*i");
    assert_eq!(value("i^2", &cartesian).text(ComplexFormat::Cartesian), "-1");
    assert_eq!(value("(-1)^(1/2)", &cartesian).text(ComplexFormat::Polar), "e^(1.5707963267948966*i)");
  }

  #[test]
  fn odd_roots_of_negatives_stay_real() {
    assert_eq!(real("(-8)^(1/3)"), -2.0);
    assert_eq!(real("root(-27,3)"), -3.0);
    assert!(real("(-8)^(1/2)").is_nan());
  }

  #[test]
  fn angles_follow_the_unit() {
    assert_eq!(real("sin(pi)"), 0.0);
    assert!(real("tan(pi/2)").is_nan());
    let degrees = ApproximationContext::new().with_angle_unit(AngleUnit::Degree);
    assert_eq!(value("cos(180)", &degrees).to_scalar(), -1.0);
    assert!((value("atan(1)", &degrees).to_scalar() - 45.0).abs() < 1e-12);
  }

  #[test]
  fn parametered_expressions() {
    assert_eq!(real("sum(k^2,k,1,3)"), 14.0);
    assert_eq!(real("product(k,k,1,5)"), 120.0);
    assert!((real("int(x^2,x,0,3)") - 9.0).abs() < 1e-12);
    assert!((real("diff(x^3,x,2)") - 12.0).abs() < 1e-8);
  }

  #[test]
  fn symbols_resolve_through_bindings_then_the_store() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("a", crate::parse("2*b").unwrap());
    store.define_symbol("b", crate::parse("3").unwrap());
    let ctx = ApproximationContext::new().with_store(&store);
    assert_eq!(value("a+1", &ctx).to_scalar(), 7.0);
    let shadowed = ctx.clone().with_binding("a", 10.0);
    assert_eq!(value("a+1", &shadowed).to_scalar(), 11.0);
    assert!(value("z", &ctx).to_scalar().is_nan());
  }

  #[test]
  fn lists_and_matrices() {
    let ctx = ApproximationContext::new();
    assert_eq!(value("{1,2}*3", &ctx).text(ComplexFormat::Real), "{3,6}");
    assert_eq!(
      value("[[1,2][3,4]]*[[1,0][0,1]]", &ctx).text(ComplexFormat::Real),
      "[[1,2][3,4]]"
    );
    assert_eq!(value("1<2", &ctx), Evaluation::Boolean(true));
  }

  #[test]
  fn single_precision() {
    pool::clear_pool();
    let e = crate::parse("1/4+1/4").unwrap();
    assert_eq!(approximate_to_scalar::<f32>(e, &ApproximationContext::new()), 0.5f32);
  }

  #[test]
  fn approximation_leaves_the_pool_as_it_found_it() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("a", crate::parse("2").unwrap());
    let e = crate::parse("sum(a*k,k,1,10)").unwrap();
    let before = pool::node_count();
    let ctx = ApproximationContext::new().with_store(&store);
    assert_eq!(approximate_to_scalar::<f64>(e, &ctx), 110.0);
    assert_eq!(pool::node_count(), before);
  }
}
