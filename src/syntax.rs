//! Turning calculator text into expression trees.

use num_bigint::BigInt;
use pest::iterators::{Pair, Pairs};
use pest::Parser;

use crate::expression::{
  ComparisonOperator, Constant, Expression, IntegerFunction, ListFunction,
  NodeKind, TrigonometricFunction,
};
use crate::{CalculatorError, CalculatorParser, Rule};

type ParseResult<T = Expression> = Result<T, CalculatorError>;

/// One line of calculator input.
#[derive(Debug, Clone)]
pub enum Statement {
  Expression(Expression),
  /// `value -> name`
  Assignment { name: String, value: Expression },
  /// `name := body`
  Definition { name: String, body: Expression },
  /// `name(parameter) = body`
  FunctionDefinition {
    name: String,
    parameter: String,
    body: Expression,
  },
}

fn malformed(rule: Rule) -> CalculatorError {
  CalculatorError::InvalidSyntax(format!("malformed {:?}", rule))
}

fn next<'i>(pairs: &mut Pairs<'i, Rule>, rule: Rule) -> ParseResult<Pair<'i, Rule>> {
  pairs.next().ok_or_else(|| malformed(rule))
}

fn children<const N: usize>(pair: Pair<'_, Rule>) -> ParseResult<[Pair<'_, Rule>; N]> {
  let rule = pair.as_rule();
  let inner: Vec<_> = pair.into_inner().collect();
  inner.try_into().map_err(|_| malformed(rule))
}

pub fn parse_statement(text: &str) -> ParseResult<Statement> {
  if text.trim().is_empty() {
    return Err(CalculatorError::EmptyInput);
  }
  let mut pairs = CalculatorParser::parse(Rule::Program, text).map_err(Box::new)?;
  let program = next(&mut pairs, Rule::Program)?;
  let statement = next(&mut program.into_inner(), Rule::Program)?;
  match statement.as_rule() {
    Rule::FunctionDefinition => {
      let [name, parameter, body] = children(statement)?;
      Ok(Statement::FunctionDefinition {
        name: name.as_str().to_string(),
        parameter: parameter.as_str().to_string(),
        body: expression(body)?,
      })
    }
    Rule::Definition => {
      let [name, body] = children(statement)?;
      Ok(Statement::Definition {
        name: name.as_str().to_string(),
        body: expression(body)?,
      })
    }
    Rule::Assignment => {
      let [value, name] = children(statement)?;
      Ok(Statement::Assignment {
        name: name.as_str().to_string(),
        value: expression(value)?,
      })
    }
    Rule::Expression => Ok(Statement::Expression(expression(statement)?)),
    rule => Err(malformed(rule)),
  }
}

/// Parses text that must be a plain expression, not a definition.
pub fn parse_expression(text: &str) -> ParseResult {
  match parse_statement(text)? {
    Statement::Expression(e) => Ok(e),
    _ => Err(CalculatorError::InvalidSyntax(
      "expected an expression, found a definition".to_string(),
    )),
  }
}

/// Builds `items` into an n-ary node, or returns the single item.
fn gather(mut items: Vec<Expression>, build: fn(Vec<Expression>) -> crate::pool::PoolResult) -> ParseResult {
  if items.len() == 1 {
    return Ok(items.remove(0));
  }
  Ok(build(items)?)
}

fn expression(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let left = sum(next(&mut inner, Rule::Expression)?)?;
  let Some(operator) = inner.next() else {
    return Ok(left);
  };
  let right = sum(next(&mut inner, Rule::Expression)?)?;
  let operator = match operator.as_str() {
    "=" => ComparisonOperator::Equal,
    "!=" => ComparisonOperator::NotEqual,
    "<" => ComparisonOperator::Less,
    "<=" => ComparisonOperator::LessOrEqual,
    ">" => ComparisonOperator::Greater,
    _ => ComparisonOperator::GreaterOrEqual,
  };
  Ok(Expression::comparison(operator, left, right)?)
}

fn sum(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let mut terms = vec![product(next(&mut inner, Rule::Sum)?)?];
  while let Some(operator) = inner.next() {
    let right = product(next(&mut inner, Rule::Sum)?)?;
    if operator.as_str() == "+" {
      terms.push(right);
    } else {
      let left = gather(terms, Expression::addition)?;
      terms = vec![Expression::subtraction(left, right)?];
    }
  }
  gather(terms, Expression::addition)
}

fn product(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let mut factors = vec![unary(next(&mut inner, Rule::Product)?)?];
  while let Some(operator) = inner.next() {
    let right = unary(next(&mut inner, Rule::Product)?)?;
    if operator.as_str() == "*" {
      factors.push(right);
    } else {
      let left = gather(factors, Expression::multiplication)?;
      factors = vec![Expression::division(left, right)?];
    }
  }
  gather(factors, Expression::multiplication)
}

fn unary(pair: Pair<'_, Rule>) -> ParseResult {
  let mut negations = 0;
  let mut operand = None;
  for part in pair.into_inner() {
    match part.as_rule() {
      Rule::Negation => negations += 1,
      _ => operand = Some(power(part)?),
    }
  }
  let mut e = operand.ok_or_else(|| malformed(Rule::Unary))?;
  for _ in 0..negations {
    e = Expression::opposite(e)?;
  }
  Ok(e)
}

fn power(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let base = postfix(next(&mut inner, Rule::Power)?)?;
  match inner.next() {
    Some(exponent) => Ok(Expression::power(base, unary(exponent)?)?),
    None => Ok(base),
  }
}

fn postfix(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let mut e = primary(next(&mut inner, Rule::Postfix)?)?;
  for _ in inner {
    e = Expression::factorial(e)?;
  }
  Ok(e)
}

fn primary(pair: Pair<'_, Rule>) -> ParseResult {
  match pair.as_rule() {
    Rule::Number => number(pair.as_str()),
    Rule::Call => call(pair),
    Rule::Keyword => Ok(match pair.as_str() {
      "pi" => Expression::constant(Constant::Pi)?,
      "e" => Expression::constant(Constant::E)?,
      "i" => Expression::constant(Constant::I)?,
      "true" => Expression::boolean(true)?,
      "false" => Expression::boolean(false)?,
      _ => Expression::undefined()?,
    }),
    Rule::Identifier => Ok(Expression::symbol(pair.as_str())?),
    Rule::Expression => expression(pair),
    Rule::List => {
      let items = pair.into_inner().map(expression).collect::<ParseResult<Vec<_>>>()?;
      Ok(Expression::list(items)?)
    }
    Rule::Matrix => matrix(pair),
    rule => Err(malformed(rule)),
  }
}

fn matrix(pair: Pair<'_, Rule>) -> ParseResult {
  let mut rows = Vec::new();
  for row in pair.into_inner() {
    rows.push(row.into_inner().map(expression).collect::<ParseResult<Vec<_>>>()?);
  }
  let columns = rows.first().map_or(0, Vec::len);
  if rows.iter().any(|row| row.len() != columns) {
    return Err(CalculatorError::InvalidSyntax(
      "matrix rows must have the same length".to_string(),
    ));
  }
  let height = rows.len();
  Ok(Expression::matrix(height, columns, rows.concat())?)
}

/// Integers become exact rationals; numbers with a point or an exponent
/// keep their decimal form.
fn number(text: &str) -> ParseResult {
  let invalid = || CalculatorError::InvalidSyntax(format!("invalid number {}", text));
  let (significand, exponent) = match text.split_once('E') {
    Some((significand, exponent)) => (significand, exponent.parse::<i32>().map_err(|_| invalid())?),
    None => (text, 0),
  };
  let Some((whole, fraction)) = significand.split_once('.') else {
    let mantissa: BigInt = significand.parse().map_err(|_| invalid())?;
    return if exponent == 0 && !text.contains('E') {
      Ok(Expression::big_integer(mantissa)?)
    } else {
      Ok(Expression::decimal(mantissa, exponent)?)
    };
  };
  let digits = format!("{}{}", whole, fraction);
  let mantissa: BigInt = digits.parse().map_err(|_| invalid())?;
  let scale = i32::try_from(fraction.len()).map_err(|_| invalid())?;
  let exponent = exponent.checked_sub(scale).ok_or_else(invalid)?;
  Ok(Expression::decimal(mantissa, exponent)?)
}

fn expect_arguments(name: &str, arguments: &[Expression], counts: &[usize]) -> ParseResult<()> {
  if counts.contains(&arguments.len()) {
    return Ok(());
  }
  let expected: Vec<String> = counts.iter().map(usize::to_string).collect();
  Err(CalculatorError::InvalidSyntax(format!(
    "{} expects {} argument(s), found {}",
    name,
    expected.join(" or "),
    arguments.len()
  )))
}

fn call(pair: Pair<'_, Rule>) -> ParseResult {
  let mut inner = pair.into_inner();
  let name = next(&mut inner, Rule::Call)?.as_str().to_string();
  let arguments = inner.map(expression).collect::<ParseResult<Vec<_>>>()?;
  let expect = |counts: &[usize]| expect_arguments(&name, &arguments, counts);
  let trigonometric = match name.as_str() {
    "sin" => Some(TrigonometricFunction::Sine),
    "cos" => Some(TrigonometricFunction::Cosine),
    "tan" => Some(TrigonometricFunction::Tangent),
    "asin" | "arcsin" => Some(TrigonometricFunction::ArcSine),
    "acos" | "arccos" => Some(TrigonometricFunction::ArcCosine),
    "atan" | "arctan" => Some(TrigonometricFunction::ArcTangent),
    _ => None,
  };
  if let Some(f) = trigonometric {
    expect(&[1])?;
    return Ok(Expression::trigonometry(f, arguments[0])?);
  }
  if let Some(rewritten) = rewritten_call(&name, &arguments)? {
    return Ok(rewritten);
  }
  let list_function = match name.as_str() {
    "min" => Some(ListFunction::Minimum),
    "max" => Some(ListFunction::Maximum),
    "sort" => Some(ListFunction::Sort),
    "sum" | "product" if arguments.len() == 1 => Some(if name == "sum" {
      ListFunction::Sum
    } else {
      ListFunction::Product
    }),
    _ => None,
  };
  if let Some(f) = list_function {
    expect(&[1])?;
    return Ok(Expression::new(NodeKind::ListFunction(f), vec![arguments[0]])?);
  }
  let integer_function = match name.as_str() {
    "binomial" => Some(IntegerFunction::Binomial),
    "permute" => Some(IntegerFunction::Permute),
    "quo" => Some(IntegerFunction::Quotient),
    "rem" => Some(IntegerFunction::Remainder),
    _ => None,
  };
  if let Some(f) = integer_function {
    expect(&[2])?;
    let operands = vec![arguments[0], arguments[1]];
    return Ok(Expression::new(NodeKind::IntegerFunction(f), operands)?);
  }
  let e = match name.as_str() {
    "sqrt" => {
      expect(&[1])?;
      Expression::square_root(arguments[0])?
    }
    "root" => {
      expect(&[2])?;
      Expression::nth_root(arguments[0], arguments[1])?
    }
    "abs" => {
      expect(&[1])?;
      Expression::absolute_value(arguments[0])?
    }
    "floor" | "ceil" => {
      expect(&[1])?;
      let kind = if name == "floor" {
        NodeKind::Floor
      } else {
        NodeKind::Ceiling
      };
      Expression::new(kind, vec![arguments[0]])?
    }
    "conj" | "re" | "im" => {
      expect(&[1])?;
      let kind = match name.as_str() {
        "conj" => NodeKind::Conjugate,
        "re" => NodeKind::RealPart,
        _ => NodeKind::ImaginaryPart,
      };
      Expression::new(kind, vec![arguments[0]])?
    }
    "log" => {
      expect(&[1, 2])?;
      let base = match arguments.get(1) {
        Some(base) => *base,
        None => Expression::integer(10)?,
      };
      Expression::logarithm(arguments[0], base)?
    }
    "ln" => {
      expect(&[1])?;
      Expression::natural_logarithm(arguments[0])?
    }
    "exp" => {
      expect(&[1])?;
      Expression::power(Expression::constant(Constant::E)?, arguments[0])?
    }
    "random" => {
      expect(&[0])?;
      Expression::random()?
    }
    "sum" | "product" | "int" | "diff" => parametered(&name, &arguments)?,
    _ => {
      expect(&[1])?;
      Expression::function(&name, arguments[0])?
    }
  };
  Ok(e)
}

/// Functions written in terms of the ones the reducer knows: reciprocal
/// and inverse reciprocal trigonometry, hyperbolic functions and their
/// inverses.
fn rewritten_call(name: &str, arguments: &[Expression]) -> ParseResult<Option<Expression>> {
  use TrigonometricFunction::*;
  let names = [
    "sec", "csc", "cot", "arcsec", "asec", "arccsc", "acsc", "sinh", "cosh",
    "tanh", "asinh", "arcsinh", "acosh", "arccosh", "atanh", "arctanh",
  ];
  if !names.contains(&name) {
    return Ok(None);
  }
  expect_arguments(name, arguments, &[1])?;
  let x = arguments[0];
  let one = Expression::integer(1)?;
  let inverse = |f| Expression::trigonometry(f, Expression::division(one, x)?);
  // e^x and e^-x
  let exponentials = || -> ParseResult<(Expression, Expression)> {
    let e = Expression::constant(Constant::E)?;
    Ok((
      Expression::power(e, x)?,
      Expression::power(e, Expression::opposite(x)?)?,
    ))
  };
  let e = match name {
    "sec" => Expression::division(one, Expression::trigonometry(Cosine, x)?)?,
    "csc" => Expression::division(one, Expression::trigonometry(Sine, x)?)?,
    "cot" => Expression::division(
      Expression::trigonometry(Cosine, x)?,
      Expression::trigonometry(Sine, x)?,
    )?,
    "arcsec" | "asec" => inverse(ArcCosine)?,
    "arccsc" | "acsc" => inverse(ArcSine)?,
    "sinh" | "cosh" => {
      let (rising, falling) = exponentials()?;
      let numerator = if name == "sinh" {
        Expression::subtraction(rising, falling)?
      } else {
        Expression::addition(vec![rising, falling])?
      };
      Expression::division(numerator, Expression::integer(2)?)?
    }
    "tanh" => {
      let (rising, falling) = exponentials()?;
      Expression::division(
        Expression::subtraction(rising, falling)?,
        Expression::addition(vec![rising, falling])?,
      )?
    }
    "atanh" | "arctanh" => {
      let ratio = Expression::division(
        Expression::addition(vec![one, x])?,
        Expression::subtraction(one, x)?,
      )?;
      Expression::division(
        Expression::natural_logarithm(ratio)?,
        Expression::integer(2)?,
      )?
    }
    // asinh and acosh: ln(x+sqrt(x^2±1))
    _ => {
      let square = Expression::power(x, Expression::integer(2)?)?;
      let radicand = if name.ends_with("sinh") {
        Expression::addition(vec![square, one])?
      } else {
        Expression::subtraction(square, one)?
      };
      let root = Expression::square_root(radicand)?;
      Expression::natural_logarithm(Expression::addition(vec![x, root])?)?
    }
  };
  Ok(Some(e))
}

/// `sum(body, k, a, b)`, `product(...)`, `int(body, x, a, b)` and
/// `diff(body, x, point[, order])`.
fn parametered(name: &str, arguments: &[Expression]) -> ParseResult {
  let counts: &[usize] = if name == "diff" { &[3, 4] } else { &[4] };
  expect_arguments(name, arguments, counts)?;
  if !arguments[1].matches_kind(|k| matches!(k, NodeKind::Symbol(_))) {
    return Err(CalculatorError::InvalidSyntax(format!(
      "the second argument of {} must be a variable",
      name
    )));
  }
  let [body, variable, third, ..] = arguments[..] else {
    return Err(malformed(Rule::Call));
  };
  Ok(match name {
    "sum" => Expression::sum(body, variable, third, arguments[3])?,
    "product" => Expression::product(body, variable, third, arguments[3])?,
    "int" => Expression::integral(body, variable, third, arguments[3])?,
    _ => {
      let order = match arguments.get(3) {
        Some(order) => *order,
        None => Expression::integer(1)?,
      };
      Expression::derivative(body, variable, third, order)?
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::pool;

  fn round_trip(text: &str) -> String {
    pool::clear_pool();
    parse_expression(text).unwrap().to_string()
  }

  #[test]
  fn operators_and_precedence() {
    assert_eq!(round_trip("1/2"), "1/2");
    assert_eq!(round_trip("-x^2"), "-x^2");
    assert_eq!(round_trip("2^3^2"), "2^(3^2)");
    assert_eq!(round_trip("(1+2)*3"), "(1+2)*3");
    assert_eq!(round_trip("a-b-c"), "a-b-c");
    assert_eq!(round_trip("3!"), "3!");
    assert_eq!(round_trip("5!=3"), "5!=3");
  }

  #[test]
  fn numbers_and_keywords() {
    assert_eq!(round_trip("1.5"), "1.5");
    assert_eq!(round_trip("1.5E3"), "1500");
    assert_eq!(round_trip("pi"), "pi");
    assert_eq!(round_trip("exp(x)"), "e^x");
    assert_eq!(round_trip("e2"), "e2");
    assert_eq!(round_trip("1E999999999"), "1E999999999");
    assert_eq!(round_trip("2.5E-40"), "25E-41");
  }

  #[test]
  fn calls_and_containers() {
    assert_eq!(round_trip("log(x)"), "log(x,10)");
    assert_eq!(round_trip("arcsin(x)"), "asin(x)");
    assert_eq!(round_trip("diff(x^2,x,3)"), "diff(x^2,x,3)");
    assert_eq!(round_trip("{1,2}"), "{1,2}");
    assert_eq!(round_trip("[[1,2][3,4]]"), "[[1,2][3,4]]");
    assert_eq!(round_trip("f(x+1)"), "f(x+1)");
  }

  #[test]
  fn derived_functions_are_rewritten() {
    assert_eq!(round_trip("sec(x)"), "1/cos(x)");
    assert_eq!(round_trip("cot(x)"), "cos(x)/sin(x)");
    assert_eq!(round_trip("arcsec(x)"), "acos(1/x)");
    assert_eq!(round_trip("sinh(x)"), "(e^x-e^(-x))/2");
    assert_eq!(round_trip("acosh(x)"), "ln(x+sqrt(x^2-1))");
  }

  #[test]
  fn list_and_integer_functions() {
    assert_eq!(round_trip("min({3,1})"), "min({3,1})");
    assert_eq!(round_trip("sum({1,2})"), "sum({1,2})");
    assert_eq!(round_trip("sum(k,k,1,3)"), "sum(k,k,1,3)");
    assert_eq!(round_trip("binomial(5,2)"), "binomial(5,2)");
    assert_eq!(round_trip("rem(7,3)"), "rem(7,3)");
    pool::clear_pool();
    assert!(parse_expression("quo(7)").is_err());
    assert!(parse_expression("sinh(1,2)").is_err());
  }

  #[test]
  fn statements() {
    pool::clear_pool();
    match parse_statement("f(x)=x^2").unwrap() {
      Statement::FunctionDefinition { name, parameter, body } => {
        assert_eq!(name, "f");
        assert_eq!(parameter, "x");
        assert_eq!(body.to_string(), "x^2");
      }
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
      parse_statement("a:=a+1").unwrap(),
      Statement::Definition { .. }
    ));
    assert!(matches!(
      parse_statement("3->b").unwrap(),
      Statement::Assignment { .. }
    ));
  }

  #[test]
  fn invalid_input() {
    assert!(matches!(parse_statement(""), Err(CalculatorError::EmptyInput)));
    assert!(matches!(parse_statement("1+"), Err(CalculatorError::ParseError(_))));
    assert!(matches!(
      parse_statement("sqrt(1,2)"),
      Err(CalculatorError::InvalidSyntax(_))
    ));
    assert!(matches!(
      parse_statement("[[1,2][3]]"),
      Err(CalculatorError::InvalidSyntax(_))
    ));
    assert!(matches!(
      parse_statement("1.5E-2147483648"),
      Err(CalculatorError::InvalidSyntax(_))
    ));
  }
}
