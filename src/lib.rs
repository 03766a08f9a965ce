use log::debug;
use pest_derive::Parser;
use thiserror::Error;

pub mod approximation;
pub mod beautify;
pub mod checkpoint;
pub mod context;
pub mod expression;
pub mod matcher;
pub mod pool;
pub mod reduction;
pub mod symbols;
pub mod syntax;

pub use approximation::{approximate, approximate_to_scalar, Evaluation};
pub use checkpoint::{Checkpoint, Interruption};
pub use context::{
  AngleUnit, ApproximationContext, ComplexFormat, Preferences,
  ReductionContext, ReductionTarget, SymbolicComputation, UnitFormat,
};
pub use expression::{DecodeError, Expression};
pub use symbols::SymbolStore;

use syntax::Statement;

#[derive(Parser)]
#[grammar = "calculator.pest"]
pub struct CalculatorParser;

#[derive(Error, Debug)]
pub enum CalculatorError {
  #[error("Parse error: {0}")]
  ParseError(#[from] Box<pest::error::Error<Rule>>),
  #[error("Empty input")]
  EmptyInput,
  #[error("Invalid syntax: {0}")]
  InvalidSyntax(String),
  #[error("Interrupted: {0}")]
  Interrupted(#[from] Interruption),
  #[error("Decode error: {0}")]
  Decode(#[from] DecodeError),
  #[error("Circular definition of {0}")]
  CircularDefinition(String),
}

/// Exact and approximate results of one input line, as calculator text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Calculation {
  pub exact: String,
  pub approximate: String,
}

/// Parses an expression into the pool.
pub fn parse(text: &str) -> Result<Expression, CalculatorError> {
  syntax::parse_expression(text)
}

/// The reduced form of `e`, computed on a copy under a checkpoint. On
/// failure this degrades as
/// [`reduction::clone_and_deep_reduce_with_system_checkpoint`] describes.
pub fn reduce(e: Expression, ctx: &ReductionContext) -> Expression {
  reduction::clone_and_deep_reduce_with_system_checkpoint(e, ctx, false).0
}

/// Reduces `e` and returns its beautified form together with a copy in
/// which every symbol-free subtree is replaced by its float value.
pub fn simplify(e: Expression, ctx: &ReductionContext) -> (Expression, Expression) {
  let reduced = reduce(e, ctx);
  let simplified = Checkpoint::new()
    .run(|| beautify::beautify(reduced))
    .unwrap_or(reduced);
  let approximation = Checkpoint::new()
    .run(|| {
      let approximated =
        approximation::deep_approximate_keeping_symbols(reduced, ctx)?;
      beautify::beautify(approximated)
    })
    .unwrap_or(reduced);
  (simplified, approximation)
}

/// Drops every node of this thread's pool. Definitions in a
/// [`SymbolStore`] are kept in serialized form and survive.
pub fn clear_state() {
  pool::clear_pool();
}

/// Evaluates one line of calculator input.
///
/// `value -> name` stores the reduced value, `name := body` and
/// `name(x) = body` store the body as written. Nodes allocated for the
/// line are released before returning.
pub fn calculate(
  text: &str,
  preferences: &Preferences,
  store: &mut SymbolStore,
) -> Result<Calculation, CalculatorError> {
  let start = pool::cursor();
  let result = run_statement(text, preferences, store);
  pool::tidy_from(start);
  result
}

fn run_statement(
  text: &str,
  preferences: &Preferences,
  store: &mut SymbolStore,
) -> Result<Calculation, CalculatorError> {
  match syntax::parse_statement(text)? {
    Statement::Expression(e) => Ok(evaluate(e, preferences, store)?.1),
    Statement::Assignment { name, value } => {
      let (reduced, calculation) = evaluate(value, preferences, store)?;
      debug!("storing {} -> {}", reduced, name);
      store.define_symbol(&name, reduced);
      Ok(calculation)
    }
    Statement::Definition { name, body } => {
      debug!("defining {} := {}", name, body);
      store.define_symbol(&name, body);
      Ok(definition(body))
    }
    Statement::FunctionDefinition {
      name,
      parameter,
      body,
    } => {
      debug!("defining {}({}) = {}", name, parameter, body);
      store.define_function(&name, &parameter, body);
      Ok(definition(body))
    }
  }
}

fn definition(body: Expression) -> Calculation {
  let text = body.to_string();
  Calculation {
    exact: text.clone(),
    approximate: text,
  }
}

fn evaluate(
  e: Expression,
  preferences: &Preferences,
  store: &SymbolStore,
) -> Result<(Expression, Calculation), CalculatorError> {
  for name in matcher::variables(e)? {
    if store.is_circularly_defined(&name)? {
      return Err(CalculatorError::CircularDefinition(name));
    }
  }
  let ctx = ReductionContext::from_preferences(preferences, store);
  let reduced = reduce(e, &ctx);
  let exact = Checkpoint::new()
    .run(|| beautify::beautify(reduced))
    .unwrap_or(reduced)
    .to_string();
  let value = approximate::<f64>(reduced, &ApproximationContext::from(&ctx));
  let calculation = Calculation {
    exact,
    approximate: value.text(preferences.complex_format),
  };
  Ok((reduced, calculation))
}
