use symcalc::{
  approximate, approximate_to_scalar, calculate, clear_state, matcher, parse,
  pool, reduce, reduction, ApproximationContext, Calculation,
  CalculatorError, Checkpoint, ComplexFormat, Evaluation, Expression,
  Interruption, Preferences, ReductionContext, SymbolStore,
  SymbolicComputation,
};

fn run(text: &str, preferences: &Preferences) -> Calculation {
  calculate(text, preferences, &mut SymbolStore::new()).unwrap()
}

fn exact(text: &str) -> String {
  run(text, &Preferences::default()).exact
}

fn approximation(text: &str) -> String {
  run(text, &Preferences::default()).approximate
}

fn in_format(format: ComplexFormat) -> Preferences {
  Preferences {
    complex_format: format,
    ..Preferences::default()
  }
}

mod calculator_tests {
  use super::*;
  mod approximation;
  mod arithmetic;
  mod checkpoint;
  mod free_symbols;
  mod serialization;
  mod symbols;
}
