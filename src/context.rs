//! Per-call settings threaded through reduction and approximation.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::symbols::SymbolStore;

/// Which symbol references are replaced by their stored definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SymbolicComputation {
  #[default]
  ReplaceAllDefinedSymbols,
  ReplaceDefinedFunctions,
  KeepAllSymbols,
}

impl SymbolicComputation {
  pub fn replaces_symbols(self) -> bool {
    self == SymbolicComputation::ReplaceAllDefinedSymbols
  }

  pub fn replaces_functions(self) -> bool {
    self != SymbolicComputation::KeepAllSymbols
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplexFormat {
  #[default]
  Real,
  Cartesian,
  Polar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleUnit {
  #[default]
  Radian,
  Degree,
  Gradian,
}

impl AngleUnit {
  /// Size of half a turn in this unit, or `None` for radians where it is
  /// pi itself.
  pub fn half_turn(self) -> Option<i64> {
    match self {
      AngleUnit::Radian => None,
      AngleUnit::Degree => Some(180),
      AngleUnit::Gradian => Some(200),
    }
  }

  pub fn to_radians(self, angle: f64) -> f64 {
    match self.half_turn() {
      None => angle,
      Some(half_turn) => angle * PI / half_turn as f64,
    }
  }

  pub fn from_radians(self, angle: f64) -> f64 {
    match self.half_turn() {
      None => angle,
      Some(half_turn) => angle * half_turn as f64 / PI,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitFormat {
  #[default]
  Metric,
  Imperial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReductionTarget {
  /// Forms meant to be displayed.
  #[default]
  User,
  /// Cheapest forms, used before approximating and when retrying.
  SystemForApproximation,
  /// Expanded forms, used by analysis code (distributed products, expanded
  /// powers of sums).
  SystemForAnalysis,
}

/// The user-facing settings of a calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Preferences {
  pub complex_format: ComplexFormat,
  pub angle_unit: AngleUnit,
  pub unit_format: UnitFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct ReductionContext<'a> {
  pub store: &'a SymbolStore,
  pub symbolic_computation: SymbolicComputation,
  pub complex_format: ComplexFormat,
  pub angle_unit: AngleUnit,
  pub unit_format: UnitFormat,
  pub target: ReductionTarget,
  pub expand_logarithm: bool,
}

impl<'a> ReductionContext<'a> {
  pub fn new(store: &'a SymbolStore) -> Self {
    ReductionContext {
      store,
      symbolic_computation: SymbolicComputation::default(),
      complex_format: ComplexFormat::default(),
      angle_unit: AngleUnit::default(),
      unit_format: UnitFormat::default(),
      target: ReductionTarget::default(),
      expand_logarithm: true,
    }
  }

  pub fn from_preferences(preferences: &Preferences, store: &'a SymbolStore) -> Self {
    ReductionContext::new(store)
      .with_complex_format(preferences.complex_format)
      .with_angle_unit(preferences.angle_unit)
      .with_unit_format(preferences.unit_format)
  }

  pub fn with_symbolic_computation(mut self, policy: SymbolicComputation) -> Self {
    self.symbolic_computation = policy;
    self
  }

  pub fn with_complex_format(mut self, format: ComplexFormat) -> Self {
    self.complex_format = format;
    self
  }

  pub fn with_angle_unit(mut self, unit: AngleUnit) -> Self {
    self.angle_unit = unit;
    self
  }

  pub fn with_unit_format(mut self, format: UnitFormat) -> Self {
    self.unit_format = format;
    self
  }

  pub fn with_target(mut self, target: ReductionTarget) -> Self {
    self.target = target;
    self
  }

  pub fn with_expand_logarithm(mut self, expand: bool) -> Self {
    self.expand_logarithm = expand;
    self
  }

  pub fn is_real(&self) -> bool {
    self.complex_format == ComplexFormat::Real
  }
}

#[derive(Debug, Clone)]
pub struct ApproximationContext<'a> {
  pub complex_format: ComplexFormat,
  pub angle_unit: AngleUnit,
  pub bindings: HashMap<String, f64>,
  pub store: Option<&'a SymbolStore>,
}

impl Default for ApproximationContext<'_> {
  fn default() -> Self {
    ApproximationContext {
      complex_format: ComplexFormat::default(),
      angle_unit: AngleUnit::default(),
      bindings: HashMap::new(),
      store: None,
    }
  }
}

impl<'a> ApproximationContext<'a> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_complex_format(mut self, format: ComplexFormat) -> Self {
    self.complex_format = format;
    self
  }

  pub fn with_angle_unit(mut self, unit: AngleUnit) -> Self {
    self.angle_unit = unit;
    self
  }

  pub fn with_store(mut self, store: &'a SymbolStore) -> Self {
    self.store = Some(store);
    self
  }

  /// Binds `name` to `value`; bindings shadow the symbol store.
  pub fn with_binding(mut self, name: &str, value: f64) -> Self {
    self.bindings.insert(name.to_string(), value);
    self
  }
}

impl<'a> From<&ReductionContext<'a>> for ApproximationContext<'a> {
  fn from(context: &ReductionContext<'a>) -> Self {
    let approximation = ApproximationContext::new()
      .with_complex_format(context.complex_format)
      .with_angle_unit(context.angle_unit);
    if context.symbolic_computation.replaces_symbols() {
      approximation.with_store(context.store)
    } else {
      approximation
    }
  }
}
