//! User definitions and their substitution into expressions.
//!
//! Definitions are kept in their byte form, outside of the node pool, so
//! they survive `clear_state()`; every use decodes a fresh copy.

use std::cell::RefCell;
use std::collections::HashMap;

use log::debug;

use crate::context::SymbolicComputation;
use crate::expression::{DecodeError, Expression, NodeKind, PARAMETER_CHILD_INDEX};
use crate::matcher::{is_ignored, scope_of, IgnoredSymbols, TrinaryBoolean};
use crate::pool::{self, PoolResult};

/// Nested replacements allowed before a definition is deemed circular.
pub const MAX_NESTED_REPLACEMENTS: usize = 16;

/// Stable identity of one definition; redefining a name gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
enum DefinitionKind {
  Symbol,
  Function { parameter: String },
}

#[derive(Debug, Clone)]
struct Definition {
  id: ModelId,
  kind: DefinitionKind,
  bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
enum Cached {
  Resolved(Vec<u8>),
  Circular,
}

/// Outcome of substituting definitions.
#[derive(Debug, Clone, Copy)]
pub enum Resolution {
  Resolved(Expression),
  Circular,
}

#[derive(Debug, Default)]
pub struct SymbolStore {
  definitions: HashMap<String, Definition>,
  next_id: u64,
  cache: RefCell<HashMap<(ModelId, SymbolicComputation), Cached>>,
}

fn decode(bytes: &[u8]) -> PoolResult {
  match Expression::from_address(bytes) {
    Ok(e) => Ok(e),
    Err(DecodeError::Interrupted(interruption)) => Err(interruption),
    Err(_) => Expression::undefined(),
  }
}

impl SymbolStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn insert(&mut self, name: &str, kind: DefinitionKind, tree: Expression) -> ModelId {
    self.next_id += 1;
    let id = ModelId(self.next_id);
    self.definitions.insert(
      name.to_string(),
      Definition {
        id,
        kind,
        bytes: tree.to_bytes(),
      },
    );
    // Definitions may depend on each other
    self.invalidate_all();
    id
  }

  /// Stores `name := definition`.
  pub fn define_symbol(&mut self, name: &str, definition: Expression) -> ModelId {
    self.insert(name, DefinitionKind::Symbol, definition)
  }

  /// Stores `name(parameter) := body`.
  pub fn define_function(
    &mut self,
    name: &str,
    parameter: &str,
    body: Expression,
  ) -> ModelId {
    let kind = DefinitionKind::Function {
      parameter: parameter.to_string(),
    };
    self.insert(name, kind, body)
  }

  pub fn remove(&mut self, name: &str) -> bool {
    let removed = self.definitions.remove(name).is_some();
    if removed {
      self.invalidate_all();
    }
    removed
  }

  pub fn is_defined(&self, name: &str) -> bool {
    self.definitions.contains_key(name)
  }

  pub fn is_function(&self, name: &str) -> bool {
    self
      .definitions
      .get(name)
      .is_some_and(|d| matches!(d.kind, DefinitionKind::Function { .. }))
  }

  pub fn model_id(&self, name: &str) -> Option<ModelId> {
    self.definitions.get(name).map(|d| d.id)
  }

  pub fn function_parameter(&self, name: &str) -> Option<&str> {
    match &self.definitions.get(name)?.kind {
      DefinitionKind::Function { parameter } => Some(parameter),
      DefinitionKind::Symbol => None,
    }
  }

  /// Defined names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }

  /// A fresh copy of the stored definition of `name`, as written.
  pub fn expression_for_symbol(&self, name: &str) -> PoolResult<Option<Expression>> {
    match self.definitions.get(name) {
      Some(definition) => decode(&definition.bytes).map(Some),
      None => Ok(None),
    }
  }

  /// Whether resolving `name` never terminates. Allocations made to find
  /// out are freed before returning.
  pub fn is_circularly_defined(&self, name: &str) -> PoolResult<bool> {
    let Some(definition) = self.definitions.get(name) else {
      return Ok(false);
    };
    let cursor = pool::cursor();
    let result = (|| -> PoolResult<bool> {
      let reference = Expression::symbol(name)?;
      let reference = match &definition.kind {
        DefinitionKind::Symbol => reference,
        DefinitionKind::Function { parameter } => {
          Expression::function(name, Expression::symbol(parameter)?)?
        }
      };
      let resolution = expression_without_symbols(
        reference,
        self,
        SymbolicComputation::ReplaceAllDefinedSymbols,
      )?;
      Ok(matches!(resolution, Resolution::Circular))
    })();
    pool::tidy_from(cursor);
    result
  }

  /// Forgets the memoized resolution of `name`.
  pub fn invalidate(&self, name: &str) {
    if let Some(id) = self.model_id(name) {
      self.cache.borrow_mut().retain(|(model, _), _| *model != id);
    }
  }

  pub fn invalidate_all(&self) {
    self.cache.borrow_mut().clear();
  }

  fn cached(&self, id: ModelId, policy: SymbolicComputation) -> Option<Cached> {
    self.cache.borrow().get(&(id, policy)).cloned()
  }

  fn remember(&self, id: ModelId, policy: SymbolicComputation, entry: Cached) {
    self.cache.borrow_mut().entry((id, policy)).or_insert(entry);
  }
}

struct Resolver<'a> {
  store: &'a SymbolStore,
  policy: SymbolicComputation,
  chain: Vec<String>,
  is_circular: TrinaryBoolean,
}

impl Resolver<'_> {
  fn replace(
    &mut self,
    e: Expression,
    ignored: Option<&IgnoredSymbols<'_>>,
  ) -> PoolResult {
    if self.is_circular == TrinaryBoolean::True {
      return Ok(e);
    }
    let kind = e.kind();
    match &kind {
      NodeKind::Symbol(name) => {
        if self.policy.replaces_symbols()
          && !is_ignored(e, ignored)
          && self.store.is_defined(name)
          && !self.store.is_function(name)
        {
          return self.definition(name, None);
        }
        Ok(e)
      }
      NodeKind::Function(name) => {
        let argument = self.replace(e.child(0), ignored)?;
        if self.policy.replaces_functions() && self.store.is_function(name) {
          return self.definition(name, Some(argument));
        }
        if argument.same_node(e.child(0)) {
          Ok(e)
        } else {
          Expression::function(name, argument)
        }
      }
      _ => {
        let children = e.children();
        let parametered = kind.is_parametered();
        let scope = parametered.then(|| scope_of(e, ignored));
        let mut replaced = Vec::with_capacity(children.len());
        let mut changed = false;
        for (i, child) in children.iter().enumerate() {
          let new_child = if parametered && i == PARAMETER_CHILD_INDEX {
            *child
          } else if i == 0 && scope.is_some() {
            self.replace(*child, scope.as_ref())?
          } else {
            self.replace(*child, ignored)?
          };
          changed |= !new_child.same_node(*child);
          replaced.push(new_child);
        }
        if changed {
          Expression::new(kind.clone(), replaced)
        } else {
          Ok(e)
        }
      }
    }
  }

  /// The resolved definition of `name`, applied to `argument` for functions.
  fn definition(&mut self, name: &str, argument: Option<Expression>) -> PoolResult {
    let store = self.store;
    let Some(definition) = store.definitions.get(name) else {
      return Expression::symbol(name);
    };
    if self.chain.iter().any(|n| n == name)
      || self.chain.len() >= MAX_NESTED_REPLACEMENTS
    {
      debug!("circular definition reached through {}", name);
      self.is_circular = TrinaryBoolean::True;
      return Expression::undefined();
    }
    let resolved = match store.cached(definition.id, self.policy) {
      Some(Cached::Circular) => {
        self.is_circular = TrinaryBoolean::True;
        return Expression::undefined();
      }
      Some(Cached::Resolved(bytes)) => decode(&bytes)?,
      None => {
        let top_level = self.chain.is_empty();
        self.chain.push(name.to_string());
        let body = decode(&definition.bytes)?;
        let resolved = match &definition.kind {
          DefinitionKind::Symbol => self.replace(body, None)?,
          DefinitionKind::Function { parameter } => {
            let parameter = Expression::symbol(parameter)?;
            let scope = IgnoredSymbols::new(parameter, None);
            self.replace(body, Some(&scope))?
          }
        };
        self.chain.pop();
        if top_level {
          let entry = if self.is_circular == TrinaryBoolean::True {
            Cached::Circular
          } else {
            Cached::Resolved(resolved.to_bytes())
          };
          store.remember(definition.id, self.policy, entry);
        }
        resolved
      }
    };
    match (&definition.kind, argument) {
      (DefinitionKind::Function { parameter }, Some(argument)) => {
        substitute_symbol(resolved, parameter, argument)
      }
      _ => Ok(resolved),
    }
  }
}

/// Replaces every symbol allowed by `policy` with its stored definition,
/// recursively. A definition that refers back to itself, directly or
/// through others, or that nests deeper than [`MAX_NESTED_REPLACEMENTS`],
/// yields [`Resolution::Circular`] and no partial result.
pub fn expression_without_symbols(
  e: Expression,
  store: &SymbolStore,
  policy: SymbolicComputation,
) -> PoolResult<Resolution> {
  let mut resolver = Resolver {
    store,
    policy,
    chain: Vec::new(),
    is_circular: TrinaryBoolean::Unknown,
  };
  let resolved = resolver.replace(e, None)?;
  if resolver.is_circular == TrinaryBoolean::Unknown {
    resolver.is_circular = TrinaryBoolean::False;
  }
  Ok(match resolver.is_circular {
    TrinaryBoolean::True => Resolution::Circular,
    _ => Resolution::Resolved(resolved),
  })
}

/// The resolved definition behind a symbol or function node, `None` if
/// nothing is defined under its name.
pub fn expand(
  e: Expression,
  store: &SymbolStore,
  policy: SymbolicComputation,
) -> PoolResult<Option<Resolution>> {
  match e.symbol_name() {
    Some(name) if store.is_defined(&name) => {
      expression_without_symbols(e, store, policy).map(Some)
    }
    _ => Ok(None),
  }
}

/// Replaces the free occurrences of symbol `name` in `e` by `value`.
pub fn substitute_symbol(e: Expression, name: &str, value: Expression) -> PoolResult {
  let kind = e.kind();
  match &kind {
    NodeKind::Symbol(symbol) if symbol == name => return Ok(value),
    NodeKind::Symbol(_) => return Ok(e),
    _ => {}
  }
  let children = e.children();
  // An inner binder of the same name shadows it
  let shadowed = kind.is_parametered()
    && children[PARAMETER_CHILD_INDEX].is_symbol_named(name);
  let mut replaced = Vec::with_capacity(children.len());
  let mut changed = false;
  for (i, child) in children.iter().enumerate() {
    let skip = kind.is_parametered() && (i == PARAMETER_CHILD_INDEX || (i == 0 && shadowed));
    let new_child = if skip {
      *child
    } else {
      substitute_symbol(*child, name, value)?
    };
    changed |= !new_child.same_node(*child);
    replaced.push(new_child);
  }
  if changed {
    Expression::new(kind, replaced)
  } else {
    Ok(e)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(text: &str) -> Expression {
    crate::parse(text).unwrap()
  }

  #[test]
  fn self_reference_is_circular() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("a", parse("a+1"));
    assert!(store.is_circularly_defined("a").unwrap());
    let resolution = expression_without_symbols(
      parse("2*a"),
      &store,
      SymbolicComputation::ReplaceAllDefinedSymbols,
    )
    .unwrap();
    assert!(matches!(resolution, Resolution::Circular));
  }

  #[test]
  fn mutual_reference_is_circular() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("a", parse("b"));
    store.define_symbol("b", parse("a*2"));
    assert!(store.is_circularly_defined("a").unwrap());
    assert!(store.is_circularly_defined("b").unwrap());
  }

  #[test]
  fn functions_substitute_their_argument() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("x", parse("100"));
    store.define_symbol("c", parse("3"));
    store.define_function("f", "x", parse("x^2+c"));
    let resolution = expression_without_symbols(
      parse("f(5)"),
      &store,
      SymbolicComputation::ReplaceAllDefinedSymbols,
    )
    .unwrap();
    let Resolution::Resolved(e) = resolution else {
      panic!("f is not circular");
    };
    assert_eq!(e.to_string(), "5^2+3");
  }

  #[test]
  fn only_functions_are_replaced_when_asked() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("c", parse("3"));
    store.define_function("f", "t", parse("t+c"));
    let resolution = expression_without_symbols(
      parse("f(c)"),
      &store,
      SymbolicComputation::ReplaceDefinedFunctions,
    )
    .unwrap();
    let Resolution::Resolved(e) = resolution else {
      panic!("f is not circular");
    };
    assert_eq!(e.to_string(), "c+c");
  }

  #[test]
  fn redefinition_invalidates_the_cache() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("a", parse("a"));
    assert!(store.is_circularly_defined("a").unwrap());
    let first = store.model_id("a");
    store.define_symbol("a", parse("1"));
    assert_ne!(store.model_id("a"), first);
    assert!(!store.is_circularly_defined("a").unwrap());
  }

  #[test]
  fn bound_variables_are_not_replaced() {
    pool::clear_pool();
    let mut store = SymbolStore::new();
    store.define_symbol("k", parse("7"));
    let resolution = expression_without_symbols(
      parse("sum(k,k,1,k)"),
      &store,
      SymbolicComputation::ReplaceAllDefinedSymbols,
    )
    .unwrap();
    let Resolution::Resolved(e) = resolution else {
      panic!("k is not circular");
    };
    assert_eq!(e.to_string(), "sum(k,k,1,7)");
  }
}
