use super::*;

mod assignments {
  use super::*;

  #[test]
  fn stored_values() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    assert_eq!(calculate("3->a", &preferences, &mut store).unwrap().exact, "3");
    assert_eq!(calculate("a*2", &preferences, &mut store).unwrap().exact, "6");
  }

  #[test]
  fn definitions_chain() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("x:=2", &preferences, &mut store).unwrap();
    calculate("y:=x*3", &preferences, &mut store).unwrap();
    let calculation = calculate("y", &preferences, &mut store).unwrap();
    assert_eq!(calculation.exact, "6");
    assert_eq!(calculation.approximate, "6");
  }

  #[test]
  fn redefinition_replaces_the_value() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("x:=2", &preferences, &mut store).unwrap();
    assert_eq!(calculate("x+1", &preferences, &mut store).unwrap().exact, "3");
    calculate("x:=5", &preferences, &mut store).unwrap();
    assert_eq!(calculate("x+1", &preferences, &mut store).unwrap().exact, "6");
  }

  #[test]
  fn functions() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    let definition = calculate("f(x)=x^2", &preferences, &mut store).unwrap();
    assert_eq!(definition.exact, "x^2");
    assert_eq!(calculate("f(3)", &preferences, &mut store).unwrap().exact, "9");
  }

  #[test]
  fn definitions_outlive_the_pool() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("2->a", &preferences, &mut store).unwrap();
    clear_state();
    assert_eq!(calculate("a*3", &preferences, &mut store).unwrap().exact, "6");
  }

  #[test]
  fn kept_symbols_are_not_replaced() {
    clear_state();
    let mut store = SymbolStore::new();
    calculate("3->a", &Preferences::default(), &mut store).unwrap();
    let ctx = ReductionContext::new(&store)
      .with_symbolic_computation(SymbolicComputation::KeepAllSymbols);
    assert_eq!(reduce(parse("a+1").unwrap(), &ctx).to_string(), "1+a");
  }
}

mod circularity {
  use super::*;

  #[test]
  fn self_reference() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("a:=a+1", &preferences, &mut store).unwrap();
    assert!(store.is_circularly_defined("a").unwrap());
    assert!(matches!(
      calculate("a", &preferences, &mut store),
      Err(CalculatorError::CircularDefinition(name)) if name == "a"
    ));

    clear_state();
    let ctx = ReductionContext::new(&store);
    assert!(reduce(parse("a").unwrap(), &ctx).is_undefined());
  }

  #[test]
  fn mutual_reference() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("b:=c+1", &preferences, &mut store).unwrap();
    calculate("c:=b", &preferences, &mut store).unwrap();
    assert!(matches!(
      calculate("b*2", &preferences, &mut store),
      Err(CalculatorError::CircularDefinition(_))
    ));
  }

  #[test]
  fn removing_a_symbol_breaks_the_cycle() {
    let preferences = Preferences::default();
    let mut store = SymbolStore::new();
    calculate("a:=a+1", &preferences, &mut store).unwrap();
    assert!(store.remove("a"));
    assert!(!store.is_circularly_defined("a").unwrap());
    assert_eq!(calculate("a", &preferences, &mut store).unwrap().exact, "a");
  }
}
