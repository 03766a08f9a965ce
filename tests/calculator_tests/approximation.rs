use super::*;

mod complex_formats {
  use super::*;

  #[test]
  fn square_root_of_minus_one() {
    let real = run("sqrt(-1)", &in_format(ComplexFormat::Real));
    assert_eq!(real.exact, "undef");
    assert_eq!(real.approximate, "undef");

    let cartesian = run("sqrt(-1)", &in_format(ComplexFormat::Cartesian));
    assert_eq!(cartesian.exact, "i");
    assert_eq!(cartesian.approximate, "i");
  }

  #[test]
  fn cartesian_multiples_of_i() {
    let calculation = run("sqrt(-4)", &in_format(ComplexFormat::Cartesian));
    assert_eq!(calculation.exact, "2*i");
    assert_eq!(calculation.approximate, "2*i");
  }

  #[test]
  fn polar_results() {
    let calculation = run("i", &in_format(ComplexFormat::Polar));
    assert_eq!(calculation.approximate, "e^(1.5707963267948966*i)");
  }
}

mod angles {
  use super::*;
  use symcalc::AngleUnit;

  #[test]
  fn degrees() {
    let preferences = Preferences {
      angle_unit: AngleUnit::Degree,
      ..Preferences::default()
    };
    let calculation = run("cos(60)", &preferences);
    assert_eq!(calculation.exact, "1/2");
    assert_eq!(calculation.approximate, "0.5");
    assert_eq!(run("atan(1)", &preferences).exact, "45");
  }
}

mod numeric_calculus {
  use super::*;

  #[test]
  fn integrals_and_derivatives() {
    let ctx = ApproximationContext::new();
    let integral = approximate_to_scalar::<f64>(parse("int(x^2,x,0,3)").unwrap(), &ctx);
    assert!((integral - 9.0).abs() < 1e-10);
    let derivative = approximate_to_scalar::<f64>(parse("diff(x^3,x,2)").unwrap(), &ctx);
    assert!((derivative - 12.0).abs() < 1e-6);
  }

  #[test]
  fn long_sums() {
    let sum = approximate_to_scalar::<f64>(
      parse("sum(1/k^2,k,1,1000)").unwrap(),
      &ApproximationContext::new(),
    );
    let limit = std::f64::consts::PI.powi(2) / 6.0;
    assert!(limit - sum > 0.0 && limit - sum < 1.1e-3);
  }
}

mod bindings {
  use super::*;

  #[test]
  fn bound_variables() {
    let ctx = ApproximationContext::new().with_binding("x", 2.0);
    let value = approximate_to_scalar::<f64>(parse("x^2+1").unwrap(), &ctx);
    assert_eq!(value, 5.0);
    assert!(approximate_to_scalar::<f64>(parse("y").unwrap(), &ctx).is_nan());
  }

  #[test]
  fn single_precision() {
    let value =
      approximate_to_scalar::<f32>(parse("1/3").unwrap(), &ApproximationContext::new());
    assert!((value - 1.0f32 / 3.0).abs() < 1e-7);
  }

  #[test]
  fn comparisons_are_booleans() {
    let value = approximate::<f64>(parse("1<2").unwrap(), &ApproximationContext::new());
    assert_eq!(value, Evaluation::Boolean(true));
  }
}

mod keeping_symbols {
  use super::*;
  use symcalc::approximation::deep_approximate_keeping_symbols;
  use symcalc::expression::NodeKind;
  use symcalc::reduction::clone_and_deep_reduce_with_system_checkpoint;
  use symcalc::{simplify, ReductionTarget};

  #[test]
  fn constants_collapse_beside_symbols() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let reduced = reduce(parse("x*pi+1/3").unwrap(), &ctx);
    let text = deep_approximate_keeping_symbols(reduced, &ctx)
      .unwrap()
      .to_string();
    assert!(text.contains("1/3"), "{}", text);
    assert!(text.contains("3.14159265358979"), "{}", text);
    assert!(text.contains('x'), "{}", text);
    assert!(!text.contains("pi"), "{}", text);
  }

  #[test]
  fn rationals_stay_exact() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let reduced = reduce(parse("x+1/3").unwrap(), &ctx);
    let kept = deep_approximate_keeping_symbols(reduced, &ctx).unwrap();
    assert_eq!(kept.to_string(), reduced.to_string());
  }

  #[test]
  fn bound_variables_do_not_block_collapse() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse("sum(k,k,1,10)+x").unwrap();
    let kept = deep_approximate_keeping_symbols(e, &ctx).unwrap();
    assert_eq!(kept.to_string(), "55+x");
  }

  #[test]
  fn simplify_approximates_around_symbols() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let (simplified, approximated) = simplify(parse("x+cos(1/2)").unwrap(), &ctx);
    assert!(simplified.to_string().contains("cos(1/2)"));
    let text = approximated.to_string();
    assert!(text.contains("0.8775825618903728"), "{}", text);
    assert!(text.contains('x'), "{}", text);
  }

  #[test]
  fn approximating_reduction() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse("x+cos(1/2)").unwrap();
    let (result, failed) = clone_and_deep_reduce_with_system_checkpoint(e, &ctx, true);
    assert!(!failed);
    assert!(result.to_string().contains("0.8775825618903728"));
  }

  #[test]
  fn exhausted_reduction_retries_with_approximation() {
    clear_state();
    let capacity = pool::pool_capacity();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse("sum(k^2,k,1,100)+x").unwrap();

    // Room for three cheap attempts, far less than expanding 100 terms
    let start = pool::cursor();
    let cheap = ctx.with_target(ReductionTarget::SystemForApproximation);
    let (_, failed) = clone_and_deep_reduce_with_system_checkpoint(e, &cheap, true);
    assert!(!failed);
    let cheap_bytes = pool::used_bytes() - start.bytes();
    pool::tidy_from(start);
    pool::set_pool_capacity(start.bytes() + 3 * cheap_bytes);

    let (result, failed) = clone_and_deep_reduce_with_system_checkpoint(e, &ctx, true);
    pool::set_pool_capacity(capacity);
    assert!(!failed);
    assert_eq!(result.to_string(), "338350+x");
    assert!(result
      .children()
      .iter()
      .any(|child| matches!(child.kind(), NodeKind::Float(_))));
  }
}
