use super::*;

mod rationals {
  use super::*;

  #[test]
  fn sums_of_fractions() {
    let calculation = run("1/2+1/3", &Preferences::default());
    assert_eq!(calculation.exact, "5/6");
    assert_eq!(calculation.approximate, "0.8333333333333334");
  }

  #[test]
  fn integer_powers_and_factorials() {
    assert_eq!(exact("2^10"), "1024");
    assert_eq!(exact("2^-2"), "1/4");
    assert_eq!(exact("5!"), "120");
  }

  #[test]
  fn division_by_zero_is_undefined() {
    assert_eq!(exact("1/0"), "undef");
    assert_eq!(approximation("1/0"), "undef");
  }

  #[test]
  fn extreme_decimal_exponents() {
    assert_eq!(exact("1E999999999"), "undef");
    assert_eq!(approximation("1E999999999"), "undef");
    assert_eq!(exact("1E-999999999"), "0");
    assert_eq!(exact("1.5E3"), "1500");
  }
}

mod polynomials {
  use super::*;

  #[test]
  fn like_terms_collect() {
    assert_eq!(exact("2*x+3*x"), "5*x");
    assert_eq!(exact("x-x"), "0");
    assert_eq!(exact("x*x"), "x^2");
  }

  #[test]
  fn terms_read_by_descending_degree() {
    assert_eq!(exact("1+2*x+x^2"), "x^2+2*x+1");
    assert_eq!(exact("1-x^2"), "-x^2+1");
  }

  #[test]
  fn free_variables_have_no_approximation() {
    assert_eq!(approximation("x^2+2*x+1"), "undef");
  }
}

mod roots {
  use super::*;

  #[test]
  fn square_factors_leave_the_root() {
    let calculation = run("sqrt(12)", &Preferences::default());
    assert_eq!(calculation.exact, "2*sqrt(3)");
    assert_eq!(calculation.approximate, "3.4641016151377544");
    assert_eq!(exact("sqrt(12)*sqrt(3)"), "6");
  }

  #[test]
  fn odd_roots_of_negatives_are_real() {
    assert_eq!(exact("(-8)^(1/3)"), "-2");
  }
}

mod functions {
  use super::*;

  #[test]
  fn exact_trigonometric_values() {
    let calculation = run("sin(pi/6)", &Preferences::default());
    assert_eq!(calculation.exact, "1/2");
    assert_eq!(calculation.approximate, "0.5");
    assert_eq!(exact("cos(pi)"), "-1");
    assert_eq!(exact("tan(pi/2)"), "undef");
  }

  #[test]
  fn logarithms() {
    assert_eq!(exact("log(1000)"), "3");
    assert_eq!(exact("log(-1)"), "undef");
    assert_eq!(approximation("log(-1)"), "undef");
  }

  #[test]
  fn sums_and_products() {
    assert_eq!(exact("sum(k^2,k,1,3)"), "14");
    assert_eq!(exact("product(k,k,1,5)"), "120");
    assert_eq!(exact("sum(k,k,3,1)"), "0");
  }

  #[test]
  fn derivatives() {
    assert_eq!(exact("diff(x^3,x,2)"), "12");
  }
}

mod containers {
  use super::*;

  #[test]
  fn lists_distribute() {
    let calculation = run("{1,2}+1", &Preferences::default());
    assert_eq!(calculation.exact, "{2,3}");
    assert_eq!(calculation.approximate, "{2,3}");
  }

  #[test]
  fn matrix_products() {
    assert_eq!(exact("[[1,2][3,4]]*[[0,1][1,0]]"), "[[2,1][4,3]]");
    assert_eq!(exact("[[1,2]]+[[1][2]]"), "undef");
  }
}

mod derived_functions {
  use super::*;

  fn value(text: &str) -> f64 {
    approximate_to_scalar::<f64>(parse(text).unwrap(), &ApproximationContext::new())
  }

  #[test]
  fn reciprocal_trigonometry() {
    assert_eq!(exact("sec(0)"), "1");
    assert_eq!(exact("csc(pi/6)"), "2");
    assert_eq!(exact("cot(pi/2)"), "0");
    let third = std::f64::consts::PI / 3.0;
    assert!((value("arcsec(2)") - third).abs() < 1e-12);
    assert!((value("arccsc(2)") - third / 2.0).abs() < 1e-12);
  }

  #[test]
  fn hyperbolic_functions() {
    assert_eq!(exact("sinh(0)"), "0");
    assert_eq!(exact("cosh(0)"), "1");
    assert!((value("sinh(1)") - 1f64.sinh()).abs() < 1e-12);
    assert!((value("tanh(1)") - 1f64.tanh()).abs() < 1e-12);
    assert!((value("asinh(1)") - 1f64.asinh()).abs() < 1e-12);
    assert!((value("acosh(2)") - 2f64.acosh()).abs() < 1e-12);
    assert!((value("atanh(1/2)") - 0.5f64.atanh()).abs() < 1e-12);
  }

  #[test]
  fn list_aggregates() {
    assert_eq!(exact("min({3,1,2})"), "1");
    assert_eq!(exact("sort({3,1,2})"), "{1,2,3}");
    assert_eq!(exact("sum({1,2,3})"), "6");
    assert_eq!(approximation("max({1,sqrt(2)})"), "1.4142135623730951");
    assert_eq!(approximation("max({x,1})"), "undef");
    assert_eq!(value("sum({1,2,3.5})"), 6.5);
    assert_eq!(value("product({2,1/2,3})"), 3.0);
    assert_eq!(value("min({3,-1,2})"), -1.0);
  }

  #[test]
  fn integer_functions() {
    assert_eq!(exact("binomial(5,2)"), "10");
    assert_eq!(exact("permute(5,2)"), "20");
    assert_eq!(exact("quo(-7,2)"), "-4");
    assert_eq!(exact("rem(-7,2)"), "1");
    assert_eq!(value("binomial(10,3)"), 120.0);
    assert_eq!(value("permute(6,3)"), 120.0);
    assert_eq!(value("rem(-7,2)"), 1.0);
    assert_eq!(value("quo(-7,2)"), -4.0);
    assert!(value("rem(7,0)").is_nan());
  }
}

mod idempotence {
  use super::*;

  #[test]
  fn reducing_twice_changes_nothing() {
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    for text in [
      "1/2+1/3",
      "(x+1)^2",
      "sqrt(12)*y",
      "sin(-x)+cos(pi/3)",
      "2*x+3*x-y/x",
      "sum(k*x,k,1,n)",
      "{1,x}*[[1,2][3,4]]",
    ] {
      clear_state();
      let once = reduce(parse(text).unwrap(), &ctx);
      let twice = reduce(once, &ctx);
      assert_eq!(twice.to_string(), once.to_string(), "{}", text);
    }
  }
}
