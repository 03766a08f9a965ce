use super::*;

mod scoping {
  use super::*;

  #[test]
  fn summation_index_is_bound() {
    clear_state();
    let sum = parse("sum(k,k,1,10)").unwrap();
    assert!(!matcher::contains_free_symbol(sum, "k").unwrap());

    let scaled = parse("sum(k*x,k,1,10)").unwrap();
    assert!(matcher::contains_free_symbol(scaled, "x").unwrap());
    assert!(!matcher::contains_free_symbol(scaled, "k").unwrap());
  }

  #[test]
  fn bound_index_reused_outside() {
    clear_state();
    let e = parse("k+sum(k,k,1,10)").unwrap();
    assert!(matcher::contains_free_symbol(e, "k").unwrap());
  }

  #[test]
  fn free_variables() {
    clear_state();
    let e = parse("y+x*sum(k,k,1,n)").unwrap();
    let mut names = matcher::variables(e).unwrap();
    names.sort();
    assert_eq!(names, vec!["n", "x", "y"]);
  }
}

mod predicates {
  use super::*;

  #[test]
  fn containers_and_undefined() {
    clear_state();
    assert!(matcher::deep_is_list(parse("1+{1,2}").unwrap()).unwrap());
    assert!(!matcher::deep_is_list(parse("1+x").unwrap()).unwrap());
    assert!(matcher::deep_is_matrix(parse("2*[[1]]").unwrap()).unwrap());
    assert!(matcher::is_undefined_somewhere(parse("1+undef").unwrap()).unwrap());
    assert!(matcher::deep_is_random(parse("random()*2").unwrap()).unwrap());
  }
}
