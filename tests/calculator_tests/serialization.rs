use super::*;

mod bytes {
  use super::*;

  #[test]
  fn trees_survive_a_cleared_pool() {
    clear_state();
    let e = parse("sum(k^2,k,1,n)+sqrt(2)/3-1.25*x").unwrap();
    let text = e.to_string();
    let bytes = e.to_bytes();
    clear_state();
    let copy = Expression::from_address(&bytes).unwrap();
    assert_eq!(copy.to_string(), text);
    assert_eq!(copy.to_bytes(), bytes);
  }

  #[test]
  fn truncated_input_is_rejected() {
    clear_state();
    let bytes = parse("[[1,2][3,4]]").unwrap().to_bytes();
    assert!(Expression::from_address(&bytes[..bytes.len() - 1]).is_err());
    assert!(Expression::from_address(&[]).is_err());
  }
}
