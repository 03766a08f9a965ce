use super::*;

const WORKLOAD: &str = "(x+1)^3+sum(k^2,k,1,5)+sqrt(72)";

mod rollback {
  use super::*;

  #[test]
  fn interruption_at_any_allocation_restores_the_pool() {
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    for after in 0..300 {
      clear_state();
      let e = parse(WORKLOAD).unwrap();
      let before = pool::cursor();
      pool::schedule_interruption(after);
      let outcome = Checkpoint::new().run(|| reduction::deep_reduce(e, &ctx, None));
      pool::cancel_scheduled_interruption();
      if let Err(interruption) = outcome {
        assert_eq!(interruption, Interruption::UserCancel);
        assert_eq!(pool::cursor(), before, "interrupted after {}", after);
      }
      assert!(pool::is_valid(e));
    }
  }

  #[test]
  fn step_budget() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse(WORKLOAD).unwrap();
    let before = pool::cursor();
    let outcome = Checkpoint::new()
      .with_step_budget(5)
      .run(|| reduction::deep_reduce(e, &ctx, None));
    assert_eq!(outcome, Err(Interruption::Deadline));
    assert_eq!(pool::cursor(), before);
  }
}

mod degradation {
  use super::*;

  #[test]
  fn cancelled_reduction_returns_the_input() {
    clear_state();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse("(1+x)*(2+x)").unwrap();
    pool::schedule_interruption(3);
    let result = reduce(e, &ctx);
    assert_eq!(result.to_string(), e.to_string());
  }

  #[test]
  fn exhausted_pool_returns_the_input() {
    clear_state();
    let capacity = pool::pool_capacity();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = parse("(x+1)^20").unwrap();
    pool::set_pool_capacity(pool::used_bytes());
    let (result, failed) =
      reduction::clone_and_deep_reduce_with_system_checkpoint(e, &ctx, false);
    pool::set_pool_capacity(capacity);
    assert!(failed);
    assert!(result.is_identical_to(e));
  }

  #[test]
  fn calculations_release_their_nodes() {
    clear_state();
    let before = pool::cursor();
    exact("sum(k^2,k,1,30)+(x+2)^4");
    assert_eq!(pool::cursor(), before);
  }
}
