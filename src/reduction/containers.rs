use std::cmp::Ordering;

use super::functions::{has_free_names, is_real};
use super::{reduce_new, Scope};
use crate::approximation::approximate_to_scalar;
use crate::context::{ApproximationContext, ReductionContext};
use crate::expression::{Expression, ListFunction, NodeKind, Number};
use crate::matcher;
use crate::pool::{self, PoolResult};

/// Largest exponent of a matrix power computed by repeated products.
const MAX_MATRIX_POWER: i64 = 64;

fn dimensions(e: Expression) -> Option<(usize, usize)> {
  pool::with_node(e, |n| match &n.kind {
    NodeKind::Matrix { rows, columns } => Some((*rows, *columns)),
    _ => None,
  })
}

fn is_list(e: Expression) -> bool {
  e.matches_kind(|k| matches!(k, NodeKind::List))
}

fn is_dependency(e: Expression) -> bool {
  e.matches_kind(|k| matches!(k, NodeKind::Dependency))
}

/// `f({a,b}, c)` as `{f(a,c), f(b,c)}`. Lists of different lengths make
/// the result undefined.
pub(super) fn distribute_over_lists(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let node = e.node();
  let mut length = None;
  for child in &node.children {
    if is_list(*child) {
      let n = child.number_of_children();
      match length {
        Some(m) if m != n => return Expression::undefined(),
        _ => length = Some(n),
      }
    }
  }
  let length = length.unwrap_or(0);
  let mut items = Vec::with_capacity(length);
  for i in 0..length {
    let children = node
      .children
      .iter()
      .map(|c| if is_list(*c) { c.child(i) } else { *c })
      .collect();
    items.push(reduce_new(node.kind.clone(), children, ctx, scope)?);
  }
  Expression::list(items)
}

/// The value a list item is ordered by: its exact value, or the
/// approximation of a real item without free names.
fn ordering_key(item: Expression, ctx: &ReductionContext) -> PoolResult<Option<Number>> {
  if let Some(number) = Number::of(item) {
    return Ok(Some(number));
  }
  if !is_real(item) || has_free_names(item)? {
    return Ok(None);
  }
  let value: f64 = approximate_to_scalar(item, &ApproximationContext::from(ctx));
  Ok(value.is_finite().then_some(Number::Float(value)))
}

/// `min`, `max`, `sum`, `product` and `sort` of a list. Lists with items
/// that cannot be ordered keep their ordering functions.
pub(super) fn reduce_list_function(
  e: Expression,
  f: ListFunction,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let list = e.child(0);
  if !is_list(list) {
    // Only a free name can still turn out to be a list
    return if has_free_names(list)? {
      Ok(e)
    } else {
      Expression::undefined()
    };
  }
  let items = list.children();
  if items.iter().any(|item| item.is_undefined()) {
    return Expression::undefined();
  }
  match f {
    ListFunction::Sum if items.is_empty() => Expression::integer(0),
    ListFunction::Product if items.is_empty() => Expression::integer(1),
    ListFunction::Sum => reduce_new(NodeKind::Addition, items, ctx, scope),
    ListFunction::Product => reduce_new(NodeKind::Multiplication, items, ctx, scope),
    ListFunction::Minimum | ListFunction::Maximum | ListFunction::Sort => {
      let mut keyed = Vec::with_capacity(items.len());
      for item in items {
        match ordering_key(item, ctx)? {
          Some(key) => keyed.push((key, item)),
          None => return Ok(e),
        }
      }
      keyed.sort_by(|(a, _), (b, _)| a.compare(b).unwrap_or(Ordering::Equal));
      let chosen = match f {
        ListFunction::Minimum => keyed.first(),
        ListFunction::Maximum => keyed.last(),
        _ => return Expression::list(keyed.into_iter().map(|(_, item)| item).collect()),
      };
      match chosen {
        Some((_, item)) => Ok(*item),
        None => Expression::undefined(),
      }
    }
  }
}

/// Merges nested dependencies and drops repeated conditions.
pub(super) fn reduce_dependency(e: Expression) -> PoolResult {
  let mut main = e.child(0);
  let mut all = e.child(1).children();
  if main.is_undefined() {
    return Ok(main);
  }
  while is_dependency(main) {
    all.extend(main.child(1).children());
    main = main.child(0);
  }
  let mut conditions: Vec<Expression> = Vec::with_capacity(all.len());
  for condition in all {
    if !conditions.iter().any(|c| c.is_identical_to(condition)) {
      conditions.push(condition);
    }
  }
  if conditions.is_empty() {
    return Ok(main);
  }
  if main.same_node(e.child(0)) && conditions.len() == e.child(1).number_of_children() {
    return Ok(e);
  }
  Expression::dependency(main, conditions)
}

/// Lifts the dependencies among the children of `e` above it.
pub(super) fn bubble_up_dependencies(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let node = e.node();
  let mut conditions = Vec::new();
  let mut children = Vec::with_capacity(node.children.len());
  for child in node.children {
    if is_dependency(child) {
      conditions.extend(child.child(1).children());
      children.push(child.child(0));
    } else {
      children.push(child);
    }
  }
  let main = reduce_new(node.kind, children, ctx, scope)?;
  let dependency = Expression::dependency(main, conditions)?;
  reduce_dependency(dependency)
}

/// Drops the conditions of a top-level dependency that no longer depend on
/// a variable. An undefined one makes the whole result undefined.
pub(super) fn remove_resolved_dependencies(e: Expression) -> PoolResult {
  if !is_dependency(e) {
    return Ok(e);
  }
  let mut kept = Vec::new();
  for condition in e.child(1).children() {
    if matcher::is_undefined_somewhere(condition)? {
      return Expression::undefined();
    }
    if !matcher::variables(condition)?.is_empty() || matcher::deep_is_random(condition)? {
      kept.push(condition);
    }
  }
  if kept.is_empty() {
    return Ok(e.child(0));
  }
  Expression::dependency(e.child(0), kept)
}

/// Sum of matrices of equal dimensions; anything else added to a matrix
/// is undefined.
pub(super) fn add_matrices(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let operands = e.children();
  let Some(shape) = dimensions(operands[0]) else {
    return Expression::undefined();
  };
  if operands.iter().any(|o| dimensions(*o) != Some(shape)) {
    return Expression::undefined();
  }
  let (rows, columns) = shape;
  let mut entries = Vec::with_capacity(rows * columns);
  for i in 0..rows * columns {
    let terms = operands.iter().map(|o| o.child(i)).collect();
    entries.push(reduce_new(NodeKind::Addition, terms, ctx, scope)?);
  }
  Expression::matrix(rows, columns, entries)
}

fn matrix_product(
  a: Expression,
  b: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult<Option<Expression>> {
  let (Some((m, n)), Some((n2, p))) = (dimensions(a), dimensions(b)) else {
    return Ok(None);
  };
  if n != n2 {
    return Ok(None);
  }
  let mut entries = Vec::with_capacity(m * p);
  for i in 0..m {
    for j in 0..p {
      pool::tick()?;
      let mut terms = Vec::with_capacity(n);
      for k in 0..n {
        let factors = vec![a.child(i * n + k), b.child(k * p + j)];
        terms.push(reduce_new(NodeKind::Multiplication, factors, ctx, scope)?);
      }
      entries.push(reduce_new(NodeKind::Addition, terms, ctx, scope)?);
    }
  }
  Ok(Some(Expression::matrix(m, p, entries)?))
}

/// Scalars commute out; matrices multiply in order.
pub(super) fn multiply_matrices(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let mut scalars = Vec::new();
  let mut product: Option<Expression> = None;
  for factor in e.children() {
    if dimensions(factor).is_none() {
      scalars.push(factor);
      continue;
    }
    product = Some(match product {
      None => factor,
      Some(left) => match matrix_product(left, factor, ctx, scope)? {
        Some(result) => result,
        None => return Expression::undefined(),
      },
    });
  }
  let Some(matrix) = product else {
    return Ok(e);
  };
  if scalars.is_empty() {
    return Ok(matrix);
  }
  let (rows, columns) = dimensions(matrix).unwrap_or((0, 0));
  let mut entries = Vec::with_capacity(rows * columns);
  for entry in matrix.children() {
    let mut factors = scalars.clone();
    factors.push(entry);
    entries.push(reduce_new(NodeKind::Multiplication, factors, ctx, scope)?);
  }
  Expression::matrix(rows, columns, entries)
}

fn identity(n: usize) -> PoolResult {
  let mut entries = Vec::with_capacity(n * n);
  for i in 0..n * n {
    entries.push(Expression::integer(i64::from(i % (n + 1) == 0))?);
  }
  Expression::matrix(n, n, entries)
}

/// Non-negative integer powers of square matrices.
pub(super) fn matrix_power(
  e: Expression,
  ctx: &ReductionContext,
  scope: Scope<'_, '_>,
) -> PoolResult {
  let (base, exponent) = (e.child(0), e.child(1));
  let Some((rows, columns)) = dimensions(base) else {
    return Expression::undefined();
  };
  if dimensions(exponent).is_some() || rows != columns {
    return Expression::undefined();
  }
  let Some(k) = exponent.small_integer_value() else {
    return Ok(e);
  };
  if !(0..=MAX_MATRIX_POWER).contains(&k) {
    return Ok(e);
  }
  let mut result = identity(rows)?;
  for _ in 0..k {
    result = match matrix_product(result, base, ctx, scope)? {
      Some(product) => product,
      None => return Expression::undefined(),
    };
  }
  Ok(result)
}

#[cfg(test)]
mod tests {
  use crate::context::ReductionContext;
  use crate::pool;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn reduced(text: &str) -> String {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = crate::parse(text).unwrap();
    deep_reduce(e, &ctx, None).unwrap().to_string()
  }

  #[test]
  fn lists_distribute() {
    assert_eq!(reduced("{1,2}+1"), "{2,3}");
    assert_eq!(reduced("{1,2}*{3,4}"), "{3,8}");
    assert_eq!(reduced("{1,2}+{1,2,3}"), "undef");
  }

  #[test]
  fn matrix_arithmetic() {
    assert_eq!(reduced("[[1,2][3,4]]+[[1,0][0,1]]"), "[[2,2][3,5]]");
    assert_eq!(reduced("[[1,2][3,4]]*[[0,1][1,0]]"), "[[2,1][4,3]]");
    assert_eq!(reduced("2*[[1,2][3,4]]"), "[[2,4][6,8]]");
    assert_eq!(reduced("[[1,1][0,1]]^3"), "[[1,3][0,1]]");
    assert_eq!(reduced("[[1,2]]+[[1][2]]"), "undef");
  }

  #[test]
  fn list_functions() {
    assert_eq!(reduced("min({3,1,2})"), "1");
    assert_eq!(reduced("max({3,1/2,pi})"), "pi");
    assert_eq!(reduced("sort({3,-1,1/2})"), "{-1,1/2,3}");
    assert_eq!(reduced("sum({1,2,3})"), "6");
    assert_eq!(reduced("product({2,3,4})"), "24");
    assert_eq!(reduced("sum({})"), "0");
    assert_eq!(reduced("product({})"), "1");
    assert_eq!(reduced("min({})"), "undef");
    assert_eq!(reduced("max(3)"), "undef");
    assert_eq!(reduced("min({x,1})"), "min({x,1})");
    assert_eq!(reduced("max(l)"), "max(l)");
    assert_eq!(reduced("binomial({4,5},2)"), "{6,10}");
  }
}
