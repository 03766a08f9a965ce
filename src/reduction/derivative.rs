use crate::context::ReductionContext;
use crate::expression::{
  Constant, Expression, NodeKind, TrigonometricFunction,
};
use crate::matcher;
use crate::pool::{self, PoolResult};

fn integer(n: i64) -> PoolResult {
  Expression::integer(n)
}

fn product(factors: Vec<Expression>) -> PoolResult {
  Expression::multiplication(factors)
}

fn inverse(e: Expression) -> PoolResult {
  Expression::power(e, integer(-1)?)
}

fn ln(e: Expression) -> PoolResult {
  Expression::logarithm(e, Expression::constant(Constant::E)?)
}

/// d(angle in radians)/d(angle in the active unit).
fn angle_factor(ctx: &ReductionContext) -> PoolResult {
  match ctx.angle_unit.half_turn() {
    None => integer(1),
    Some(half_turn) => product(vec![
      Expression::constant(Constant::Pi)?,
      Expression::fraction(1, half_turn)?,
    ]),
  }
}

/// The derivative of `e` with respect to `var`, unreduced, or `None` when
/// `e` has a node the rules do not cover.
pub fn derive(
  e: Expression,
  var: &str,
  ctx: &ReductionContext,
) -> PoolResult<Option<Expression>> {
  pool::tick()?;
  if !matcher::contains_free_symbol(e, var)? {
    return Ok(Some(integer(0)?));
  }
  let children = e.children();
  let derived = match e.kind() {
    NodeKind::Symbol(_) => integer(1)?,
    NodeKind::Dependency => return derive(children[0], var, ctx),
    NodeKind::Addition => {
      // d/dx[a + b] = d/dx[a] + d/dx[b]
      let mut terms = Vec::with_capacity(children.len());
      for term in &children {
        let Some(d) = derive(*term, var, ctx)? else {
          return Ok(None);
        };
        terms.push(d);
      }
      Expression::addition(terms)?
    }
    NodeKind::Multiplication => {
      // Product rule, one term per factor
      let mut terms = Vec::with_capacity(children.len());
      for (i, factor) in children.iter().enumerate() {
        let Some(d) = derive(*factor, var, ctx)? else {
          return Ok(None);
        };
        let mut factors = children.clone();
        factors[i] = d;
        terms.push(product(factors)?);
      }
      Expression::addition(terms)?
    }
    NodeKind::Power => {
      let (base, exponent) = (children[0], children[1]);
      if !matcher::contains_free_symbol(exponent, var)? {
        // Power rule: d/dx[u^n] = n * u^(n-1) * u'
        let Some(d) = derive(base, var, ctx)? else {
          return Ok(None);
        };
        let lowered = Expression::addition(vec![exponent, integer(-1)?])?;
        product(vec![exponent, Expression::power(base, lowered)?, d])?
      } else {
        // d/dx[u^v] = u^v * (v' * ln(u) + v * u' / u)
        let (Some(du), Some(dv)) = (derive(base, var, ctx)?, derive(exponent, var, ctx)?)
        else {
          return Ok(None);
        };
        let first = product(vec![dv, ln(base)?])?;
        let second = product(vec![exponent, du, inverse(base)?])?;
        product(vec![e, Expression::addition(vec![first, second])?])?
      }
    }
    NodeKind::Logarithm => {
      let (argument, base) = (children[0], children[1]);
      if matcher::contains_free_symbol(base, var)? {
        return Ok(None);
      }
      // d/dx[log_b(u)] = u' / (u * ln(b))
      let Some(d) = derive(argument, var, ctx)? else {
        return Ok(None);
      };
      product(vec![d, inverse(product(vec![argument, ln(base)?])?)?])?
    }
    NodeKind::Trigonometry(f) => {
      let u = children[0];
      let Some(d) = derive(u, var, ctx)? else {
        return Ok(None);
      };
      let k = angle_factor(ctx)?;
      let square = Expression::power(u, integer(2)?)?;
      match f {
        TrigonometricFunction::Sine => product(vec![
          k,
          Expression::trigonometry(TrigonometricFunction::Cosine, u)?,
          d,
        ])?,
        TrigonometricFunction::Cosine => product(vec![
          integer(-1)?,
          k,
          Expression::trigonometry(TrigonometricFunction::Sine, u)?,
          d,
        ])?,
        TrigonometricFunction::Tangent => {
          let cosine = Expression::trigonometry(TrigonometricFunction::Cosine, u)?;
          product(vec![k, d, Expression::power(cosine, integer(-2)?)?])?
        }
        TrigonometricFunction::ArcSine | TrigonometricFunction::ArcCosine => {
          // d/dx[asin(u)] = u' / sqrt(1 - u^2)
          let sign = if f == TrigonometricFunction::ArcSine { 1 } else { -1 };
          let radicand = Expression::subtraction(integer(1)?, square)?;
          let root = Expression::power(radicand, Expression::fraction(-1, 2)?)?;
          product(vec![integer(sign)?, d, root, inverse(k)?])?
        }
        TrigonometricFunction::ArcTangent => {
          let denominator = Expression::addition(vec![integer(1)?, square])?;
          product(vec![d, inverse(denominator)?, inverse(k)?])?
        }
      }
    }
    _ => return Ok(None),
  };
  Ok(Some(derived))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::reduction::deep_reduce;
  use crate::symbols::SymbolStore;

  fn derived(text: &str) -> Option<String> {
    pool::clear_pool();
    let store = SymbolStore::new();
    let ctx = ReductionContext::new(&store);
    let e = deep_reduce(crate::parse(text).unwrap(), &ctx, None).unwrap();
    derive(e, "x", &ctx)
      .unwrap()
      .map(|d| deep_reduce(d, &ctx, None).unwrap().to_string())
  }

  #[test]
  fn polynomial_rules() {
    assert_eq!(derived("x^2+3*x").as_deref(), Some("3+2*x"));
    assert_eq!(derived("y").as_deref(), Some("0"));
  }

  #[test]
  fn uncovered_nodes_are_reported() {
    assert_eq!(derived("floor(x)"), None);
  }
}
