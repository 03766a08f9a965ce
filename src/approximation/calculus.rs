//! Numeric integration and differentiation of an integrand given as a
//! callback. The callback returns `None` where the integrand is undefined,
//! which makes the whole result undefined.

use super::{scalar, Scalar};
use crate::pool::PoolResult;

pub(super) type Integrand<'f, T> = dyn FnMut(T) -> PoolResult<Option<T>> + 'f;

// G7K15: 15-point Kronrod nodes on [0, 1] (the rule is symmetric), their
// weights, and the weights of the 7-point Gauss rule whose nodes are the
// even-indexed Kronrod nodes.
const KRONROD_NODES: [f64; 8] = [
  0.0,
  0.207784955007898467600689403773245,
  0.405845151377397166906606412076961,
  0.586087235467691130294144838258730,
  0.741531185599394439863864773280788,
  0.864864423359769072789712788640926,
  0.949107912342758524526189684047851,
  0.991455371120812639206854697526329,
];
const KRONROD_WEIGHTS: [f64; 8] = [
  0.209482141084727828012999174891714,
  0.204432940075298892414161999234649,
  0.190350578064785409913256402421014,
  0.169004726639267902826583426598550,
  0.140653259715525918745189590510238,
  0.104790010322250183839876322541518,
  0.063092092629978553290700663189204,
  0.022935322010529224963732008058970,
];
const GAUSS_WEIGHTS: [f64; 4] = [
  0.417959183673469387755102040816327,
  0.381830050505118944950369775488975,
  0.279705391489276667901467771423780,
  0.129484966168869693270611432679082,
];

/// Intervals split before the quadrature gives up refining.
const MAX_SUBDIVISIONS: usize = 200;

#[derive(Debug, Clone, Copy)]
struct Estimate<T> {
  value: T,
  error: T,
}

fn gauss_kronrod<T: Scalar>(
  f: &mut Integrand<'_, T>,
  a: T,
  b: T,
) -> PoolResult<Option<Estimate<T>>> {
  let two = scalar::<T>(2.0);
  let mid = (a + b) / two;
  let half_length = (b - a) / two;

  let Some(center) = f(mid)? else {
    return Ok(None);
  };
  let mut kronrod = scalar::<T>(KRONROD_WEIGHTS[0]) * center;
  let mut gauss = scalar::<T>(GAUSS_WEIGHTS[0]) * center;
  for i in 1..KRONROD_NODES.len() {
    let offset = half_length * scalar(KRONROD_NODES[i]);
    let (Some(left), Some(right)) = (f(mid - offset)?, f(mid + offset)?) else {
      return Ok(None);
    };
    let pair = left + right;
    kronrod = kronrod + scalar::<T>(KRONROD_WEIGHTS[i]) * pair;
    if i % 2 == 0 {
      gauss = gauss + scalar::<T>(GAUSS_WEIGHTS[i / 2]) * pair;
    }
  }
  Ok(Some(Estimate {
    value: kronrod * half_length,
    error: ((kronrod - gauss) * half_length).abs(),
  }))
}

/// Adaptive G7K15 quadrature of `f` over `[a, b]`.
pub(super) fn integrate<T: Scalar>(
  f: &mut Integrand<'_, T>,
  a: T,
  b: T,
) -> PoolResult<Option<T>> {
  if a == b {
    return Ok(Some(T::zero()));
  }
  let Some(whole) = gauss_kronrod(f, a, b)? else {
    return Ok(None);
  };
  let tolerance = T::epsilon() * scalar(100.0) * whole.value.abs().max(T::one());
  let width = (b - a).abs();
  let mut pending = vec![(a, b, whole)];
  let mut total = T::zero();
  let mut subdivisions = 0;
  while let Some((left, right, estimate)) = pending.pop() {
    let share = tolerance * (right - left).abs() / width;
    if estimate.error <= share || subdivisions >= MAX_SUBDIVISIONS {
      total = total + estimate.value;
      continue;
    }
    subdivisions += 1;
    let mid = (left + right) / scalar(2.0);
    let (Some(first), Some(second)) = (gauss_kronrod(f, left, mid)?, gauss_kronrod(f, mid, right)?)
    else {
      return Ok(None);
    };
    pending.push((left, mid, first));
    pending.push((mid, right, second));
  }
  Ok(total.is_finite().then_some(total))
}

/// Central difference of the given order with step `h`; its error is
/// O(h^2) for every order.
fn central_difference<T: Scalar>(
  f: &mut Integrand<'_, T>,
  x: T,
  h: T,
  order: u32,
) -> PoolResult<Option<T>> {
  let two = scalar::<T>(2.0);
  let mut at = |offset: T| f(x + offset * h);
  let value = match order {
    1 => {
      let (Some(right), Some(left)) = (at(T::one())?, at(-T::one())?) else {
        return Ok(None);
      };
      (right - left) / (two * h)
    }
    2 => {
      let (Some(right), Some(center), Some(left)) = (at(T::one())?, at(T::zero())?, at(-T::one())?)
      else {
        return Ok(None);
      };
      (right - two * center + left) / (h * h)
    }
    _ => {
      let samples = (at(two)?, at(T::one())?, at(-T::one())?, at(-two)?);
      let (Some(far_right), Some(right), Some(left), Some(far_left)) = samples else {
        return Ok(None);
      };
      (far_right - two * right + two * left - far_left) / (two * h * h * h)
    }
  };
  Ok(Some(value))
}

/// Derivative of order 1 to 3 of `f` at `x`, by Richardson extrapolation
/// of central differences over shrinking steps. Keeps the extrapolation
/// with the smallest error estimate.
pub(super) fn differentiate<T: Scalar>(
  f: &mut Integrand<'_, T>,
  x: T,
  order: u32,
) -> PoolResult<Option<T>> {
  const STEPS: usize = 10;
  if order == 0 {
    return f(x);
  }
  if order > 3 {
    return Ok(None);
  }
  let shrink = scalar::<T>(1.4);
  let shrink_squared = shrink * shrink;
  let mut h = scalar::<T>(0.1) * x.abs().max(T::one());
  let mut table: Vec<Vec<T>> = Vec::with_capacity(STEPS);
  let Some(first) = central_difference(f, x, h, order)? else {
    return Ok(None);
  };
  table.push(vec![first]);
  let mut best = first;
  let mut error = T::infinity();
  for i in 1..STEPS {
    h = h / shrink;
    let Some(estimate) = central_difference(f, x, h, order)? else {
      return Ok(None);
    };
    let mut row = vec![estimate];
    let mut factor = shrink_squared;
    for j in 1..=i {
      let extrapolated = (row[j - 1] * factor - table[i - 1][j - 1]) / (factor - T::one());
      factor = factor * shrink_squared;
      let local = (extrapolated - row[j - 1])
        .abs()
        .max((extrapolated - table[i - 1][j - 1]).abs());
      if local <= error {
        error = local;
        best = extrapolated;
      }
      row.push(extrapolated);
    }
    let diverging = (row[i] - table[i - 1][i - 1]).abs() >= scalar::<T>(2.0) * error;
    table.push(row);
    if diverging {
      break;
    }
  }
  Ok(best.is_finite().then_some(best))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * b.abs().max(1.0)
  }

  #[test]
  fn quadrature_of_smooth_functions() {
    let mut square = |x: f64| -> PoolResult<Option<f64>> { Ok(Some(x * x)) };
    let value = integrate(&mut square, 0.0, 1.0).unwrap().unwrap();
    assert!(close(value, 1.0 / 3.0, 1e-14));
    let mut sine = |x: f64| -> PoolResult<Option<f64>> { Ok(Some(x.sin())) };
    let value = integrate(&mut sine, 0.0, std::f64::consts::PI).unwrap().unwrap();
    assert!(close(value, 2.0, 1e-12));
  }

  #[test]
  fn undefined_integrand_poisons_the_integral() {
    let mut broken =
      |x: f64| -> PoolResult<Option<f64>> { Ok(if x > 0.5 { None } else { Some(x) }) };
    assert_eq!(integrate(&mut broken, 0.0, 1.0).unwrap(), None);
  }

  #[test]
  fn richardson_derivatives() {
    let mut cube = |x: f64| -> PoolResult<Option<f64>> { Ok(Some(x * x * x)) };
    let first = differentiate(&mut cube, 2.0, 1).unwrap().unwrap();
    assert!(close(first, 12.0, 1e-9));
    let second = differentiate(&mut cube, 2.0, 2).unwrap().unwrap();
    assert!(close(second, 12.0, 1e-6));
    let mut exp = |x: f64| -> PoolResult<Option<f64>> { Ok(Some(x.exp())) };
    let third = differentiate(&mut exp, 0.0, 3).unwrap().unwrap();
    assert!(close(third, 1.0, 1e-4));
  }
}
