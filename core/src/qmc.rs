//! Low-discrepancy sequences for the quasi-Monte Carlo mode.
//!
//! The SQMC variant replaces the iid uniforms that drive resampling and
//! propagation with points from a low-discrepancy sequence. This module
//! provides Halton points (a van der Corput radical inverse per prime base)
//! and their Cranley-Patterson randomization: a uniform shift per dimension,
//! taken mod 1, which preserves the low discrepancy while making the point
//! set an unbiased randomized-QMC input.

use crate::error::{SmcError, SmcResult};
use nalgebra::DVector;
use rand::Rng;

/// Prime bases for the Halton components; caps the supported dimension.
const PRIMES: [u64; 25] = [
    2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 59, 61, 67, 71, 73, 79, 83, 89, 97,
];

/// Maximum dimension supported by [`halton`] and [`randomized_halton`].
pub const MAX_DIM: usize = PRIMES.len();

/// Radical inverse of `n` in the given base: mirror the base-b digits of `n`
/// around the radix point.
fn radical_inverse(mut n: u64, base: u64) -> f64 {
    let b = base as f64;
    let mut inv = 1.0 / b;
    let mut r = 0.0;
    while n > 0 {
        r += (n % base) as f64 * inv;
        n /= base;
        inv /= b;
    }
    r
}

/// First `n` points of the `dim`-dimensional Halton sequence.
///
/// Component `j` of point `i` is the radical inverse of `i + 1` in the
/// `j`-th prime base (the all-zero point at index 0 is skipped).
///
/// # Arguments
/// * `n` - Number of points.
/// * `dim` - Dimension, at most [`MAX_DIM`].
///
/// # Returns
/// * `n` points in `[0, 1)^dim`, or `DimensionMismatch` for an unsupported
///   dimension.
pub fn halton(n: usize, dim: usize) -> SmcResult<Vec<DVector<f64>>> {
    if dim == 0 || dim > MAX_DIM {
        return Err(SmcError::DimensionMismatch(format!(
            "halton sequence supports dimensions 1..={}, got {}",
            MAX_DIM, dim
        )));
    }
    let points = (0..n)
        .map(|i| {
            DVector::from_iterator(
                dim,
                PRIMES[..dim]
                    .iter()
                    .map(|&b| radical_inverse(i as u64 + 1, b)),
            )
        })
        .collect();
    Ok(points)
}

/// Randomized Halton points (Cranley-Patterson rotation).
///
/// Each dimension receives one uniform shift; every point's component is
/// translated by it mod 1. Same low discrepancy as [`halton`], but the
/// marginal distribution of every point is exactly uniform.
pub fn randomized_halton<R: Rng + ?Sized>(
    n: usize,
    dim: usize,
    rng: &mut R,
) -> SmcResult<Vec<DVector<f64>>> {
    let mut points = halton(n, dim)?;
    let shifts: Vec<f64> = (0..dim).map(|_| rng.random::<f64>()).collect();
    for p in points.iter_mut() {
        for (j, v) in p.iter_mut().enumerate() {
            let shifted = *v + shifts[j];
            *v = shifted - shifted.floor();
            // guard against round-up to exactly 1.0
            if *v >= 1.0 {
                *v = 0.0;
            }
        }
    }
    Ok(points)
}
