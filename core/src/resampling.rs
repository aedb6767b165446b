//! Resampling schemes and the numerical primitives they share.
//!
//! All fixed-size schemes are implemented as functions with the signature
//! `scheme(weights, m, rng) -> SmcResult<Vec<usize>>`, where `weights` is a
//! vector of N normalized weights, `m` the number of resampled indices to
//! produce (usually N), and the output the `m` ancestor indices in
//! `0..N`. Every scheme is unbiased (the expected offspring count of
//! particle `i` is `m * weights[i]`) and produces exactly `m` indices; the
//! one exception is [`killing_resample`], whose output may be shorter than
//! N because dead particles are not replaced.
//!
//! Schemes differ in variance. Systematic introduces the least noise of the
//! standard schemes and is the default; multinomial introduces the most and
//! is mostly of historical/diagnostic interest; SSP allocates every particle
//! either `floor(m*W_i)` or `ceil(m*W_i)` offspring and undercuts stratified.
//!
//! The shared primitive is [`inverse_cdf`]: both the uniform variates and
//! the cumulative weights are non-decreasing, so one two-pointer merge maps
//! all `m` variates to indices in O(N + m) instead of `m` binary searches.

use crate::error::{SmcError, SmcResult};
use rand::Rng;
use rand_distr::Exp1;
use serde::{Deserialize, Serialize};

/// Tolerance on |sum(weights) - 1| accepted by [`validate_weights`].
///
/// Comfortable bound for f64 summation error over particle counts up to
/// about 1e7.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-8;

/// Check that `weights` is a valid normalized probability vector.
///
/// # Arguments
/// * `weights` - Candidate probability vector.
///
/// # Returns
/// * `Ok(())`, or `InvalidWeights` when the vector is empty, contains a
///   negative/NaN/infinite entry, or its sum deviates from one by more than
///   [`WEIGHT_SUM_TOLERANCE`].
pub fn validate_weights(weights: &[f64]) -> SmcResult<()> {
    if weights.is_empty() {
        return Err(SmcError::InvalidWeights("empty weight vector".to_string()));
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(SmcError::InvalidWeights(
            "weights must be finite and non-negative".to_string(),
        ));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(SmcError::InvalidWeights(format!(
            "weights sum to {} (expected 1 within {:e})",
            sum, WEIGHT_SUM_TOLERANCE
        )));
    }
    Ok(())
}

/// Inverse CDF algorithm for a finite distribution.
///
/// Maps each sorted uniform variate to the smallest index whose cumulative
/// weight reaches it, with a single linear merge over both arrays.
///
/// # Arguments
/// * `su` - M sorted uniform variates (ascending points in [0, 1)).
/// * `weights` - N normalized weights (>= 0, sum to one).
///
/// # Returns
/// * The M indices in `0..N`.
///
/// Variates at exactly 0 land on the first index with positive weight, and
/// variates approaching 1 land on index N-1 (the cursor never runs past the
/// end, so cumulative round-off cannot produce an out-of-range index).
/// Interior zero-weight entries are stepped over and never selected.
///
/// # Example
/// ```rust
/// use smc::resampling::inverse_cdf;
///
/// let indices = inverse_cdf(&[0.1, 0.3, 0.6, 0.95], &[0.2, 0.3, 0.5]);
/// assert_eq!(indices, vec![0, 1, 2, 2]);
/// ```
pub fn inverse_cdf(su: &[f64], weights: &[f64]) -> Vec<usize> {
    let n = weights.len();
    assert!(n > 0, "inverse_cdf requires a non-empty weight vector");
    let mut j = 0usize;
    while j + 1 < n && weights[j] <= 0.0 {
        j += 1;
    }
    let mut cum = weights[j];
    let mut indices = Vec::with_capacity(su.len());
    for &u in su {
        while u > cum && j + 1 < n {
            j += 1;
            cum += weights[j];
        }
        indices.push(j);
    }
    indices
}

/// Generate `m` ordered uniform variates in O(m) time.
///
/// Normalized cumulative sums of m+1 exponential variates are distributed as
/// the order statistics of m uniforms, which avoids the O(m log m) sort.
pub fn uniform_spacings<R: Rng + ?Sized>(m: usize, rng: &mut R) -> Vec<f64> {
    let mut cum = Vec::with_capacity(m + 1);
    let mut z = 0.0f64;
    for _ in 0..=m {
        z += rng.sample::<f64, _>(Exp1);
        cum.push(z);
    }
    let total = cum[m];
    cum.truncate(m);
    cum.iter().map(|v| v / total).collect()
}

/// Stratified order statistics: `(i + v_i) / m` with one independent jitter
/// per stratum. Sorted by construction.
pub fn stratified_spacings<R: Rng + ?Sized>(m: usize, rng: &mut R) -> Vec<f64> {
    (0..m)
        .map(|i| (i as f64 + rng.random::<f64>()) / m as f64)
        .collect()
}

/// Systematic order statistics: `(i + v) / m` with a single shared jitter.
/// Fully correlated, lowest-variance input of the standard schemes.
pub fn systematic_spacings<R: Rng + ?Sized>(m: usize, rng: &mut R) -> Vec<f64> {
    let v = rng.random::<f64>();
    (0..m).map(|i| (i as f64 + v) / m as f64).collect()
}

/// Sample once from the discrete distribution that generates `i` with
/// probability `weights[i]`.
pub fn multinomial_once<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> SmcResult<usize> {
    validate_weights(weights)?;
    let u = rng.random::<f64>();
    Ok(inverse_cdf(&[u], weights)[0])
}

/// Multinomial resampling: `m` iid categorical draws, produced by feeding
/// ordered uniforms through the inverse CDF.
pub fn multinomial_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    Ok(inverse_cdf(&uniform_spacings(m, rng), weights))
}

/// Stratified resampling.
pub fn stratified_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    Ok(inverse_cdf(&stratified_spacings(m, rng), weights))
}

/// Systematic resampling. Deterministic given a single uniform draw.
pub fn systematic_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    Ok(inverse_cdf(&systematic_spacings(m, rng), weights))
}

/// Residual resampling.
///
/// Each particle `i` first receives `floor(m * W_i)` guaranteed copies; the
/// remaining slots are filled by multinomial resampling on the renormalized
/// fractional parts. Strictly lower variance than plain multinomial.
pub fn residual_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    let mut indices = Vec::with_capacity(m);
    let mut residuals = Vec::with_capacity(weights.len());
    for (i, &w) in weights.iter().enumerate() {
        let scaled = w * m as f64;
        let copies = scaled.floor() as usize;
        for _ in 0..copies {
            indices.push(i);
        }
        residuals.push(scaled - copies as f64);
    }
    let remainder = m - indices.len();
    if remainder > 0 {
        let total: f64 = residuals.iter().sum();
        for r in residuals.iter_mut() {
            *r /= total;
        }
        indices.extend(inverse_cdf(&uniform_spacings(remainder, rng), &residuals));
    }
    Ok(indices)
}

/// SSP (Srinivasan Sampling Process) resampling.
///
/// A single O(N) sweep over the fractional parts of `m * W_i` that gives
/// every particle either `floor(m * W_i)` or `ceil(m * W_i)` offspring while
/// staying unbiased; its variance undercuts stratified resampling. At each
/// step two open slots `i < j` trade fractional mass until one of them
/// resolves to an integer; ties advance in index order.
pub fn ssp_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    let n = weights.len();
    let mut offspring: Vec<usize> = Vec::with_capacity(n);
    let mut xi: Vec<f64> = Vec::with_capacity(n);
    for &w in weights {
        let scaled = w * m as f64;
        let fl = scaled.floor();
        offspring.push(fl as usize);
        xi.push(scaled - fl);
    }
    if n > 1 {
        let mut i = 0usize;
        let mut j = 1usize;
        for k in 0..n - 1 {
            let mut delta_i = xi[j].min(1.0 - xi[i]);
            let delta_j = xi[i].min(1.0 - xi[j]);
            let sum_delta = delta_i + delta_j;
            // probability that xi[i] grows and xi[j] shrinks
            let pj = if sum_delta > 0.0 {
                delta_i / sum_delta
            } else {
                0.0
            };
            if rng.random::<f64>() < pj {
                // swap so that the growing slot is always i
                std::mem::swap(&mut i, &mut j);
                delta_i = delta_j;
            }
            if xi[j] < 1.0 - xi[i] {
                xi[i] += delta_i;
                j = k + 2;
            } else {
                xi[j] -= delta_i;
                offspring[i] += 1;
                i = k + 2;
            }
        }
        // round-off accumulation can leave one copy unassigned; the last
        // open slot absorbs it when its fractional part is essentially one
        if offspring.iter().sum::<usize>() == m - 1 {
            let last = if j == n { i } else { j };
            if xi[last] > 0.99 {
                offspring[last] += 1;
            }
        }
    }
    let total: usize = offspring.iter().sum();
    if total != m {
        return Err(SmcError::InvalidWeights(format!(
            "ssp resampling assigned {} offspring instead of {}",
            total, m
        )));
    }
    let mut indices = Vec::with_capacity(m);
    for (i, &count) in offspring.iter().enumerate() {
        for _ in 0..count {
            indices.push(i);
        }
    }
    Ok(indices)
}

/// Killing resampling.
///
/// Each particle independently survives with probability `min(1, N * W_i)`;
/// dead particles are *not* replaced, so the output may hold fewer than N
/// indices. This breaks the fixed-size contract of the other schemes and is
/// meant for SMC-sampler contexts whose callers manage the population size
/// themselves; [`crate::filter::SmcConfig::validate`] rejects it for the
/// fixed-N propagation loop.
pub fn killing_resample<R: Rng + ?Sized>(
    weights: &[f64],
    m: usize,
    rng: &mut R,
) -> SmcResult<Vec<usize>> {
    validate_weights(weights)?;
    let n = weights.len();
    if m != n {
        return Err(SmcError::InvalidWeights(
            "killing resampling is defined only for M = N".to_string(),
        ));
    }
    let mut survivors = Vec::with_capacity(n);
    for (i, &w) in weights.iter().enumerate() {
        let p = (n as f64 * w).min(1.0);
        if rng.random::<f64>() < p {
            survivors.push(i);
        }
    }
    Ok(survivors)
}

/// The available resampling schemes, dispatched through [`resample`].
///
/// A closed set of variants rather than open-ended dynamic dispatch: schemes
/// stay interchangeable, and configuration files / CLI flags name them
/// directly.
///
/// [`resample`]: ResamplingScheme::resample
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingScheme {
    Multinomial,
    Residual,
    Stratified,
    Systematic,
    Ssp,
    Killing,
}

impl Default for ResamplingScheme {
    fn default() -> Self {
        ResamplingScheme::Systematic
    }
}

impl ResamplingScheme {
    /// Draw `m` ancestor indices from `weights` with this scheme.
    ///
    /// The output has length `m` for every scheme except `Killing`, which
    /// may return fewer indices (see [`killing_resample`]).
    pub fn resample<R: Rng + ?Sized>(
        &self,
        weights: &[f64],
        m: usize,
        rng: &mut R,
    ) -> SmcResult<Vec<usize>> {
        match self {
            ResamplingScheme::Multinomial => multinomial_resample(weights, m, rng),
            ResamplingScheme::Residual => residual_resample(weights, m, rng),
            ResamplingScheme::Stratified => stratified_resample(weights, m, rng),
            ResamplingScheme::Systematic => systematic_resample(weights, m, rng),
            ResamplingScheme::Ssp => ssp_resample(weights, m, rng),
            ResamplingScheme::Killing => killing_resample(weights, m, rng),
        }
    }
}
