//! Log-domain weight handling.
//!
//! Importance weights in a particle filter are likelihood products that can
//! span hundreds of orders of magnitude, so this crate computes and stores
//! them on the log scale throughout. This module contains the [`Weights`]
//! value, which converts raw log-weights into normalized weights and an
//! effective sample size (ESS) using the standard max-shift (log-sum-exp)
//! stabilization, plus the free reductions [`log_sum_exp`] and
//! [`log_mean_exp`] used wherever weight increments must be aggregated
//! without normalizing (e.g. marginal-likelihood estimation).
//!
//! `Weights` objects are immutable: [`Weights::add`] returns a *new* object.
//! The propagation engine and the history store share them freely, so
//! in-place mutation would corrupt earlier snapshots.

use crate::error::{SmcError, SmcResult};
use nalgebra::DVector;

/// A set of N log-weights together with their normalized weights and ESS.
///
/// Construction performs the max-shift normalization once; all accessors are
/// then free. Entries at exactly `-inf` normalize to exactly zero weight.
/// Construction fails with [`SmcError::AllWeightsDegenerate`] when any entry
/// is NaN or `+inf`, or when no entry is finite.
///
/// # Example
/// ```rust
/// use smc::weights::Weights;
///
/// let wgts = Weights::from_log(vec![0.0, 0.0, 0.0, 0.0]).unwrap();
/// assert!((wgts.ess() - 4.0).abs() < 1e-12);
/// assert!((wgts.normalized()[0] - 0.25).abs() < 1e-12);
/// ```
#[derive(Clone, Debug)]
pub struct Weights {
    lw: Vec<f64>,
    w: Vec<f64>,
    ess: f64,
    log_mean: f64,
}

impl Weights {
    /// Build a `Weights` object from unnormalized log-weights.
    ///
    /// # Arguments
    /// * `lw` - The N raw log-weights. May contain `-inf` (zero weight);
    ///   must not contain NaN or `+inf`.
    ///
    /// # Returns
    /// * `Ok(Weights)` with normalized weights summing to one.
    /// * `Err(SmcError::AllWeightsDegenerate)` if the input is empty, holds a
    ///   NaN or `+inf`, or has no finite entry.
    pub fn from_log(lw: Vec<f64>) -> SmcResult<Weights> {
        if lw.is_empty() {
            return Err(SmcError::AllWeightsDegenerate(
                "empty log-weight vector".to_string(),
            ));
        }
        if lw.iter().any(|v| v.is_nan() || *v == f64::INFINITY) {
            return Err(SmcError::AllWeightsDegenerate(
                "log-weights contain NaN or +inf".to_string(),
            ));
        }
        let m = lw
            .iter()
            .cloned()
            .filter(|v| v.is_finite())
            .fold(f64::NEG_INFINITY, f64::max);
        if !m.is_finite() {
            return Err(SmcError::AllWeightsDegenerate(
                "every log-weight is -inf".to_string(),
            ));
        }
        let shifted: Vec<f64> = lw.iter().map(|v| (v - m).exp()).collect();
        let total: f64 = shifted.iter().sum();
        let w: Vec<f64> = shifted.iter().map(|v| v / total).collect();
        let ess = 1.0 / w.iter().map(|v| v * v).sum::<f64>();
        let log_mean = m + (total / lw.len() as f64).ln();
        Ok(Weights {
            lw,
            w,
            ess,
            log_mean,
        })
    }

    /// Equal weights over `n` particles (log-weights all zero).
    ///
    /// This is the state of a particle system right after resampling.
    pub fn uniform(n: usize) -> Weights {
        assert!(n > 0, "Weights::uniform requires at least one particle");
        Weights {
            lw: vec![0.0; n],
            w: vec![1.0 / n as f64; n],
            ess: n as f64,
            log_mean: 0.0,
        }
    }

    /// Increment the log-weights, returning a *new* `Weights` object.
    ///
    /// # Arguments
    /// * `delta` - The N incremental log-weights to add.
    ///
    /// # Returns
    /// * A freshly normalized `Weights`, or `AllWeightsDegenerate` if the
    ///   incremented vector can no longer be normalized (total collapse).
    pub fn add(&self, delta: &[f64]) -> SmcResult<Weights> {
        assert_eq!(
            delta.len(),
            self.lw.len(),
            "incremental log-weights must match the particle count"
        );
        let lw: Vec<f64> = self
            .lw
            .iter()
            .zip(delta.iter())
            .map(|(a, b)| a + b)
            .collect();
        Weights::from_log(lw)
    }

    /// The raw (unnormalized) log-weights.
    pub fn log_weights(&self) -> &[f64] {
        &self.lw
    }

    /// The normalized weights (sum to one within floating tolerance).
    pub fn normalized(&self) -> &[f64] {
        &self.w
    }

    /// Effective sample size, `1 / sum(W_i^2)`, in `[1, N]`.
    ///
    /// Equals N iff the weights are uniform, and 1 iff the whole weight mass
    /// sits on a single particle.
    pub fn ess(&self) -> f64 {
        self.ess
    }

    /// `log(mean(exp(lw)))` of the raw log-weights.
    ///
    /// This is the per-step quantity the propagation engine accumulates into
    /// the marginal-likelihood estimate.
    pub fn log_mean(&self) -> f64 {
        self.log_mean
    }

    pub fn len(&self) -> usize {
        self.lw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lw.is_empty()
    }
}

/// Log of the sum of the exponentials, `log(sum(exp(v)))`.
///
/// Uses the max-shift trick: subtract the max before exponentiating, add it
/// back afterwards, so inputs around -1000 do not underflow to zero.
///
/// # Arguments
/// * `v` - Log-domain values; may contain `-inf`, must not contain NaN/`+inf`.
///
/// # Returns
/// * `Ok(log(sum(exp(v))))`, or `AllWeightsDegenerate` on degenerate input.
///
/// # Example
/// ```rust
/// use smc::weights::log_sum_exp;
///
/// let v = vec![0.0, 0.0];
/// assert!((log_sum_exp(&v).unwrap() - 2.0_f64.ln()).abs() < 1e-12);
/// ```
pub fn log_sum_exp(v: &[f64]) -> SmcResult<f64> {
    let (m, total) = shifted_sum(v)?;
    Ok(m + total.ln())
}

/// Log of the mean of the exponentials, `log(mean(exp(v)))`.
///
/// Same shift-and-rescale technique and the same degenerate-input failure as
/// [`log_sum_exp`].
pub fn log_mean_exp(v: &[f64]) -> SmcResult<f64> {
    let (m, total) = shifted_sum(v)?;
    Ok(m + (total / v.len() as f64).ln())
}

/// `log(exp(a) + exp(b))` for two scalars, without building a vector.
pub fn log_sum_exp_ab(a: f64, b: f64) -> f64 {
    if a > b {
        a + (b - a).exp().ln_1p()
    } else {
        b + (a - b).exp().ln_1p()
    }
}

fn shifted_sum(v: &[f64]) -> SmcResult<(f64, f64)> {
    if v.is_empty() {
        return Err(SmcError::AllWeightsDegenerate(
            "empty log-domain vector".to_string(),
        ));
    }
    if v.iter().any(|x| x.is_nan() || *x == f64::INFINITY) {
        return Err(SmcError::AllWeightsDegenerate(
            "log-domain vector contains NaN or +inf".to_string(),
        ));
    }
    let m = v
        .iter()
        .cloned()
        .filter(|x| x.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);
    if !m.is_finite() {
        return Err(SmcError::AllWeightsDegenerate(
            "every entry is -inf".to_string(),
        ));
    }
    let total: f64 = v.iter().map(|x| (x - m).exp()).sum();
    Ok((m, total))
}

/// Component-wise weighted mean and variance of a set of vectors.
///
/// # Arguments
/// * `weights` - N normalized weights (>= 0, sum to one).
/// * `xs` - N vectors of equal dimension.
///
/// # Returns
/// * `(mean, var)` as a pair of vectors of that dimension.
pub fn wmean_and_var(weights: &[f64], xs: &[DVector<f64>]) -> (DVector<f64>, DVector<f64>) {
    assert_eq!(weights.len(), xs.len(), "one weight per vector");
    assert!(!xs.is_empty(), "wmean_and_var requires at least one vector");
    let dim = xs[0].len();
    let mut mean = DVector::<f64>::zeros(dim);
    let mut mean_sq = DVector::<f64>::zeros(dim);
    for (x, &w) in xs.iter().zip(weights.iter()) {
        assert_eq!(x.len(), dim, "all vectors must share one dimension");
        mean += w * x;
        mean_sq += w * x.component_mul(x);
    }
    let var = mean_sq - mean.component_mul(&mean);
    (mean, var)
}
