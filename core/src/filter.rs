//! The particle propagation engine.
//!
//! This module contains the generic particle-filter loop: propose particles
//! through a user-supplied [`FeynmanKac`] model, weight them in the log
//! domain, resample adaptively when the effective sample size degrades, and
//! record ancestor indices and particle snapshots for later offline
//! smoothing. The loop itself is model-agnostic; anything specific to a
//! state-space model (how a state is proposed, how a likelihood is
//! evaluated) lives behind the `FeynmanKac` trait.
//!
//! The loop is single-threaded and sequential by construction: each step's
//! propose/weight/resample stage depends on the previous step's resampled
//! particle set. Within one step the per-particle model computations are
//! independent and a model implementation may parallelize them internally,
//! as long as the returned arrays are in particle order.
//!
//! Randomness is supplied by a per-run `StdRng` seeded from the
//! configuration; there is no global entropy source, so a run is exactly
//! reproducible from its seed.

use crate::collectors::{Collector, Summaries};
use crate::error::{SmcError, SmcResult};
use crate::hilbert;
use crate::history::{History, HistoryStep};
use crate::qmc;
use crate::resampling::{self, ResamplingScheme};
use crate::weights::Weights;

use nalgebra::DVector;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// A Feynman-Kac model: the two capabilities a particle filter needs from
/// the caller, plus optional deterministic maps for the quasi-Monte Carlo
/// mode.
///
/// The propagation engine treats particle states as opaque payloads; only
/// the model knows their structure. Implementations must produce exactly N
/// outputs for N inputs, in particle order.
pub trait FeynmanKac {
    /// The particle state. Cloned on resampling, so keep it cheap to copy.
    type State: Clone;

    /// Number of time steps in the run.
    fn time_horizon(&self) -> usize;

    /// Sample N particles from the initial distribution.
    fn sample_initial(&self, n: usize, rng: &mut StdRng) -> SmcResult<Vec<Self::State>>;

    /// Generate N particles at time `t >= 1` from their ancestors.
    fn propose(
        &self,
        t: usize,
        ancestors: &[Self::State],
        rng: &mut StdRng,
    ) -> SmcResult<Vec<Self::State>>;

    /// Log-weight increments at time `t`. At `t = 0` the `ancestors` slice
    /// is empty.
    fn log_weight_increment(
        &self,
        t: usize,
        ancestors: &[Self::State],
        particles: &[Self::State],
    ) -> SmcResult<Vec<f64>>;

    /// State dimension, used to size the low-discrepancy point sets in QMC
    /// mode.
    fn dim(&self) -> usize {
        1
    }

    /// Deterministic map from a uniform `dim()`-vector to an initial state
    /// (QMC mode only).
    fn from_uniform_initial(&self, _u: &DVector<f64>) -> SmcResult<Self::State> {
        Err(SmcError::ModelFailure(
            "model does not implement the SQMC initial map".to_string(),
        ))
    }

    /// Deterministic map from an ancestor and a uniform `dim()`-vector to a
    /// proposed state (QMC mode only).
    fn from_uniform(
        &self,
        _t: usize,
        _ancestor: &Self::State,
        _u: &DVector<f64>,
    ) -> SmcResult<Self::State> {
        Err(SmcError::ModelFailure(
            "model does not implement the SQMC transition map".to_string(),
        ))
    }

    /// Numeric coordinates of each particle, used for Hilbert ordering in
    /// QMC mode.
    fn coordinates(&self, _particles: &[Self::State]) -> SmcResult<Vec<DVector<f64>>> {
        Err(SmcError::ModelFailure(
            "model does not expose particle coordinates for SQMC".to_string(),
        ))
    }
}

/// Run configuration for the propagation engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SmcConfig {
    /// Particle count N, fixed for the whole run.
    pub num_particles: usize,
    /// Resampling scheme invoked when the adaptive policy fires.
    pub resampling_scheme: ResamplingScheme,
    /// Resample whenever `ESS < ess_threshold * N`. A fraction in (0, 1]:
    /// 1.0 resamples at every step with non-uniform weights, and values at
    /// or below 1/N effectively never resample — both are degenerate
    /// settings of the same policy.
    pub ess_threshold: f64,
    /// Use the sequential quasi-Monte Carlo variant (requires the model's
    /// SQMC maps; resampling then always fires and `resampling_scheme` is
    /// ignored).
    pub use_qmc: bool,
    /// Seed for the per-run random generator.
    pub seed: u64,
    /// Record every step into a [`History`] for offline smoothing.
    pub store_history: bool,
}

impl Default for SmcConfig {
    fn default() -> Self {
        Self {
            num_particles: 100,
            resampling_scheme: ResamplingScheme::Systematic,
            ess_threshold: 0.5,
            use_qmc: false,
            seed: 42,
            store_history: false,
        }
    }
}

impl SmcConfig {
    /// Reject configurations the fixed-N loop cannot honor.
    pub fn validate(&self) -> SmcResult<()> {
        if self.num_particles == 0 {
            return Err(SmcError::Config(
                "num_particles must be at least 1".to_string(),
            ));
        }
        if !(self.ess_threshold > 0.0 && self.ess_threshold <= 1.0) {
            return Err(SmcError::Config(format!(
                "ess_threshold must lie in (0, 1], got {}",
                self.ess_threshold
            )));
        }
        if self.resampling_scheme == ResamplingScheme::Killing {
            return Err(SmcError::Config(
                "killing resampling leaves the particle count variable and cannot drive \
                 the fixed-N loop; call killing_resample directly"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifecycle of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Ready,
    Running,
    Done,
    Failed,
}

/// A particle-filter run.
///
/// Owns the particle set, the log-domain weights, the per-run random
/// generator, and (optionally) the full history. Drive it with [`step`] or
/// [`run`]; any error fails the whole run (the step in progress commits
/// nothing) and is surfaced with its time index.
///
/// [`step`]: Smc::step
/// [`run`]: Smc::run
pub struct Smc<F: FeynmanKac> {
    fk: F,
    config: SmcConfig,
    rng: StdRng,
    state: RunState,
    t: usize,
    particles: Vec<F::State>,
    prior_particles: Vec<F::State>,
    ancestors: Option<Vec<usize>>,
    weights: Weights,
    resampled_last: bool,
    log_likelihood: f64,
    step_log_likelihood: f64,
    prev_log_mean: f64,
    history: Option<History<F::State>>,
    summaries: Summaries,
    collectors: Vec<Box<dyn Collector<F::State>>>,
}

impl<F: FeynmanKac> Smc<F> {
    /// Create a run in the `Ready` state.
    ///
    /// # Arguments
    /// * `fk` - The Feynman-Kac model to filter.
    /// * `config` - Run options; validated here.
    pub fn new(fk: F, config: SmcConfig) -> SmcResult<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        let history = config.store_history.then(History::new);
        let weights = Weights::uniform(config.num_particles);
        Ok(Smc {
            fk,
            config,
            rng,
            state: RunState::Ready,
            t: 0,
            particles: Vec::new(),
            prior_particles: Vec::new(),
            ancestors: None,
            weights,
            resampled_last: false,
            log_likelihood: 0.0,
            step_log_likelihood: 0.0,
            prev_log_mean: 0.0,
            history,
            summaries: Summaries::default(),
            collectors: Vec::new(),
        })
    }

    /// Register a per-step collector hook.
    pub fn add_collector(&mut self, collector: Box<dyn Collector<F::State>>) {
        self.collectors.push(collector);
    }

    /// Advance the run by one time step.
    ///
    /// # Returns
    /// * `Ok(true)` if a step was completed, `Ok(false)` if the run was
    ///   already done.
    /// * `Err` if the step failed; the run transitions to `Failed`, nothing
    ///   from the failed step is recorded, and the error carries the time
    ///   index.
    pub fn step(&mut self) -> SmcResult<bool> {
        match self.state {
            RunState::Done => return Ok(false),
            RunState::Failed => {
                return Err(SmcError::Config(
                    "run already failed; failed runs are not resumable".to_string(),
                ));
            }
            RunState::Ready | RunState::Running => {}
        }
        if self.t >= self.fk.time_horizon() {
            self.state = RunState::Done;
            return Ok(false);
        }
        self.state = RunState::Running;
        match self.advance() {
            Ok(()) => {
                if self.t >= self.fk.time_horizon() {
                    self.state = RunState::Done;
                }
                Ok(true)
            }
            Err(err) => {
                self.state = RunState::Failed;
                let err = err.at_time(self.t);
                log::warn!("smc run failed: {}", err);
                Err(err)
            }
        }
    }

    /// Run until the time horizon is exhausted.
    pub fn run(&mut self) -> SmcResult<()> {
        while self.step()? {}
        Ok(())
    }

    fn advance(&mut self) -> SmcResult<()> {
        if self.t == 0 {
            self.generate_particles()?;
        } else if self.config.use_qmc {
            self.resample_move_qmc()?;
        } else {
            self.resample_move()?;
        }
        self.reweight()?;
        self.record();
        self.t += 1;
        Ok(())
    }

    fn generate_particles(&mut self) -> SmcResult<()> {
        let n = self.config.num_particles;
        self.resampled_last = false;
        self.ancestors = None;
        self.prior_particles.clear();
        self.particles = if self.config.use_qmc {
            let us = qmc::randomized_halton(n, self.fk.dim(), &mut self.rng)?;
            us.iter()
                .map(|u| self.fk.from_uniform_initial(u))
                .collect::<SmcResult<Vec<_>>>()?
        } else {
            self.fk.sample_initial(n, &mut self.rng)?
        };
        self.check_particle_count("initial particles", self.particles.len())?;
        self.weights = Weights::uniform(n);
        Ok(())
    }

    /// Adaptive resampling, then propagation through the model kernel.
    fn resample_move(&mut self) -> SmcResult<()> {
        let n = self.config.num_particles;
        let ess = self.weights.ess();
        self.resampled_last = ess < self.config.ess_threshold * n as f64;
        if self.resampled_last {
            let ancestors = self.config.resampling_scheme.resample(
                self.weights.normalized(),
                n,
                &mut self.rng,
            )?;
            self.prior_particles = ancestors
                .iter()
                .map(|&i| self.particles[i].clone())
                .collect();
            self.ancestors = Some(ancestors);
            self.weights = Weights::uniform(n);
        } else {
            self.ancestors = None;
            self.prior_particles = std::mem::take(&mut self.particles);
        }
        self.particles = self
            .fk
            .propose(self.t, &self.prior_particles, &mut self.rng)?;
        self.check_particle_count("proposed particles", self.particles.len())
    }

    /// SQMC step: always resamples, driven by one randomized Halton point
    /// set. The particles are placed in Hilbert order so that the sorted
    /// first coordinate of the point set maps through the inverse CDF of
    /// the reordered weights; the remaining coordinates propagate each
    /// offspring deterministically.
    fn resample_move_qmc(&mut self) -> SmcResult<()> {
        let n = self.config.num_particles;
        let d = self.fk.dim();
        self.resampled_last = true;
        let us = qmc::randomized_halton(n, d + 1, &mut self.rng)?;
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| us[a][0].total_cmp(&us[b][0]));
        let coords = self.fk.coordinates(&self.particles)?;
        self.check_particle_count("particle coordinates", coords.len())?;
        let h_order = hilbert::hilbert_sort(&coords)?;
        let w = self.weights.normalized();
        let w_h: Vec<f64> = h_order.iter().map(|&i| w[i]).collect();
        let su: Vec<f64> = order.iter().map(|&i| us[i][0]).collect();
        let picks = resampling::inverse_cdf(&su, &w_h);
        let ancestors: Vec<usize> = picks.iter().map(|&k| h_order[k]).collect();
        self.prior_particles = ancestors
            .iter()
            .map(|&i| self.particles[i].clone())
            .collect();
        let mut proposed = Vec::with_capacity(n);
        for (k, &row) in order.iter().enumerate() {
            let v = DVector::from_iterator(d, (1..=d).map(|c| us[row][c]));
            proposed.push(self.fk.from_uniform(self.t, &self.prior_particles[k], &v)?);
        }
        self.particles = proposed;
        self.ancestors = Some(ancestors);
        self.weights = Weights::uniform(n);
        Ok(())
    }

    fn reweight(&mut self) -> SmcResult<()> {
        let increments =
            self.fk
                .log_weight_increment(self.t, &self.prior_particles, &self.particles)?;
        self.check_particle_count("weight increments", increments.len())?;
        self.weights = self.weights.add(&increments)?;
        let log_mean = self.weights.log_mean();
        self.step_log_likelihood = if self.t == 0 || self.resampled_last {
            log_mean
        } else {
            log_mean - self.prev_log_mean
        };
        self.log_likelihood += self.step_log_likelihood;
        self.prev_log_mean = log_mean;
        Ok(())
    }

    /// Commit the completed step: history snapshot, summaries, collectors.
    /// Runs only after every fallible stage of the step has succeeded.
    fn record(&mut self) {
        let ess = self.weights.ess();
        log::debug!(
            "t={} ess={:.2} resampled={} logLt={:.6}",
            self.t,
            ess,
            self.resampled_last,
            self.log_likelihood
        );
        if let Some(history) = self.history.as_mut() {
            history.push(HistoryStep::new(
                self.particles.clone(),
                self.weights.clone(),
                self.ancestors.clone(),
            ));
        }
        self.summaries
            .record(ess, self.resampled_last, self.log_likelihood);
        for collector in self.collectors.iter_mut() {
            collector.on_step(
                self.t,
                &self.particles,
                &self.weights,
                ess,
                self.resampled_last,
            );
        }
    }

    fn check_particle_count(&self, what: &str, len: usize) -> SmcResult<()> {
        if len != self.config.num_particles {
            return Err(SmcError::ModelFailure(format!(
                "model produced {} {}, expected {}",
                len, what, self.config.num_particles
            )));
        }
        Ok(())
    }

    /// Time index of the next step (equivalently, steps completed so far).
    pub fn t(&self) -> usize {
        self.t
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &SmcConfig {
        &self.config
    }

    pub fn model(&self) -> &F {
        &self.fk
    }

    /// The current particle set (empty before the first step).
    pub fn particles(&self) -> &[F::State] {
        &self.particles
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Ancestor indices of the last completed step, if it resampled.
    pub fn ancestors(&self) -> Option<&[usize]> {
        self.ancestors.as_deref()
    }

    /// Whether the last completed step resampled.
    pub fn resampled_last(&self) -> bool {
        self.resampled_last
    }

    /// Marginal log-likelihood estimate accumulated so far.
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Contribution of the last completed step to the log-likelihood.
    pub fn step_log_likelihood(&self) -> f64 {
        self.step_log_likelihood
    }

    pub fn history(&self) -> Option<&History<F::State>> {
        self.history.as_ref()
    }

    /// Consume the run and keep only its history.
    pub fn into_history(self) -> Option<History<F::State>> {
        self.history
    }

    pub fn summaries(&self) -> &Summaries {
        &self.summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand_distr::{Distribution, Normal};
    use statrs::distribution::ContinuousCDF;

    /// States unchanged, zero weight increment at every step.
    struct TrivialModel {
        horizon: usize,
    }

    impl FeynmanKac for TrivialModel {
        type State = f64;

        fn time_horizon(&self) -> usize {
            self.horizon
        }

        fn sample_initial(&self, n: usize, _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            Ok(vec![0.0; n])
        }

        fn propose(&self, _t: usize, ancestors: &[f64], _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            Ok(ancestors.to_vec())
        }

        fn log_weight_increment(
            &self,
            _t: usize,
            _ancestors: &[f64],
            particles: &[f64],
        ) -> SmcResult<Vec<f64>> {
            Ok(vec![0.0; particles.len()])
        }
    }

    /// Gaussian random walk with a sharp quadratic potential; weights skew
    /// fast, so the adaptive policy fires.
    struct SkewedModel {
        horizon: usize,
    }

    impl FeynmanKac for SkewedModel {
        type State = f64;

        fn time_horizon(&self) -> usize {
            self.horizon
        }

        fn sample_initial(&self, n: usize, rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            let normal = Normal::new(0.0, 1.0).unwrap();
            Ok((0..n).map(|_| normal.sample(rng)).collect())
        }

        fn propose(&self, _t: usize, ancestors: &[f64], rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            let normal = Normal::new(0.0, 1.0).unwrap();
            Ok(ancestors.iter().map(|x| x + normal.sample(rng)).collect())
        }

        fn log_weight_increment(
            &self,
            _t: usize,
            _ancestors: &[f64],
            particles: &[f64],
        ) -> SmcResult<Vec<f64>> {
            Ok(particles.iter().map(|x| -2.0 * x * x).collect())
        }
    }

    /// Weight stage reports total collapse at t = 1.
    struct CollapsingModel;

    impl FeynmanKac for CollapsingModel {
        type State = f64;

        fn time_horizon(&self) -> usize {
            5
        }

        fn sample_initial(&self, n: usize, _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            Ok(vec![0.0; n])
        }

        fn propose(&self, _t: usize, ancestors: &[f64], _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            Ok(ancestors.to_vec())
        }

        fn log_weight_increment(
            &self,
            t: usize,
            _ancestors: &[f64],
            particles: &[f64],
        ) -> SmcResult<Vec<f64>> {
            if t == 1 {
                Ok(vec![f64::NEG_INFINITY; particles.len()])
            } else {
                Ok(vec![0.0; particles.len()])
            }
        }
    }

    /// Gaussian random walk expressed through SQMC quantile maps.
    struct QmcModel {
        horizon: usize,
    }

    impl QmcModel {
        fn quantile(u: f64) -> f64 {
            let u = u.clamp(1e-12, 1.0 - 1e-12);
            statrs::distribution::Normal::new(0.0, 1.0)
                .unwrap()
                .inverse_cdf(u)
        }
    }

    impl FeynmanKac for QmcModel {
        type State = f64;

        fn time_horizon(&self) -> usize {
            self.horizon
        }

        fn sample_initial(&self, n: usize, rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            let normal = Normal::new(0.0, 1.0).unwrap();
            Ok((0..n).map(|_| normal.sample(rng)).collect())
        }

        fn propose(&self, _t: usize, ancestors: &[f64], rng: &mut StdRng) -> SmcResult<Vec<f64>> {
            let normal = Normal::new(0.0, 1.0).unwrap();
            Ok(ancestors.iter().map(|x| x + normal.sample(rng)).collect())
        }

        fn log_weight_increment(
            &self,
            _t: usize,
            _ancestors: &[f64],
            particles: &[f64],
        ) -> SmcResult<Vec<f64>> {
            Ok(particles.iter().map(|x| -0.5 * x * x).collect())
        }

        fn from_uniform_initial(&self, u: &DVector<f64>) -> SmcResult<f64> {
            Ok(Self::quantile(u[0]))
        }

        fn from_uniform(&self, _t: usize, ancestor: &f64, u: &DVector<f64>) -> SmcResult<f64> {
            Ok(ancestor + Self::quantile(u[0]))
        }

        fn coordinates(&self, particles: &[f64]) -> SmcResult<Vec<DVector<f64>>> {
            Ok(particles
                .iter()
                .map(|&x| DVector::from_vec(vec![x]))
                .collect())
        }
    }

    fn config(n: usize) -> SmcConfig {
        SmcConfig {
            num_particles: n,
            store_history: true,
            ..SmcConfig::default()
        }
    }

    #[test]
    fn t_trivial_model_never_resamples() {
        let mut smc = Smc::new(TrivialModel { horizon: 2 }, config(50)).unwrap();
        smc.run().unwrap();
        assert_eq!(smc.state(), RunState::Done);
        assert_approx_eq!(smc.weights().ess(), 50.0, 1e-9);
        assert_approx_eq!(smc.log_likelihood(), 0.0, 1e-12);
        let history = smc.history().unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.steps().iter().all(|s| !s.resampled()));
        assert_eq!(smc.summaries().resample_flags(), &[false, false]);
    }

    #[test]
    fn t_skewed_model_triggers_adaptive_resampling() {
        let mut smc = Smc::new(SkewedModel { horizon: 10 }, config(100)).unwrap();
        smc.run().unwrap();
        assert_eq!(smc.state(), RunState::Done);
        assert!(smc.summaries().resample_flags().iter().any(|&f| f));
        // resampling can only fire from t = 1 on
        assert!(!smc.summaries().resample_flags()[0]);
        assert!(smc.log_likelihood().is_finite());
        // every recorded resampled step carries a full ancestor vector
        for step in smc.history().unwrap().steps() {
            if let Some(ancestors) = step.ancestors() {
                assert_eq!(ancestors.len(), 100);
            }
        }
    }

    #[test]
    fn t_same_seed_reproduces_the_run_exactly() {
        let run = |seed: u64| {
            let cfg = SmcConfig { seed, ..config(64) };
            let mut smc = Smc::new(SkewedModel { horizon: 8 }, cfg).unwrap();
            smc.run().unwrap();
            let ancestors: Vec<Option<Vec<usize>>> = smc
                .history()
                .unwrap()
                .steps()
                .iter()
                .map(|s| s.ancestors().map(|a| a.to_vec()))
                .collect();
            (ancestors, smc.log_likelihood())
        };
        let (a1, ll1) = run(7);
        let (a2, ll2) = run(7);
        assert_eq!(a1, a2);
        assert_eq!(ll1.to_bits(), ll2.to_bits());
        let (a3, _) = run(8);
        assert_ne!(a1, a3);
    }

    #[test]
    fn t_threshold_one_always_resamples_skewed_weights() {
        let cfg = SmcConfig {
            ess_threshold: 1.0,
            ..config(32)
        };
        let mut smc = Smc::new(SkewedModel { horizon: 6 }, cfg).unwrap();
        smc.run().unwrap();
        let flags = smc.summaries().resample_flags();
        assert!(flags[1..].iter().all(|&f| f));
    }

    #[test]
    fn t_collapse_fails_the_step_and_commits_nothing() {
        let mut smc = Smc::new(CollapsingModel, config(10)).unwrap();
        let err = smc.run().unwrap_err();
        assert!(matches!(err, SmcError::AllWeightsDegenerate(_)));
        assert!(err.to_string().contains("t=1"));
        assert_eq!(smc.state(), RunState::Failed);
        // only t = 0 was committed
        assert_eq!(smc.history().unwrap().len(), 1);
        assert_eq!(smc.summaries().len(), 1);
        // failed runs are not resumable
        assert!(matches!(smc.step(), Err(SmcError::Config(_))));
    }

    #[test]
    fn t_invalid_configs_rejected() {
        assert!(matches!(
            Smc::new(
                TrivialModel { horizon: 1 },
                SmcConfig {
                    num_particles: 0,
                    ..SmcConfig::default()
                }
            ),
            Err(SmcError::Config(_))
        ));
        assert!(matches!(
            Smc::new(
                TrivialModel { horizon: 1 },
                SmcConfig {
                    ess_threshold: 0.0,
                    ..SmcConfig::default()
                }
            ),
            Err(SmcError::Config(_))
        ));
        assert!(matches!(
            Smc::new(
                TrivialModel { horizon: 1 },
                SmcConfig {
                    resampling_scheme: ResamplingScheme::Killing,
                    ..SmcConfig::default()
                }
            ),
            Err(SmcError::Config(_))
        ));
    }

    #[test]
    fn t_qmc_run_completes_and_always_resamples() {
        let cfg = SmcConfig {
            use_qmc: true,
            ..config(32)
        };
        let mut smc = Smc::new(QmcModel { horizon: 4 }, cfg).unwrap();
        smc.run().unwrap();
        assert_eq!(smc.state(), RunState::Done);
        assert!(smc.log_likelihood().is_finite());
        let flags = smc.summaries().resample_flags();
        assert!(!flags[0]);
        assert!(flags[1..].iter().all(|&f| f));
        for step in smc.history().unwrap().steps().iter().skip(1) {
            assert_eq!(step.ancestors().unwrap().len(), 32);
        }
    }

    #[test]
    fn t_qmc_requires_the_model_maps() {
        let cfg = SmcConfig {
            use_qmc: true,
            ..config(8)
        };
        let mut smc = Smc::new(TrivialModel { horizon: 2 }, cfg).unwrap();
        let err = smc.run().unwrap_err();
        assert!(matches!(err, SmcError::ModelFailure(_)));
        assert_eq!(smc.state(), RunState::Failed);
    }

    #[test]
    fn t_collector_hook_fires_once_per_step() {
        struct CountingCollector {
            calls: std::rc::Rc<std::cell::RefCell<Vec<(usize, f64, bool)>>>,
        }
        impl Collector<f64> for CountingCollector {
            fn on_step(
                &mut self,
                t: usize,
                particles: &[f64],
                _weights: &Weights,
                ess: f64,
                resampled: bool,
            ) {
                assert_eq!(particles.len(), 20);
                self.calls.borrow_mut().push((t, ess, resampled));
            }
        }
        let calls = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut smc = Smc::new(TrivialModel { horizon: 3 }, config(20)).unwrap();
        smc.add_collector(Box::new(CountingCollector {
            calls: calls.clone(),
        }));
        smc.run().unwrap();
        let calls = calls.borrow();
        assert_eq!(calls.len(), 3);
        for (t, (step_t, ess, resampled)) in calls.iter().enumerate() {
            assert_eq!(t, *step_t);
            assert_approx_eq!(*ess, 20.0, 1e-9);
            assert!(!resampled);
        }
    }

    #[test]
    fn t_wrong_output_length_is_a_model_failure() {
        struct ShortModel;
        impl FeynmanKac for ShortModel {
            type State = f64;
            fn time_horizon(&self) -> usize {
                2
            }
            fn sample_initial(&self, _n: usize, _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
                Ok(vec![0.0; 3])
            }
            fn propose(&self, _t: usize, a: &[f64], _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
                Ok(a.to_vec())
            }
            fn log_weight_increment(
                &self,
                _t: usize,
                _a: &[f64],
                p: &[f64],
            ) -> SmcResult<Vec<f64>> {
                Ok(vec![0.0; p.len()])
            }
        }
        let mut smc = Smc::new(ShortModel, config(10)).unwrap();
        let err = smc.run().unwrap_err();
        assert!(matches!(err, SmcError::ModelFailure(_)));
        assert!(err.to_string().contains("t=0"));
    }
}
