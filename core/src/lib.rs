//! Sequential Monte Carlo toolbox: resampling engines and the generic
//! particle propagation loop.
//!
//! This crate provides the computational core of a particle filtering
//! library: numerically stable log-domain weight handling, a family of
//! interchangeable resampling schemes, Hilbert-curve particle ordering for
//! the quasi-Monte Carlo variant, and the propagation loop that drives
//! bootstrap/guided/auxiliary particle filters against a user-supplied
//! Feynman-Kac model. Anything model-specific — how a state-space model
//! proposes its next state or evaluates a likelihood — is supplied by the
//! caller through the [`FeynmanKac`] trait; this crate never defines
//! concrete models.
//!
//! The crate is primarily built off of three dependencies:
//! - [`nalgebra`](https://crates.io/crates/nalgebra): vector/matrix types
//!   for particle coordinates and weighted moments.
//! - [`rand`](https://crates.io/crates/rand) and
//!   [`rand_distr`](https://crates.io/crates/rand_distr): all randomness,
//!   drawn from a per-run seeded generator (never a process-wide one), so
//!   runs are exactly reproducible from their seed.
//! - [`log`](https://crates.io/crates/log): per-step diagnostics and failure
//!   reporting.
//!
//! ## Crate overview
//!
//! - [weights]: log-domain weight normalization, ESS, and the stable
//!   `log_sum_exp` / `log_mean_exp` reductions.
//! - [resampling]: the inverse-CDF primitive, ordered-uniform generators,
//!   and the multinomial / residual / stratified / systematic / SSP /
//!   killing schemes.
//! - [hilbert]: deterministic Hilbert-curve ordering of multi-dimensional
//!   particle clouds.
//! - [qmc]: Halton low-discrepancy points and their randomization.
//! - [filter]: the [`Smc`] propagation engine, its configuration, and the
//!   [`FeynmanKac`] model trait.
//! - [history]: the per-step record (particles, weights, ancestor indices)
//!   consumed by offline smoothers.
//! - [collectors]: per-step summary hooks.
//! - [error]: the [`SmcError`] kinds shared by all of the above.
//!
//! ## A minimal run
//!
//! ```rust
//! use rand::rngs::StdRng;
//! use smc::{FeynmanKac, Smc, SmcConfig, SmcResult};
//!
//! // A model in which nothing happens: states stay put, weights stay flat.
//! struct Still;
//!
//! impl FeynmanKac for Still {
//!     type State = f64;
//!     fn time_horizon(&self) -> usize { 3 }
//!     fn sample_initial(&self, n: usize, _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
//!         Ok(vec![0.0; n])
//!     }
//!     fn propose(&self, _t: usize, xp: &[f64], _rng: &mut StdRng) -> SmcResult<Vec<f64>> {
//!         Ok(xp.to_vec())
//!     }
//!     fn log_weight_increment(&self, _t: usize, _xp: &[f64], x: &[f64]) -> SmcResult<Vec<f64>> {
//!         Ok(vec![0.0; x.len()])
//!     }
//! }
//!
//! let mut pf = Smc::new(Still, SmcConfig::default()).unwrap();
//! pf.run().unwrap();
//! assert_eq!(pf.t(), 3);
//! assert!((pf.weights().ess() - 100.0).abs() < 1e-9);
//! ```

pub mod collectors;
pub mod error;
pub mod filter;
pub mod hilbert;
pub mod history;
pub mod qmc;
pub mod resampling;
pub mod weights;

pub use error::{SmcError, SmcResult};
pub use filter::{FeynmanKac, RunState, Smc, SmcConfig};
pub use history::History;
pub use resampling::ResamplingScheme;
pub use weights::Weights;
