//! Demo driver: a bootstrap particle filter on a univariate linear-Gaussian
//! state-space model with synthetic observations.
//!
//! The model lives here, not in the library: the library is model-agnostic
//! and this binary only exists to exercise the full loop end to end and to
//! dump per-step summaries for inspection.

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use statrs::distribution::{Continuous, ContinuousCDF};

use nalgebra::DVector;
use smc::{FeynmanKac, ResamplingScheme, Smc, SmcConfig, SmcResult};

#[derive(Parser, Debug)]
#[command(name = "smc", about = "Run a bootstrap particle filter on a synthetic AR(1) model")]
struct Cli {
    /// Number of particles
    #[arg(long, default_value_t = 1000)]
    num_particles: usize,
    /// Number of time steps to simulate and filter
    #[arg(long, default_value_t = 100)]
    steps: usize,
    /// Resampling scheme
    #[arg(long, value_enum, default_value_t = ResamplingScheme::Systematic)]
    scheme: ResamplingScheme,
    /// Resample when ESS / N drops below this fraction
    #[arg(long, default_value_t = 0.5)]
    ess_threshold: f64,
    /// Seed for the filter run (the synthetic data uses its own offset seed)
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Use the sequential quasi-Monte Carlo variant
    #[arg(long)]
    qmc: bool,
    /// AR(1) coefficient of the latent state
    #[arg(long, default_value_t = 0.9)]
    phi: f64,
    /// Standard deviation of the state noise
    #[arg(long, default_value_t = 1.0)]
    sigma_x: f64,
    /// Standard deviation of the observation noise
    #[arg(long, default_value_t = 0.5)]
    sigma_y: f64,
    /// Write per-step summaries to this CSV file
    #[arg(long)]
    output: Option<std::path::PathBuf>,
}

/// Bootstrap Feynman-Kac model for the AR(1)-plus-noise state space model:
/// `x_t = phi * x_{t-1} + sigma_x * eps`, `y_t = x_t + sigma_y * eta`.
struct Ar1Model {
    phi: f64,
    sigma_x: f64,
    sigma_y: f64,
    observations: Vec<f64>,
}

impl Ar1Model {
    /// Stationary standard deviation of the latent AR(1) process.
    fn stationary_std(&self) -> f64 {
        self.sigma_x / (1.0 - self.phi * self.phi).sqrt()
    }

    fn standard_normal_quantile(u: f64) -> f64 {
        let u = u.clamp(1e-12, 1.0 - 1e-12);
        statrs::distribution::Normal::new(0.0, 1.0)
            .unwrap()
            .inverse_cdf(u)
    }

    /// Simulate observations from one latent AR(1) trajectory.
    fn simulate(phi: f64, sigma_x: f64, sigma_y: f64, steps: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let state_noise = Normal::new(0.0, sigma_x).unwrap();
        let obs_noise = Normal::new(0.0, sigma_y).unwrap();
        let stationary = Normal::new(0.0, sigma_x / (1.0 - phi * phi).sqrt()).unwrap();
        let mut observations = Vec::with_capacity(steps);
        let mut x = stationary.sample(&mut rng);
        for t in 0..steps {
            if t > 0 {
                x = phi * x + state_noise.sample(&mut rng);
            }
            observations.push(x + obs_noise.sample(&mut rng));
        }
        observations
    }
}

impl FeynmanKac for Ar1Model {
    type State = f64;

    fn time_horizon(&self) -> usize {
        self.observations.len()
    }

    fn sample_initial(&self, n: usize, rng: &mut StdRng) -> SmcResult<Vec<f64>> {
        let stationary = Normal::new(0.0, self.stationary_std()).unwrap();
        Ok((0..n).map(|_| stationary.sample(rng)).collect())
    }

    fn propose(&self, _t: usize, ancestors: &[f64], rng: &mut StdRng) -> SmcResult<Vec<f64>> {
        let noise = Normal::new(0.0, self.sigma_x).unwrap();
        Ok(ancestors
            .iter()
            .map(|x| self.phi * x + noise.sample(rng))
            .collect())
    }

    fn log_weight_increment(
        &self,
        t: usize,
        _ancestors: &[f64],
        particles: &[f64],
    ) -> SmcResult<Vec<f64>> {
        let obs = statrs::distribution::Normal::new(self.observations[t], self.sigma_y).unwrap();
        Ok(particles.iter().map(|&x| obs.ln_pdf(x)).collect())
    }

    fn from_uniform_initial(&self, u: &DVector<f64>) -> SmcResult<f64> {
        Ok(self.stationary_std() * Self::standard_normal_quantile(u[0]))
    }

    fn from_uniform(&self, _t: usize, ancestor: &f64, u: &DVector<f64>) -> SmcResult<f64> {
        Ok(self.phi * ancestor + self.sigma_x * Self::standard_normal_quantile(u[0]))
    }

    fn coordinates(&self, particles: &[f64]) -> SmcResult<Vec<DVector<f64>>> {
        Ok(particles
            .iter()
            .map(|&x| DVector::from_vec(vec![x]))
            .collect())
    }
}

/// One CSV row per completed time step.
#[derive(Debug, Serialize)]
struct StepRecord {
    t: usize,
    observation: f64,
    posterior_mean: f64,
    ess: f64,
    resampled: bool,
    log_likelihood: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let observations = Ar1Model::simulate(
        cli.phi,
        cli.sigma_x,
        cli.sigma_y,
        cli.steps,
        cli.seed.wrapping_add(1),
    );
    let model = Ar1Model {
        phi: cli.phi,
        sigma_x: cli.sigma_x,
        sigma_y: cli.sigma_y,
        observations,
    };

    let config = SmcConfig {
        num_particles: cli.num_particles,
        resampling_scheme: cli.scheme,
        ess_threshold: cli.ess_threshold,
        use_qmc: cli.qmc,
        seed: cli.seed,
        store_history: true,
    };
    log::info!(
        "running {} particles for {} steps with {:?} resampling",
        config.num_particles,
        cli.steps,
        config.resampling_scheme
    );

    let mut pf = Smc::new(model, config)?;
    pf.run()?;

    let history = pf.history().expect("history was enabled");
    let summaries = pf.summaries();
    let mut records = Vec::with_capacity(history.len());
    for (t, step) in history.steps().iter().enumerate() {
        let posterior_mean: f64 = step
            .particles()
            .iter()
            .zip(step.weights().normalized())
            .map(|(x, w)| x * w)
            .sum();
        records.push(StepRecord {
            t,
            observation: pf.model().observations[t],
            posterior_mean,
            ess: summaries.esss()[t],
            resampled: summaries.resample_flags()[t],
            log_likelihood: summaries.log_likelihoods()[t],
        });
    }

    let resampled_steps = summaries.resample_flags().iter().filter(|&&f| f).count();
    println!(
        "log-likelihood estimate: {:.4} ({} resampling steps out of {})",
        pf.log_likelihood(),
        resampled_steps,
        history.len()
    );

    if let Some(path) = cli.output {
        let mut writer = csv::Writer::from_path(&path)?;
        for record in &records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        println!("wrote {} records to {}", records.len(), path.display());
    }
    Ok(())
}
