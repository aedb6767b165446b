//! Particle history: the per-step record consumed by offline smoothers.
//!
//! The history is an arena of fixed-size snapshots indexed by time step —
//! never a graph of pointers between particle instances — so genealogies are
//! walked through ancestor-index arrays. It grows monotonically during a
//! run, each entry is immutable once its time step is finalized, and it is
//! owned exclusively by one run.

use crate::error::SmcResult;
use crate::resampling::multinomial_once;
use crate::weights::Weights;
use rand::Rng;

/// One finalized time step: the particle snapshot, its weights, and the
/// ancestor indices used to reach it (`None` when the step did not
/// resample, i.e. the identity mapping).
#[derive(Clone, Debug)]
pub struct HistoryStep<S> {
    particles: Vec<S>,
    weights: Weights,
    ancestors: Option<Vec<usize>>,
}

impl<S> HistoryStep<S> {
    pub(crate) fn new(particles: Vec<S>, weights: Weights, ancestors: Option<Vec<usize>>) -> Self {
        HistoryStep {
            particles,
            weights,
            ancestors,
        }
    }

    pub fn particles(&self) -> &[S] {
        &self.particles
    }

    pub fn weights(&self) -> &Weights {
        &self.weights
    }

    /// Ancestor indices mapping each slot to its parent in the previous
    /// step; `None` means no resampling happened (slot j descends from
    /// slot j).
    pub fn ancestors(&self) -> Option<&[usize]> {
        self.ancestors.as_deref()
    }

    pub fn resampled(&self) -> bool {
        self.ancestors.is_some()
    }
}

/// Append-only record of a whole run, one [`HistoryStep`] per time step.
#[derive(Clone, Debug, Default)]
pub struct History<S> {
    steps: Vec<HistoryStep<S>>,
}

impl<S> History<S> {
    pub(crate) fn new() -> Self {
        History { steps: Vec::new() }
    }

    pub(crate) fn push(&mut self, step: HistoryStep<S>) {
        self.steps.push(step);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, t: usize) -> Option<&HistoryStep<S>> {
        self.steps.get(t)
    }

    pub fn steps(&self) -> &[HistoryStep<S>] {
        &self.steps
    }

    pub fn last(&self) -> Option<&HistoryStep<S>> {
        self.steps.last()
    }
}

impl<S: Clone> History<S> {
    /// Extract a single trajectory from the genealogy.
    ///
    /// The final state is drawn from the final weights, then the trajectory
    /// is reconstructed backwards through the ancestor arrays until t = 0
    /// (steps without resampling pass the slot index through unchanged).
    /// An empty history yields an empty trajectory.
    pub fn extract_trajectory<R: Rng + ?Sized>(&self, rng: &mut R) -> SmcResult<Vec<S>> {
        let Some(last) = self.steps.last() else {
            return Ok(Vec::new());
        };
        let mut slot = multinomial_once(last.weights.normalized(), rng)?;
        let mut trajectory = Vec::with_capacity(self.steps.len());
        for step in self.steps.iter().rev() {
            trajectory.push(step.particles[slot].clone());
            if let Some(ancestors) = &step.ancestors {
                slot = ancestors[slot];
            }
        }
        trajectory.reverse();
        Ok(trajectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn two_step_history() -> History<i32> {
        // t=0: particles [10, 20, 30], mass on slot 2
        // t=1: resampled, every slot descends from slot 2
        let mut hist = History::new();
        hist.push(HistoryStep::new(
            vec![10, 20, 30],
            Weights::from_log(vec![f64::NEG_INFINITY, f64::NEG_INFINITY, 0.0]).unwrap(),
            None,
        ));
        hist.push(HistoryStep::new(
            vec![31, 32, 33],
            Weights::from_log(vec![0.0, f64::NEG_INFINITY, f64::NEG_INFINITY]).unwrap(),
            Some(vec![2, 2, 2]),
        ));
        hist
    }

    #[test]
    fn t_accessors() {
        let hist = two_step_history();
        assert_eq!(hist.len(), 2);
        assert!(!hist.step(0).unwrap().resampled());
        assert!(hist.step(1).unwrap().resampled());
        assert_eq!(hist.step(1).unwrap().ancestors(), Some(&[2, 2, 2][..]));
        assert!(hist.step(2).is_none());
    }

    #[test]
    fn t_trajectory_follows_the_genealogy() {
        let hist = two_step_history();
        let mut rng = StdRng::seed_from_u64(4);
        // final weights are a point mass on slot 0, whose ancestor is 2
        let trajectory = hist.extract_trajectory(&mut rng).unwrap();
        assert_eq!(trajectory, vec![30, 31]);
    }

    #[test]
    fn t_empty_history_yields_empty_trajectory() {
        let hist: History<i32> = History::new();
        let mut rng = StdRng::seed_from_u64(4);
        assert!(hist.extract_trajectory(&mut rng).unwrap().is_empty());
    }
}
