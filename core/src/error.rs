//! Error types shared across the crate.
//!
//! Every failure in this crate is fatal to the current run: weight collapse
//! or an invalid probability vector reflects a genuine model or numerical
//! problem, never a transient fault, so nothing here is retried internally.

use std::fmt::Display;

pub type SmcResult<T> = Result<T, SmcError>;

/// Error kinds surfaced by the SMC core.
#[derive(Debug, Clone, PartialEq)]
pub enum SmcError {
    /// Normalization impossible: every log-weight is -inf, or NaN/+inf present.
    AllWeightsDegenerate(String),
    /// Resampling input is not a valid normalized probability vector.
    InvalidWeights(String),
    /// Hilbert ordering was given points of inconsistent dimensionality.
    DimensionMismatch(String),
    /// The external propose/weight capability reported an error.
    ModelFailure(String),
    /// The run configuration was rejected before the run started.
    Config(String),
}

impl Display for SmcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllWeightsDegenerate(msg) => write!(f, "AllWeightsDegenerate: {}", msg),
            Self::InvalidWeights(msg) => write!(f, "InvalidWeights: {}", msg),
            Self::DimensionMismatch(msg) => write!(f, "DimensionMismatch: {}", msg),
            Self::ModelFailure(msg) => write!(f, "ModelFailure: {}", msg),
            Self::Config(msg) => write!(f, "Config: {}", msg),
        }
    }
}

impl std::error::Error for SmcError {}

impl SmcError {
    /// Annotate an error with the time step at which it was detected.
    pub(crate) fn at_time(self, t: usize) -> SmcError {
        match self {
            Self::AllWeightsDegenerate(msg) => {
                Self::AllWeightsDegenerate(format!("t={}: {}", t, msg))
            }
            Self::InvalidWeights(msg) => Self::InvalidWeights(format!("t={}: {}", t, msg)),
            Self::DimensionMismatch(msg) => Self::DimensionMismatch(format!("t={}: {}", t, msg)),
            Self::ModelFailure(msg) => Self::ModelFailure(format!("t={}: {}", t, msg)),
            Self::Config(msg) => Self::Config(format!("t={}: {}", t, msg)),
        }
    }
}
