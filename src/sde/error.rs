use thiserror::Error;

/// Errors raised by the state-dependent exploration subsystem.
#[derive(Debug, Error)]
pub enum SdeError {
    /// `sigma_hat` contained a non-positive or non-finite entry.
    #[error("noise scale must be strictly positive and finite, found {value}")]
    InvalidNoiseScale { value: f64 },

    /// The log-std schedule failed or produced a non-finite target.
    #[error("log-std schedule failed at progress {progress}: {reason}")]
    ScheduleEvaluation { progress: f64, reason: String },

    /// Noise was requested before any weight matrix was drawn.
    #[error("no noise weights have been sampled yet")]
    NoiseNotSampled,

    #[error("expected a state batch with {expected} features, found {found}")]
    StateDimension { expected: usize, found: usize },

    #[error(transparent)]
    Tensor(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, SdeError>;
