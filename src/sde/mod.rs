//! # State-Dependent Exploration
//!
//! Exploration noise for continuous-action policies that is a smooth,
//! deterministic function of the state within a noise epoch:
//!
//! ```text
//! W ~ N(0, sigma_hat)            sigma_hat = exp(log_std), (state_dim, action_dim)
//! noise  = state @ W
//! action = mean + noise
//! action ~ N(mean, sqrt(state^2 @ sigma_hat^2))
//! ```
//!
//! ## Components
//!
//! - [`NoiseWeightDistribution`] owns the learnable scale (through a
//!   [`NoiseScaleProvider`]) and draws reparameterized weight matrices.
//! - [`StateDependentNoiseGenerator`] turns states and weights into noise and
//!   the matching [`GaussianDistribution`].
//! - [`LogStdScheduler`] maps training progress to a target `log_std`.
//! - [`StateDependentExploration`] is the training-loop hook: it holds the
//!   current weights, resamples them on the configured [`ResampleCadence`] and
//!   applies the schedule.
//!
//! ## Progress
//!
//! Schedules are evaluated at [`progress_remaining`], which is `1.0` when
//! training starts and `0.0` when it ends.

mod config;
mod error;
mod exploration;
mod gaussian;
mod generator;
mod noise_scale;
mod schedule;
mod weights;

pub use config::{
    ResampleCadence,
    SdeConfig,
};
pub use error::SdeError;
pub use exploration::{
    NoiseState,
    StateDependentExploration,
};
pub use gaussian::{
    standard_normal,
    GaussianDistribution,
};
pub use generator::{
    StateDependentNoiseGenerator,
    VARIANCE_FLOOR,
};
pub use noise_scale::{
    ConstantTensorProvider,
    NetworkProvider,
    NoiseScaleProvider,
};
pub use schedule::{
    progress_remaining,
    LogStdScheduler,
};
pub use weights::NoiseWeightDistribution;
