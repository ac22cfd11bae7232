//! # Components
//!
//! Building blocks shared by the agents.
//!
//! ## Noise
//!
//! [`OuNoise`] implements the Ornstein-Uhlenbeck process, the action noise
//! [`crate::agents::TD3`] falls back to when state-dependent exploration is
//! disabled.
//!
//! ## Buffers
//!
//! The [`ReplayBuffer`] stores transitions for off-policy algorithms such as
//! [`crate::agents::TD3`]. The [`RolloutBuffer`] stores one fixed-length
//! rollout for on-policy algorithms such as [`crate::agents::A2C`] and
//! computes GAE advantages over it.

mod ou_noise;
mod replay_buffer;
mod rollout_buffer;

pub use ou_noise::OuNoise;
pub use replay_buffer::{
    Batch,
    ReplayBuffer,
};
pub use rollout_buffer::{
    RolloutBatch,
    RolloutBuffer,
};
