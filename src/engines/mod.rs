//! Outer training loops, evaluation and repeated experiments.

mod evaluate;
mod experiment;
mod train;

pub use evaluate::evaluate;
pub use experiment::{
    run_experiment_off_policy,
    run_experiment_on_policy,
    write_config,
    ExperimentConfig,
};
pub use train::{
    learn_off_policy,
    learn_on_policy,
    TrainConfig,
    TrainingSummary,
};
