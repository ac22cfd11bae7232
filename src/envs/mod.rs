mod mountain_car;
mod normalize;
mod pendulum;

use {
    anyhow::Result,
    candle_core::{
        Device,
        Tensor,
    },
    rand::RngCore,
    std::ops::RangeInclusive,
};

pub use crate::envs::{
    mountain_car::{
        MountainCarAction,
        MountainCarConfig,
        MountainCarEnv,
        MountainCarObservation,
    },
    normalize::{
        Normalize,
        NormalizeConfig,
        RunningMeanStd,
    },
    pendulum::{
        PendulumAction,
        PendulumConfig,
        PendulumEnv,
        PendulumObservation,
    },
};

fn tensor_to_vec(value: Tensor) -> candle_core::Result<Vec<f64>> {
    if value.dims().len() == 1 {
        value.to_vec1::<f64>()
    } else {
        value.squeeze(0)?.to_vec1::<f64>()
    }
}

/// Conversion between environment values and tensors.
///
/// The `_pp` variants apply the environment's preprocessing, e.g. rescaling
/// a network output in `[-1, 1]` to the real action range.
pub trait TensorConvertible: VectorConvertible + Sized {
    fn from_tensor_pp(value: Tensor) -> candle_core::Result<Self> {
        Ok(Self::from_vec_pp(tensor_to_vec(value)?))
    }

    fn from_tensor(value: Tensor) -> candle_core::Result<Self> {
        Ok(Self::from_vec(tensor_to_vec(value)?))
    }

    fn to_tensor(
        value: Self,
        device: &Device,
    ) -> candle_core::Result<Tensor> {
        Tensor::new(Self::to_vec(value), device)
    }
}

pub trait VectorConvertible {
    fn from_vec_pp(value: Vec<f64>) -> Self;
    fn from_vec(value: Vec<f64>) -> Self;
    fn to_vec(value: Self) -> Vec<f64>;
}

pub trait Sampleable {
    fn sample(
        rng: &mut dyn RngCore,
        domain: &[RangeInclusive<f64>],
    ) -> Self;
}

#[derive(Debug)]
pub struct Step<O, A> {
    pub observation: O,
    pub action: A,
    pub reward: f64,
    pub terminated: bool,
    pub truncated: bool,
}

impl<O, A> Step<O, A> {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

pub trait Environment {
    type Config;
    type Action;
    type Observation;

    fn config(&self) -> &Self::Config;
    fn new(config: Self::Config) -> Result<Box<Self>>;
    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Self::Observation>;
    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<Step<Self::Observation, Self::Action>>;
    fn timelimit(&self) -> usize;
    fn action_space(&self) -> Vec<usize>;
    fn action_domain(&self) -> Vec<RangeInclusive<f64>>;
    fn observation_space(&self) -> Vec<usize>;
    fn observation_domain(&self) -> Vec<RangeInclusive<f64>>;
    fn current_observation(&self) -> Self::Observation;

    /// Copy running statistics (e.g. observation normalization) from the
    /// training environment into an evaluation environment.
    fn sync_statistics(
        &mut self,
        _source: &Self,
    ) {
    }
}
