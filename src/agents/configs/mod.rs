mod a2c;
mod td3;

pub use a2c::A2CConfig;
pub use td3::TD3Config;

use crate::sde::SdeConfig;

pub trait AlgorithmConfig {
    fn gamma(&self) -> f64;
    fn hidden_sizes(&self) -> (usize, usize);
    fn sde(&self) -> &SdeConfig;
    fn set_gamma(&mut self, gamma: f64);
    fn set_hidden_sizes(&mut self, hidden_1_size: usize, hidden_2_size: usize);
    fn set_sde(&mut self, sde: SdeConfig);
}
pub trait OnPolicyConfig: AlgorithmConfig {
    fn n_steps(&self) -> usize;
    fn set_n_steps(&mut self, n_steps: usize);
}
pub trait OffPolicyConfig: AlgorithmConfig {
    fn replay_buffer_capacity(&self) -> usize;
    fn training_batch_size(&self) -> usize;
    fn training_iterations(&self) -> Option<usize>;
    fn learning_starts(&self) -> usize;
    fn set_replay_buffer_capacity(&mut self, capacity: usize);
    fn set_training_batch_size(&mut self, batch_size: usize);
    fn set_training_iterations(&mut self, training_iterations: Option<usize>);
    fn set_learning_starts(&mut self, learning_starts: usize);
}
