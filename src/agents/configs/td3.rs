use {
    super::{
        AlgorithmConfig,
        OffPolicyConfig,
    },
    crate::sde::SdeConfig,
    serde::{
        Deserialize,
        Serialize,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TD3Config {
    // The learning rates for the Actor and Critic networks
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    // Learning rate of log_std when it is trained rather than scheduled.
    pub sde_learning_rate: f64,
    // The impact of the q value of the next state on the current state's q value.
    pub gamma: f64,
    // The weight for updating the target networks.
    pub tau: f64,
    // The number of neurons in the hidden layers of the Actor and Critic networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    // The capacity of the replay buffer used for sampling training data.
    pub replay_buffer_capacity: usize,
    // The training batch size for each training iteration.
    pub training_batch_size: usize,
    // Gradient steps after each episode; None means one per collected step.
    pub training_iterations: Option<usize>,
    // Number of random actions to take at very beginning of training.
    pub learning_starts: usize,
    // Critic updates per actor and target update.
    pub policy_delay: usize,
    // Target policy smoothing.
    pub target_policy_noise: f64,
    pub target_noise_clip: f64,
    // Ornstein-Uhlenbeck process parameters, used when SDE is off.
    pub ou_mu: f64,
    pub ou_theta: f64,
    pub ou_sigma: f64,
    pub sde: SdeConfig,
}

impl TD3Config {
    pub fn pendulum() -> Self {
        Self {
            actor_learning_rate: 1e-3,
            critic_learning_rate: 1e-3,
            sde_learning_rate: 1e-3,
            gamma: 0.98,
            tau: 0.005,
            hidden_1_size: 400,
            hidden_2_size: 300,
            replay_buffer_capacity: 100_000,
            training_batch_size: 100,
            training_iterations: None,
            learning_starts: 10_000,
            policy_delay: 2,
            target_policy_noise: 0.2,
            target_noise_clip: 0.5,
            ou_mu: 0.0,
            ou_theta: 0.15,
            ou_sigma: 0.1,
            sde: SdeConfig::enabled(-2.0),
        }
    }

    pub fn mountain_car() -> Self {
        Self {
            gamma: 0.99,
            training_batch_size: 256,
            replay_buffer_capacity: 50_000,
            learning_starts: 1_000,
            ou_sigma: 0.5,
            sde: SdeConfig::enabled(-1.0),
            ..Self::pendulum()
        }
    }
}

impl AlgorithmConfig for TD3Config {
    fn gamma(&self) -> f64 {
        self.gamma
    }
    fn hidden_sizes(&self) -> (usize, usize) {
        (self.hidden_1_size, self.hidden_2_size)
    }
    fn sde(&self) -> &SdeConfig {
        &self.sde
    }
    fn set_gamma(&mut self, gamma: f64) {
        self.gamma = gamma;
    }
    fn set_hidden_sizes(&mut self, hidden_1_size: usize, hidden_2_size: usize) {
        self.hidden_1_size = hidden_1_size;
        self.hidden_2_size = hidden_2_size;
    }
    fn set_sde(&mut self, sde: SdeConfig) {
        self.sde = sde;
    }
}

impl OffPolicyConfig for TD3Config {
    fn replay_buffer_capacity(&self) -> usize {
        self.replay_buffer_capacity
    }
    fn training_batch_size(&self) -> usize {
        self.training_batch_size
    }
    fn training_iterations(&self) -> Option<usize> {
        self.training_iterations
    }
    fn learning_starts(&self) -> usize {
        self.learning_starts
    }
    fn set_replay_buffer_capacity(&mut self, capacity: usize) {
        self.replay_buffer_capacity = capacity;
    }
    fn set_training_batch_size(&mut self, batch_size: usize) {
        self.training_batch_size = batch_size;
    }
    fn set_training_iterations(&mut self, training_iterations: Option<usize>) {
        self.training_iterations = training_iterations;
    }
    fn set_learning_starts(&mut self, learning_starts: usize) {
        self.learning_starts = learning_starts;
    }
}
