use {
    super::{
        AlgorithmConfig,
        OnPolicyConfig,
    },
    crate::sde::SdeConfig,
    serde::{
        Deserialize,
        Serialize,
    },
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct A2CConfig {
    // Shared learning rate of the actor, the critic and log_std.
    pub learning_rate: f64,
    // Environment steps collected per rollout.
    pub n_steps: usize,
    pub gamma: f64,
    // GAE smoothing; 1.0 gives plain Monte-Carlo advantages.
    pub gae_lambda: f64,
    pub ent_coef: f64,
    pub vf_coef: f64,
    pub max_grad_norm: f64,
    pub normalize_advantage: bool,
    // The number of neurons in the hidden layers of the Actor and Critic networks.
    pub hidden_1_size: usize,
    pub hidden_2_size: usize,
    pub sde: SdeConfig,
}

impl A2CConfig {
    pub fn pendulum() -> Self {
        Self {
            learning_rate: 7e-4,
            n_steps: 8,
            gamma: 0.9,
            gae_lambda: 0.9,
            ent_coef: 0.0,
            vf_coef: 0.4,
            max_grad_norm: 0.5,
            normalize_advantage: false,
            hidden_1_size: 64,
            hidden_2_size: 64,
            sde: SdeConfig::enabled(-2.0).with_sample_freq(4),
        }
    }

    pub fn mountain_car() -> Self {
        Self {
            learning_rate: 3e-4,
            n_steps: 200,
            gamma: 0.99,
            gae_lambda: 1.0,
            ent_coef: 0.0,
            vf_coef: 0.5,
            max_grad_norm: 0.5,
            normalize_advantage: false,
            hidden_1_size: 64,
            hidden_2_size: 64,
            sde: SdeConfig::enabled(0.0),
        }
    }
}

impl AlgorithmConfig for A2CConfig {
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

impl OnPolicyConfig for A2CConfig {
    fn n_steps(&self) -> usize {
        self.n_steps
    }
    fn set_n_steps(&mut self, n_steps: usize) {
        self.n_steps = n_steps;
    }
}
