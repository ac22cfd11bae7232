use {
    super::schedule::LogStdScheduler,
    serde::{
        Deserialize,
        Serialize,
    },
};

/// When a new noise weight matrix is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResampleCadence {
    /// Once at the start of every rollout (on-policy default).
    PerRollout,
    /// Whenever an episode ends (off-policy default).
    PerEpisode,
    /// Every `n` environment steps.
    EveryNSteps(usize),
}

/// Options recognized by the exploration subsystem at construction time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SdeConfig {
    // Replace the algorithm's own exploration noise with SDE.
    pub use_sde: bool,
    // Initial value of every log_std entry.
    pub log_std_init: f64,
    // Hidden layer widths of the network producing log_std, if any.
    pub sde_net_arch: Option<Vec<usize>>,
    // One log_std per (state, action) pair, or one per state shared across actions.
    pub full_std: bool,
    // Resample every n steps instead of the algorithm's default cadence.
    pub sample_freq: Option<usize>,
    // Overwrites log_std from training progress; disables gradient updates of log_std.
    #[serde(skip)]
    pub log_std_scheduler: Option<LogStdScheduler>,
}

impl Default for SdeConfig {
    fn default() -> Self {
        Self {
            use_sde: false,
            log_std_init: 0.0,
            sde_net_arch: None,
            full_std: true,
            sample_freq: None,
            log_std_scheduler: None,
        }
    }
}

impl SdeConfig {
    pub fn enabled(log_std_init: f64) -> Self {
        Self {
            use_sde: true,
            log_std_init,
            ..Default::default()
        }
    }

    pub fn with_net_arch(
        mut self,
        net_arch: Option<Vec<usize>>,
    ) -> Self {
        self.sde_net_arch = net_arch;
        self
    }

    pub fn with_scheduler(
        mut self,
        scheduler: LogStdScheduler,
    ) -> Self {
        self.log_std_scheduler = Some(scheduler);
        self
    }

    pub fn with_sample_freq(
        mut self,
        sample_freq: usize,
    ) -> Self {
        self.sample_freq = Some(sample_freq);
        self
    }

    pub fn with_full_std(
        mut self,
        full_std: bool,
    ) -> Self {
        self.full_std = full_std;
        self
    }

    /// The configured cadence, falling back to the algorithm's default.
    pub fn cadence(
        &self,
        default: ResampleCadence,
    ) -> ResampleCadence {
        match self.sample_freq {
            Some(n) if n > 0 => ResampleCadence::EveryNSteps(n),
            _ => default,
        }
    }
}
