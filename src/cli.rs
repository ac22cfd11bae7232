use {
    crate::{
        agents::{
            configs::{
                A2CConfig,
                AlgorithmConfig,
                OffPolicyConfig,
                OnPolicyConfig,
                TD3Config,
            },
            OffPolicyAlgorithm,
            OnPolicyAlgorithm,
            SaveableAlgorithm,
            A2C,
            TD3,
        },
        engines::{
            run_experiment_off_policy,
            run_experiment_on_policy,
            ExperimentConfig,
            TrainConfig,
        },
        envs::{
            Environment,
            MountainCarConfig,
            MountainCarEnv,
            Normalize,
            NormalizeConfig,
            PendulumConfig,
            PendulumEnv,
            Sampleable,
            TensorConvertible,
            VectorConvertible,
        },
        logging::setup_logging,
        sde::LogStdScheduler,
    },
    anyhow::{
        bail,
        Result,
    },
    candle_core::Device,
    clap::{
        ArgAction,
        Parser,
        ValueEnum,
    },
    serde::Serialize,
    std::path::PathBuf,
    tracing::{
        warn,
        Level,
    },
};

#[derive(ValueEnum, Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum Env {
    Pendulum,
    MountainCar,
}

#[derive(ValueEnum, Debug, Clone, Copy, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Agent {
    A2c,
    Td3,
}

#[derive(ValueEnum, Debug, Clone)]
pub enum Loglevel {
    Error, // put these only during active debugging and then downgrade later
    Warn,  // main events in the program
    Info,  // all the little details
    Debug, // per-update losses
    None,  // don't log anything
}
impl Loglevel {
    pub fn level(&self) -> Option<Level> {
        match self {
            Loglevel::Error => Some(Level::ERROR),
            Loglevel::Warn => Some(Level::WARN),
            Loglevel::Info => Some(Level::INFO),
            Loglevel::Debug => Some(Level::DEBUG),
            Loglevel::None => None,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Setup logging
    #[arg(long, value_enum, default_value_t=Loglevel::None)]
    pub log: Loglevel,

    /// The algorithm to train.
    #[arg(long, value_enum)]
    pub agent: Agent,

    /// The environment to train on.
    #[arg(long, value_enum)]
    pub env: Env,

    /// Normalize observations and rewards with running statistics.
    #[arg(long)]
    pub normalize: bool,

    /// Explore with generalized state-dependent noise.
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    pub use_sde: bool,

    /// Initial log standard deviation of the exploration noise.
    #[arg(long, allow_hyphen_values = true)]
    pub log_std_init: Option<f64>,

    /// Hidden layer widths of the exploration feature network, e.g. `32,16`.
    #[arg(long, value_delimiter = ',')]
    pub sde_net_arch: Option<Vec<usize>>,

    /// Anneal log_std linearly from START to END over training, e.g. `-2,1`.
    /// The schedule then owns log_std and it is not trained.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub log_std_schedule: Option<Vec<f64>>,

    /// Resample the noise every n steps instead of the algorithm's default.
    #[arg(long)]
    pub sde_sample_freq: Option<usize>,

    /// Rollout length of on-policy algorithms.
    #[arg(long)]
    pub n_steps: Option<usize>,

    /// Random steps before an off-policy algorithm starts learning.
    #[arg(long)]
    pub learning_starts: Option<usize>,

    /// Environment steps per run.
    #[arg(long, default_value_t = 100_000)]
    pub timesteps: usize,

    /// Evaluate every n steps; 0 disables evaluation.
    #[arg(long, default_value_t = 0)]
    pub eval_freq: usize,

    /// Episodes per evaluation.
    #[arg(long, default_value_t = 5)]
    pub eval_episodes: usize,

    /// Number of repeated, identical runs.
    #[arg(long, default_value_t = 1)]
    pub runs: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Directory under `data/` to write the results to.
    #[arg(long)]
    pub output: Option<PathBuf>,
}

impl Args {
    fn configure<C: AlgorithmConfig>(
        &self,
        config: &mut C,
    ) -> Result<()> {
        let mut sde = config.sde().clone();
        sde.use_sde = self.use_sde;
        if let Some(log_std_init) = self.log_std_init {
            sde.log_std_init = log_std_init;
        }
        if self.sde_net_arch.is_some() {
            sde.sde_net_arch = self.sde_net_arch.clone();
        }
        if self.sde_sample_freq.is_some() {
            sde.sample_freq = self.sde_sample_freq;
        }
        match self.log_std_schedule.as_deref() {
            Some(&[start, end]) => {
                sde.log_std_scheduler = Some(LogStdScheduler::linear(start, end));
            }
            Some(other) => bail!("--log-std-schedule takes START,END, got {other:?}"),
            None => (),
        }
        config.set_sde(sde);
        Ok(())
    }

    fn experiment(&self) -> ExperimentConfig {
        let default_path = format!(
            "{}_{}{}",
            self.agent,
            self.env,
            if self.use_sde { "_sde" } else { "" },
        );
        ExperimentConfig {
            path: self.output.clone().unwrap_or_else(|| default_path.into()),
            n_repetitions: self.runs,
            seed: self.seed,
        }
    }

    fn train_config(&self) -> TrainConfig {
        TrainConfig::new(self.timesteps).with_eval(self.eval_freq, self.eval_episodes)
    }
}

fn run_on_policy<Alg, Env, Obs, Act>(
    args: &Args,
    env_config: Env::Config,
    eval_env_config: Env::Config,
    mut config: Alg::Config,
    device: &Device,
) -> Result<()>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Env::Config: Clone + Serialize,
    Alg: OnPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: OnPolicyConfig + Serialize,
    Obs: TensorConvertible,
    Act: TensorConvertible,
{
    args.configure(&mut config)?;
    if let Some(n_steps) = args.n_steps {
        config.set_n_steps(n_steps);
    }
    let summaries = run_experiment_on_policy::<Alg, Env, Obs, Act>(
        &args.experiment(),
        env_config,
        (args.eval_freq > 0).then_some(eval_env_config),
        config,
        args.train_config(),
        device,
    )?;
    report(&summaries);
    Ok(())
}

fn run_off_policy<Alg, Env, Obs, Act>(
    args: &Args,
    env_config: Env::Config,
    eval_env_config: Env::Config,
    mut config: Alg::Config,
    device: &Device,
) -> Result<()>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Env::Config: Clone + Serialize,
    Alg: OffPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: OffPolicyConfig + Serialize,
    Obs: TensorConvertible,
    Act: TensorConvertible + Sampleable,
{
    args.configure(&mut config)?;
    if let Some(learning_starts) = args.learning_starts {
        config.set_learning_starts(learning_starts);
    }
    let summaries = run_experiment_off_policy::<Alg, Env, Obs, Act>(
        &args.experiment(),
        env_config,
        (args.eval_freq > 0).then_some(eval_env_config),
        config,
        args.train_config(),
        device,
    )?;
    report(&summaries);
    Ok(())
}

fn report(summaries: &[crate::engines::TrainingSummary]) {
    for (n, summary) in summaries.iter().enumerate() {
        match summary.eval_returns.last() {
            Some(mean_return) => warn!("run {n}: final evaluation return {mean_return}"),
            None => warn!("run {n}: {} episodes", summary.episode_returns.len()),
        }
    }
}

/// Dispatch one agent on one (optionally normalized) environment.
fn run_agent<Env, Obs, Act>(
    args: &Args,
    env_config: Env::Config,
    a2c_config: A2CConfig,
    td3_config: TD3Config,
    device: &Device,
) -> Result<()>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Env::Config: Clone + Serialize,
    Obs: TensorConvertible + VectorConvertible,
    Act: TensorConvertible + Sampleable,
{
    match (args.agent, args.normalize) {
        (Agent::A2c, false) => run_on_policy::<A2C, Env, Obs, Act>(
            args,
            env_config.clone(),
            env_config,
            a2c_config,
            device,
        ),
        (Agent::Td3, false) => run_off_policy::<TD3, Env, Obs, Act>(
            args,
            env_config.clone(),
            env_config,
            td3_config,
            device,
        ),
        (Agent::A2c, true) => {
            let config = NormalizeConfig::new(env_config);
            run_on_policy::<A2C, Normalize<Env>, Obs, Act>(
                args,
                config.clone(),
                config.for_evaluation(),
                a2c_config,
                device,
            )
        }
        (Agent::Td3, true) => {
            let config = NormalizeConfig::new(env_config);
            run_off_policy::<TD3, Normalize<Env>, Obs, Act>(
                args,
                config.clone(),
                config.for_evaluation(),
                td3_config,
                device,
            )
        }
    }
}

/// Set up logging and run the experiment described by `args`.
pub fn run(args: Args) -> Result<()> {
    setup_logging(
        &format!("logs/{}_{}.log", args.agent, args.env),
        args.log.level(),
        args.log.level(),
    )?;

    let device = Device::Cpu;
    match args.env {
        Env::Pendulum => run_agent::<PendulumEnv, _, _>(
            &args,
            PendulumConfig::default(),
            A2CConfig::pendulum(),
            TD3Config::pendulum(),
            &device,
        ),
        Env::MountainCar => run_agent::<MountainCarEnv, _, _>(
            &args,
            MountainCarConfig::default(),
            A2CConfig::mountain_car(),
            TD3Config::mountain_car(),
            &device,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["gsde_rl", "--agent", "td3", "--env", "pendulum"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn log_std_schedule_installs_a_linear_scheduler() -> Result<()> {
        let args = parse(&["--log-std-schedule", "-2,1", "--log-std-init", "-2"]);
        let mut config = TD3Config::pendulum();
        args.configure(&mut config)?;

        let scheduler = config.sde.log_std_scheduler.expect("scheduler is set");
        assert_eq!(scheduler.evaluate(1.0)?, -2.0);
        assert_eq!(scheduler.evaluate(0.0)?, 1.0);
        assert_eq!(config.sde.log_std_init, -2.0);
        Ok(())
    }

    #[test]
    fn log_std_schedule_needs_two_values() {
        let args = parse(&["--log-std-schedule", "-2,1,0"]);
        assert!(args.configure(&mut A2CConfig::pendulum()).is_err());
    }

    #[test]
    fn without_a_schedule_log_std_is_trained() -> Result<()> {
        let args = parse(&["--sde-net-arch", "32,16", "--use-sde", "true"]);
        let mut config = A2CConfig::mountain_car();
        args.configure(&mut config)?;
        assert!(config.sde.log_std_scheduler.is_none());
        assert_eq!(config.sde.sde_net_arch, Some(vec![32, 16]));
        Ok(())
    }
}
