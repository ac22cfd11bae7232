use {
    super::train::{
        learn_off_policy,
        learn_on_policy,
        TrainConfig,
        TrainingSummary,
    },
    crate::{
        agents::{
            configs::OffPolicyConfig,
            OffPolicyAlgorithm,
            OnPolicyAlgorithm,
            SaveableAlgorithm,
        },
        envs::{
            Environment,
            Sampleable,
            TensorConvertible,
        },
    },
    anyhow::{
        anyhow,
        Result,
    },
    candle_core::Device,
    polars::prelude::{
        DataFrame,
        NamedFrom,
        ParquetWriter,
        Series,
    },
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
    serde::Serialize,
    std::{
        fs::{
            create_dir_all,
            File,
        },
        io::Write,
        path::{
            Path,
            PathBuf,
        },
    },
    tracing::warn,
};

/// Serialize a config as pretty-printed ron.
pub fn write_config<T: Serialize>(
    config: &T,
    path: impl AsRef<Path>,
) -> Result<()> {
    File::create(path)?.write_all(
        ron::ser::to_string_pretty(config, ron::ser::PrettyConfig::default())?.as_bytes(),
    )?;
    Ok(())
}

/// Where and how often to repeat a training run.
#[derive(Clone, Debug)]
pub struct ExperimentConfig {
    pub path: PathBuf,
    pub n_repetitions: usize,
    pub seed: u64,
}

fn write_summary(
    path: &Path,
    n: usize,
    summary: &TrainingSummary,
) -> Result<()> {
    let mut episodes = DataFrame::new(vec![
        Series::new(&format!("run_{n}_total_rewards"), &summary.episode_returns),
        Series::new(&format!("run_{n}_successes"), &summary.successes),
    ])?;
    ParquetWriter::new(File::create(path.join(format!("run_{n}_episodes.parquet")))?)
        .finish(&mut episodes)?;

    let eval_timesteps = summary
        .eval_timesteps
        .iter()
        .map(|&t| t as u64)
        .collect::<Vec<_>>();
    let mut evaluations = DataFrame::new(vec![
        Series::new(&format!("run_{n}_timesteps"), &eval_timesteps),
        Series::new(&format!("run_{n}_mean_returns"), &summary.eval_returns),
    ])?;
    ParquetWriter::new(File::create(path.join(format!("run_{n}_evaluations.parquet")))?)
        .finish(&mut evaluations)?;
    Ok(())
}

fn prepare_directory<AlgConfig, EnvConfig>(
    experiment: &ExperimentConfig,
    alg_config: &AlgConfig,
    env_config: &EnvConfig,
    train_config: &TrainConfig,
) -> Result<PathBuf>
where
    AlgConfig: Serialize,
    EnvConfig: Serialize,
{
    let path = Path::new("data/").join(&experiment.path);

    let alg_config_exists = path.join("config_algorithm.ron").try_exists()?;
    let env_config_exists = path.join("config_environment.ron").try_exists()?;
    if alg_config_exists || env_config_exists {
        Err(anyhow!(concat!(
            "Config files already exist in this directory!\n",
            "I am assuming I would be overwriting existing data!",
        )))?
    }

    create_dir_all(path.as_path())?;
    write_config(alg_config, path.join("config_algorithm.ron"))?;
    write_config(env_config, path.join("config_environment.ron"))?;
    write_config(train_config, path.join("config_training.ron"))?;
    Ok(path)
}

type Learn<Alg, Env> = fn(
    &mut Env,
    Option<&mut Env>,
    &mut Alg,
    &TrainConfig,
    &Device,
    &mut StdRng,
) -> Result<TrainingSummary>;

fn run_experiment<Alg, Env>(
    experiment: &ExperimentConfig,
    env_config: Env::Config,
    eval_env_config: Option<Env::Config>,
    alg_config: Alg::Config,
    train_config: TrainConfig,
    device: &Device,
    learn: Learn<Alg, Env>,
) -> Result<Vec<TrainingSummary>>
where
    Env: Environment,
    Env::Config: Clone + Serialize,
    Alg: SaveableAlgorithm,
    Alg::Config: Serialize,
{
    let path = prepare_directory(experiment, &alg_config, &env_config, &train_config)?;
    let n_repetitions = experiment.n_repetitions;
    let mut summaries = Vec::with_capacity(n_repetitions);

    for n in 0..n_repetitions {
        warn!("Collecting data, run {n}/{n_repetitions}");
        let mut rng = StdRng::seed_from_u64(experiment.seed.wrapping_add(n as u64));

        let mut env = *Env::new(env_config.clone())?;
        let mut eval_env = match &eval_env_config {
            Some(config) => Some(*Env::new(config.clone())?),
            None => None,
        };
        let mut alg = *Alg::from_config(
            device,
            &alg_config,
            env.observation_space().iter().product::<usize>(),
            env.action_space().iter().product::<usize>(),
            &mut rng,
        )?;

        let summary = learn(
            &mut env,
            eval_env.as_mut(),
            &mut alg,
            &train_config,
            device,
            &mut rng,
        )?;

        write_summary(&path, n, &summary)?;
        alg.save(&path.join(format!("run_{n}_model.safetensors")))?;
        summaries.push(summary);
    }
    Ok(summaries)
}

/// Repeat an on-policy training run and store configs, per-episode
/// returns, evaluations and final weights under `data/<path>`.
pub fn run_experiment_on_policy<Alg, Env, Obs, Act>(
    experiment: &ExperimentConfig,
    env_config: Env::Config,
    eval_env_config: Option<Env::Config>,
    alg_config: Alg::Config,
    train_config: TrainConfig,
    device: &Device,
) -> Result<Vec<TrainingSummary>>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Env::Config: Clone + Serialize,
    Alg: OnPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: Serialize,
    Obs: TensorConvertible,
    Act: TensorConvertible,
{
    run_experiment::<Alg, Env>(
        experiment,
        env_config,
        eval_env_config,
        alg_config,
        train_config,
        device,
        learn_on_policy::<Alg, Env, Obs, Act>,
    )
}

/// Off-policy counterpart of [`run_experiment_on_policy`].
pub fn run_experiment_off_policy<Alg, Env, Obs, Act>(
    experiment: &ExperimentConfig,
    env_config: Env::Config,
    eval_env_config: Option<Env::Config>,
    alg_config: Alg::Config,
    train_config: TrainConfig,
    device: &Device,
) -> Result<Vec<TrainingSummary>>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Env::Config: Clone + Serialize,
    Alg: OffPolicyAlgorithm + SaveableAlgorithm,
    Alg::Config: OffPolicyConfig + Serialize,
    Obs: TensorConvertible,
    Act: TensorConvertible + Sampleable,
{
    run_experiment::<Alg, Env>(
        experiment,
        env_config,
        eval_env_config,
        alg_config,
        train_config,
        device,
        learn_off_policy::<Alg, Env, Obs, Act>,
    )
}
