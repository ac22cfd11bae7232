use {
    anyhow::Result,
    candle_core::Device,
    gsde_rl::{
        agents::{
            configs::{
                A2CConfig,
                TD3Config,
            },
            Algorithm,
            A2C,
            TD3,
        },
        engines::{
            learn_off_policy,
            learn_on_policy,
            run_experiment_off_policy,
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
        },
        sde::{
            LogStdScheduler,
            SdeConfig,
        },
    },
    rand::{
        rngs::StdRng,
        SeedableRng,
    },
};

fn log_std<Alg: Algorithm>(agent: &Alg) -> Result<Vec<f64>> {
    let exploration = agent.exploration().expect("SDE is enabled");
    Ok(exploration.log_std()?.flatten_all()?.to_vec1::<f64>()?)
}

fn small_td3(sde: SdeConfig) -> TD3Config {
    TD3Config {
        hidden_1_size: 32,
        hidden_2_size: 32,
        training_batch_size: 32,
        training_iterations: Some(20),
        learning_starts: 100,
        sde,
        ..TD3Config::pendulum()
    }
}

#[test]
fn scheduled_log_std_ends_at_the_final_target() -> Result<()> {
    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(0);
    let scheduler = LogStdScheduler::new(|progress| -2.0 * progress + 1.0);
    let config = small_td3(SdeConfig::enabled(-2.0).with_scheduler(scheduler));

    let mut env = *PendulumEnv::new(PendulumConfig::default())?;
    let mut eval_env = *PendulumEnv::new(PendulumConfig::default())?;
    let mut agent = *TD3::from_config(&device, &config, 3, 1, &mut rng)?;

    let summary = learn_off_policy(
        &mut env,
        Some(&mut eval_env),
        &mut agent,
        &TrainConfig::new(1000).with_eval(500, 1),
        &device,
        &mut rng,
    )?;

    assert_eq!(summary.timesteps, 1000);
    assert_eq!(summary.eval_timesteps, vec![500, 1000]);
    assert!(log_std(&agent)?
        .iter()
        .all(|value| (value - 1.0).abs() < 1e-6));
    Ok(())
}

#[test]
fn a2c_learns_on_normalized_mountain_car() -> Result<()> {
    let device = Device::Cpu;
    for (seed, net_arch) in [(0, None), (1, Some(vec![32, 16]))] {
        let mut rng = StdRng::seed_from_u64(seed);
        let config = A2CConfig {
            n_steps: 200,
            ent_coef: 0.0,
            learning_rate: 3e-4,
            sde: SdeConfig::enabled(0.0).with_net_arch(net_arch),
            ..A2CConfig::mountain_car()
        };

        let env_config = NormalizeConfig::new(MountainCarConfig::default());
        let mut env = *Normalize::<MountainCarEnv>::new(env_config.clone())?;
        let mut eval_env = *Normalize::<MountainCarEnv>::new(env_config.for_evaluation())?;
        let mut agent = *A2C::from_config(&device, &config, 2, 1, &mut rng)?;

        let summary = learn_on_policy(
            &mut env,
            Some(&mut eval_env),
            &mut agent,
            &TrainConfig::new(1000).with_eval(500, 1),
            &device,
            &mut rng,
        )?;

        assert_eq!(summary.timesteps, 1000);
        assert_eq!(summary.eval_timesteps, vec![500, 1000]);
        assert!(summary.eval_returns.iter().all(|r| r.is_finite()));
        assert_eq!(eval_env.obs_rms().mean(), env.obs_rms().mean());
        assert!(log_std(&agent)?.iter().all(|value| value.is_finite()));
    }
    Ok(())
}

#[test]
fn td3_explores_with_state_dependent_noise() -> Result<()> {
    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(2);
    let config = small_td3(SdeConfig::enabled(-2.0));

    let mut env = *PendulumEnv::new(PendulumConfig::default())?;
    let mut agent = *TD3::from_config(&device, &config, 3, 1, &mut rng)?;
    let epochs_before = agent.exploration().map(|e| e.epochs());

    let summary = learn_off_policy(
        &mut env,
        None,
        &mut agent,
        &TrainConfig::new(600),
        &device,
        &mut rng,
    )?;

    assert_eq!(summary.episode_returns.len(), 3);
    assert!(summary.eval_returns.is_empty());
    // one new noise epoch per finished episode, drawn lazily on the next action
    assert!(agent.exploration().map(|e| e.epochs()) > epochs_before);
    assert!(log_std(&agent)?.iter().all(|value| value.is_finite()));
    Ok(())
}

#[test]
fn td3_without_sde_falls_back_to_ou_noise() -> Result<()> {
    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(3);
    let config = small_td3(SdeConfig::default());

    let mut env = *PendulumEnv::new(PendulumConfig::default())?;
    let mut agent = *TD3::from_config(&device, &config, 3, 1, &mut rng)?;
    assert!(agent.exploration().is_none());

    let summary = learn_off_policy(
        &mut env,
        None,
        &mut agent,
        &TrainConfig::new(400),
        &device,
        &mut rng,
    )?;
    assert_eq!(summary.episode_returns.len(), 2);
    assert!(summary.episode_returns.iter().all(|r| r.is_finite() && *r <= 0.0));
    Ok(())
}

#[test]
fn experiments_write_results_and_refuse_to_overwrite() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let experiment = ExperimentConfig {
        path: dir.path().join("td3_pendulum"),
        n_repetitions: 2,
        seed: 7,
    };
    let config = small_td3(SdeConfig::enabled(-2.0));
    let train_config = TrainConfig::new(200).with_eval(200, 1);

    let summaries = run_experiment_off_policy::<TD3, PendulumEnv, _, _>(
        &experiment,
        PendulumConfig::default(),
        Some(PendulumConfig::default()),
        config.clone(),
        train_config.clone(),
        &Device::Cpu,
    )?;
    assert_eq!(summaries.len(), 2);

    for file in [
        "config_algorithm.ron",
        "config_environment.ron",
        "config_training.ron",
        "run_0_episodes.parquet",
        "run_1_evaluations.parquet",
        "run_1_model.safetensors",
    ] {
        assert!(experiment.path.join(file).exists(), "missing {file}");
    }

    let again = run_experiment_off_policy::<TD3, PendulumEnv, _, _>(
        &experiment,
        PendulumConfig::default(),
        None,
        config,
        train_config,
        &Device::Cpu,
    );
    assert!(again.is_err());
    Ok(())
}
