use {
    super::evaluate::evaluate,
    crate::{
        agents::{
            configs::OffPolicyConfig,
            OffPolicyAlgorithm,
            OnPolicyAlgorithm,
        },
        envs::{
            Environment,
            Sampleable,
            TensorConvertible,
        },
        sde::progress_remaining,
        RunMode,
    },
    anyhow::Result,
    candle_core::{
        Device,
        Tensor,
    },
    rand::{
        rngs::StdRng,
        Rng,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    tracing::{
        info,
        warn,
    },
};

/// Options of the outer learn loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainConfig {
    // Environment steps to collect in total.
    pub total_timesteps: usize,
    // Evaluate every this many environment steps; 0 disables evaluation.
    pub eval_freq: usize,
    // Deterministic episodes per evaluation.
    pub n_eval_episodes: usize,
    // Log the episode return every this many episodes.
    pub log_interval: usize,
}

impl TrainConfig {
    pub fn new(total_timesteps: usize) -> Self {
        Self {
            total_timesteps,
            eval_freq: 0,
            n_eval_episodes: 5,
            log_interval: 1,
        }
    }

    pub fn with_eval(
        mut self,
        eval_freq: usize,
        n_eval_episodes: usize,
    ) -> Self {
        self.eval_freq = eval_freq;
        self.n_eval_episodes = n_eval_episodes;
        self
    }

    pub fn with_log_interval(
        mut self,
        log_interval: usize,
    ) -> Self {
        self.log_interval = log_interval.max(1);
        self
    }
}

/// What a learn loop observed.
#[derive(Clone, Debug, Default)]
pub struct TrainingSummary {
    pub timesteps: usize,
    pub episode_returns: Vec<f64>,
    pub successes: Vec<bool>,
    pub eval_timesteps: Vec<usize>,
    pub eval_returns: Vec<f64>,
}

impl TrainingSummary {
    fn end_episode(
        &mut self,
        episode_return: f64,
        terminated: bool,
        log_interval: usize,
    ) {
        self.episode_returns.push(episode_return);
        self.successes.push(terminated);
        let episode = self.episode_returns.len();
        if episode % log_interval == 0 {
            warn!("episode {episode} with total reward of {episode_return}");
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_if_due<Alg, Env, Obs, Act>(
    timestep: usize,
    config: &TrainConfig,
    env: &Env,
    eval_env: Option<&mut Env>,
    agent: &mut Alg,
    summary: &mut TrainingSummary,
    device: &Device,
    rng: &mut StdRng,
) -> Result<()>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Alg: crate::agents::Algorithm,
    Obs: TensorConvertible,
    Act: TensorConvertible,
{
    let eval_env = match eval_env {
        Some(eval_env) if config.eval_freq > 0 && timestep % config.eval_freq == 0 => eval_env,
        _ => return Ok(()),
    };
    eval_env.sync_statistics(env);
    let mean_return = evaluate(eval_env, agent, config.n_eval_episodes, device, rng)?;
    warn!("evaluation at timestep {timestep}: mean return {mean_return}");
    summary.eval_timesteps.push(timestep);
    summary.eval_returns.push(mean_return);
    Ok(())
}

/// Train an on-policy algorithm for `config.total_timesteps` steps.
///
/// Every outer update collects one rollout, reports training progress to
/// the agent and then trains on the rollout.
pub fn learn_on_policy<Alg, Env, Obs, Act>(
    env: &mut Env,
    mut eval_env: Option<&mut Env>,
    agent: &mut Alg,
    config: &TrainConfig,
    device: &Device,
    rng: &mut StdRng,
) -> Result<TrainingSummary>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Alg: OnPolicyAlgorithm,
    Obs: TensorConvertible,
    Act: TensorConvertible,
{
    warn!("action space: {:?}", env.action_space());
    warn!("observation space: {:?}", env.observation_space());

    let total = config.total_timesteps;
    let mut summary = TrainingSummary::default();
    let mut timestep = 0;
    let mut episode_return = 0.0;
    env.reset(rng.gen::<u64>())?;

    while timestep < total {
        agent.start_rollout(rng)?;
        let mut last_done = false;

        for _ in 0..agent.rollout_length() {
            let state = <Obs>::to_tensor(env.current_observation(), device)?;
            let action = agent.actions(&state, RunMode::Train, rng)?;
            let step = env.step(<Act>::from_tensor_pp(action.clone())?)?;
            timestep += 1;
            episode_return += step.reward;

            let done = step.done();
            let (terminated, truncated) = (step.terminated, step.truncated);
            let next_state = <Obs>::to_tensor(step.observation, device)?;
            agent.record(&state, &action, step.reward, &next_state, terminated, truncated)?;

            if done {
                summary.end_episode(episode_return, terminated, config.log_interval);
                episode_return = 0.0;
                env.reset(rng.gen::<u64>())?;
            }
            last_done = done;

            evaluate_if_due(
                timestep,
                config,
                env,
                eval_env.as_deref_mut(),
                agent,
                &mut summary,
                device,
                rng,
            )?;
            if timestep >= total {
                break;
            }
        }

        let last_state = <Obs>::to_tensor(env.current_observation(), device)?;
        agent.finish_rollout(&last_state, last_done)?;

        let progress = progress_remaining(timestep, total);
        if let Some(log_std) = agent.update_progress(progress, rng)? {
            info!("log_std scheduled to {log_std} at timestep {timestep}");
        }
        agent.train(rng)?;
    }

    summary.timesteps = timestep;
    Ok(summary)
}

/// Train an off-policy algorithm for `config.total_timesteps` steps.
///
/// The agent acts uniformly at random for its first `learning_starts`
/// steps. After each episode (and when the step budget runs out) training
/// progress is reported to the agent, then it trains.
pub fn learn_off_policy<Alg, Env, Obs, Act>(
    env: &mut Env,
    mut eval_env: Option<&mut Env>,
    agent: &mut Alg,
    config: &TrainConfig,
    device: &Device,
    rng: &mut StdRng,
) -> Result<TrainingSummary>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Alg: OffPolicyAlgorithm,
    Alg::Config: OffPolicyConfig,
    Obs: TensorConvertible,
    Act: TensorConvertible + Sampleable,
{
    warn!("action space: {:?}", env.action_space());
    warn!("observation space: {:?}", env.observation_space());

    let total = config.total_timesteps;
    let learning_starts = agent.config().learning_starts();
    let random_domain = vec![-1.0..=1.0; env.action_space().iter().product::<usize>()];
    let mut summary = TrainingSummary::default();
    let mut timestep = 0;

    while timestep < total {
        let mut episode_return = 0.0;
        env.reset(rng.gen::<u64>())?;

        loop {
            let state = &<Obs>::to_tensor(env.current_observation(), device)?;

            // select an action, or randomly sample one
            let action = &if timestep < learning_starts {
                <Act>::to_tensor(<Act>::sample(rng, &random_domain), device)?
            } else {
                agent.actions(state, RunMode::Train, rng)?
            };

            let step = env.step(<Act>::from_tensor_pp(action.clone())?)?;
            episode_return += step.reward;
            timestep += 1;

            let done = step.done();
            let terminated = step.terminated;
            agent.remember(
                state,
                action,
                &Tensor::new(vec![step.reward], device)?,
                &<Obs>::to_tensor(step.observation, device)?,
                &Tensor::new(vec![f64::from(u8::from(terminated))], device)?,
                done,
            );

            evaluate_if_due(
                timestep,
                config,
                env,
                eval_env.as_deref_mut(),
                agent,
                &mut summary,
                device,
                rng,
            )?;

            if done {
                summary.end_episode(episode_return, terminated, config.log_interval);
                break;
            }
            if timestep >= total {
                break;
            }
        }

        let progress = progress_remaining(timestep, total);
        if let Some(log_std) = agent.update_progress(progress, rng)? {
            info!("log_std scheduled to {log_std} at timestep {timestep}");
        }
        agent.train(rng)?;
    }

    summary.timesteps = timestep;
    Ok(summary)
}
