use {
    super::{
        checkpoint_store,
        clip_grad_norm,
        configs::A2CConfig,
        mlp,
        scalar,
        Algorithm,
        Hidden,
        OnPolicyAlgorithm,
        SaveableAlgorithm,
    },
    crate::{
        components::RolloutBuffer,
        sde::{
            GaussianDistribution,
            ResampleCadence,
            StateDependentExploration,
        },
        RunMode,
    },
    anyhow::{
        bail,
        Result,
    },
    candle_core::{
        DType,
        Device,
        Module,
        Tensor,
        Var,
    },
    candle_nn::{
        AdamW,
        Init,
        Optimizer,
        ParamsAdamW,
        Sequential,
        VarBuilder,
        VarMap,
    },
    rand::rngs::StdRng,
    std::path::Path,
    tracing::debug,
};

/// Synchronous advantage actor-critic.
///
/// Collects `n_steps` transitions, computes GAE advantages and takes a single
/// gradient step over the actor, the critic and the exploration scale. With
/// SDE the noise weights are drawn once per rollout (or every `sample_freq`
/// steps); otherwise actions get independent Gaussian noise with a learned,
/// state-independent `log_std`.
#[allow(clippy::upper_case_acronyms)]
pub struct A2C {
    config: A2CConfig,
    device: Device,
    varmap: VarMap,
    actor: Sequential,
    critic: Sequential,
    log_std: Option<Tensor>,
    exploration: Option<StateDependentExploration>,
    optimizer: AdamW,
    params: Vec<Var>,
    rollout: RolloutBuffer,
    episode_start: bool,
}

impl A2C {
    /// The action distribution for a batch of states.
    pub fn distribution(
        &self,
        states: &Tensor,
    ) -> Result<GaussianDistribution> {
        let mean = self.actor.forward(states)?;
        match (&self.exploration, &self.log_std) {
            (Some(exploration), _) => Ok(exploration.distribution(&mean, states)?),
            (None, Some(log_std)) => Ok(GaussianDistribution::new(mean, log_std.exp()?)),
            (None, None) => bail!("A2C has neither SDE nor a log_std parameter"),
        }
    }

    fn value(
        &self,
        state: &Tensor,
    ) -> Result<f64> {
        Ok(scalar(&self.critic.forward(&state.unsqueeze(0)?)?)?)
    }
}

impl Algorithm for A2C {
    type Config = A2CConfig;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn from_config(
        device: &Device,
        config: &A2CConfig,
        size_state: usize,
        size_action: usize,
        rng: &mut StdRng,
    ) -> Result<Box<Self>> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, device);
        let (h1, h2) = (config.hidden_1_size, config.hidden_2_size);

        let actor = mlp(
            &vb,
            "actor",
            &[(size_state, h1), (h1, h2), (h2, size_action)],
            Hidden::Tanh,
            false,
        )?;
        let critic = mlp(
            &vb,
            "critic",
            &[(size_state, h1), (h1, h2), (h2, 1)],
            Hidden::Tanh,
            false,
        )?;

        let sde = &config.sde;
        let (exploration, log_std) = if sde.use_sde {
            let mut exploration = StateDependentExploration::new(
                device,
                sde,
                size_state,
                size_action,
                ResampleCadence::PerRollout,
            )?;
            exploration.initialize(rng)?;
            (Some(exploration), None)
        } else {
            let log_std = vb.get_with_hints(size_action, "log-std", Init::Const(sde.log_std_init))?;
            (None, Some(log_std))
        };

        let mut params = varmap.all_vars();
        if let Some(exploration) = &exploration {
            if !exploration.has_scheduler() {
                params.extend(exploration.vars());
            }
        }
        let optimizer = AdamW::new(
            params.clone(),
            ParamsAdamW {
                lr: config.learning_rate,
                weight_decay: 0.0,
                ..Default::default()
            },
        )?;

        Ok(Box::new(Self {
            config: config.clone(),
            device: device.clone(),
            varmap,
            actor,
            critic,
            log_std,
            exploration,
            optimizer,
            params,
            rollout: RolloutBuffer::new(config.n_steps, config.gamma, config.gae_lambda),
            episode_start: true,
        }))
    }

    fn actions(
        &mut self,
        state: &Tensor,
        mode: RunMode,
        rng: &mut StdRng,
    ) -> Result<Tensor> {
        // Candle assumes a batch dimension, so when we don't have one we need
        // to pretend we do by un- and resqueezing the state tensor.
        let states = state.detach()?.unsqueeze(0)?;
        let mean = self.actor.forward(&states)?;
        let actions = match mode {
            RunMode::Test => mean,
            RunMode::Train => match (&mut self.exploration, &self.log_std) {
                (Some(exploration), _) => {
                    exploration.before_action(rng)?;
                    (mean + exploration.noise(&states)?)?
                }
                (None, Some(log_std)) => GaussianDistribution::new(mean, log_std.exp()?).sample(rng)?,
                (None, None) => bail!("A2C has neither SDE nor a log_std parameter"),
            },
        };
        Ok(actions.detach()?.squeeze(0)?)
    }

    fn train(
        &mut self,
        _rng: &mut StdRng,
    ) -> Result<()> {
        if self.rollout.is_empty() {
            return Ok(());
        }
        let batch = self.rollout.batch(&self.device)?;

        let values = self.critic.forward(&batch.states)?;
        let distribution = self.distribution(&batch.states)?;
        let log_prob = distribution.log_prob(&batch.actions)?.sum_keepdim(1)?;

        let mut advantages = batch.advantages;
        if self.config.normalize_advantage && self.rollout.len() > 1 {
            let mean = advantages.mean_all()?;
            let centered = advantages.broadcast_sub(&mean)?;
            let std = centered.sqr()?.mean_all()?.sqrt()?;
            advantages = centered.broadcast_div(&(std + 1e-8)?)?;
        }

        let policy_loss = (advantages * log_prob)?.mean_all()?.neg()?;
        let value_loss = (batch.returns - values)?.sqr()?.mean_all()?;
        let entropy_loss = distribution.entropy()?.sum_keepdim(1)?.mean_all()?.neg()?;
        let loss = ((&policy_loss + (&value_loss * self.config.vf_coef)?)?
            + (&entropy_loss * self.config.ent_coef)?)?;

        let loss_value = scalar(&loss)?;
        if !loss_value.is_finite() {
            bail!("A2C loss is not finite: {loss_value}");
        }

        let mut grads = loss.backward()?;
        let grad_norm = clip_grad_norm(&mut grads, &self.params, self.config.max_grad_norm)?;
        self.optimizer.step(&grads)?;
        self.rollout.reset();

        debug!(
            policy_loss = scalar(&policy_loss)?,
            value_loss = scalar(&value_loss)?,
            entropy_loss = scalar(&entropy_loss)?,
            grad_norm,
            "A2C update"
        );
        Ok(())
    }

    fn exploration(&self) -> Option<&StateDependentExploration> {
        self.exploration.as_ref()
    }

    fn exploration_mut(&mut self) -> Option<&mut StateDependentExploration> {
        self.exploration.as_mut()
    }
}

impl OnPolicyAlgorithm for A2C {
    fn rollout_length(&self) -> usize {
        self.config.n_steps
    }

    fn start_rollout(
        &mut self,
        rng: &mut StdRng,
    ) -> Result<()> {
        self.rollout.reset();
        if let Some(exploration) = &mut self.exploration {
            exploration.on_rollout_start(rng)?;
        }
        Ok(())
    }

    fn record(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: f64,
        next_state: &Tensor,
        terminated: bool,
        truncated: bool,
    ) -> Result<()> {
        let value = self.value(state)?;
        // a time limit is not a terminal state: bootstrap from the next state
        let reward = if truncated && !terminated {
            reward + self.config.gamma * self.value(next_state)?
        } else {
            reward
        };
        self.rollout
            .push(state, action, reward, self.episode_start, value);

        let done = terminated || truncated;
        self.episode_start = done;
        if let Some(exploration) = &mut self.exploration {
            exploration.after_step(done);
        }
        Ok(())
    }

    fn finish_rollout(
        &mut self,
        last_state: &Tensor,
        done: bool,
    ) -> Result<()> {
        let last_value = self.value(last_state)?;
        self.rollout.compute_returns_and_advantage(last_value, done);
        Ok(())
    }
}

impl SaveableAlgorithm for A2C {
    fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        checkpoint_store(&[&self.varmap], self.exploration.as_ref()).save(path)?;
        Ok(())
    }

    fn load(
        &mut self,
        path: &Path,
    ) -> Result<()> {
        let mut store = checkpoint_store(&[&self.varmap], self.exploration.as_ref());
        store.load(path)?;
        Ok(())
    }
}
