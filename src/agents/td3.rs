use {
    super::{
        checkpoint_store,
        configs::TD3Config,
        mlp,
        scalar,
        track,
        vars_with_prefix,
        Algorithm,
        Hidden,
        OffPolicyAlgorithm,
        SaveableAlgorithm,
    },
    crate::{
        components::{
            OuNoise,
            ReplayBuffer,
        },
        sde::{
            standard_normal,
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
    },
    candle_nn::{
        AdamW,
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

struct Actor {
    varmap: VarMap,
    vb: VarBuilder<'static>,
    network: Sequential,
    target_network: Sequential,
    dims: Vec<(usize, usize)>,
}

impl Actor {
    fn new(
        device: &Device,
        dtype: DType,
        dims: &[(usize, usize)],
    ) -> candle_core::Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);

        let network = mlp(&vb, "actor", dims, Hidden::Relu, true)?;
        let target_network = mlp(&vb, "target-actor", dims, Hidden::Relu, true)?;

        // this sets the two networks to be equal to each other using tau = 1.0
        track(&mut varmap, &vb, "target-actor", "actor", dims, 1.0)?;

        Ok(Self {
            varmap,
            vb,
            network,
            target_network,
            dims: dims.to_vec(),
        })
    }

    fn forward(
        &self,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.network.forward(state)
    }

    fn target_forward(
        &self,
        state: &Tensor,
    ) -> candle_core::Result<Tensor> {
        self.target_network.forward(state)
    }

    fn track(
        &mut self,
        tau: f64,
    ) -> candle_core::Result<()> {
        track(
            &mut self.varmap,
            &self.vb,
            "target-actor",
            "actor",
            &self.dims,
            tau,
        )
    }
}

/// Two independent Q-networks, each with its own target copy.
struct TwinCritic {
    varmap: VarMap,
    vb: VarBuilder<'static>,
    networks: [Sequential; 2],
    target_networks: [Sequential; 2],
    dims: Vec<(usize, usize)>,
}

impl TwinCritic {
    const PREFIXES: [&'static str; 2] = ["critic1", "critic2"];
    const TARGET_PREFIXES: [&'static str; 2] = ["target-critic1", "target-critic2"];

    fn new(
        device: &Device,
        dtype: DType,
        dims: &[(usize, usize)],
    ) -> candle_core::Result<Self> {
        let mut varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, dtype, device);

        let networks = [
            mlp(&vb, Self::PREFIXES[0], dims, Hidden::Relu, false)?,
            mlp(&vb, Self::PREFIXES[1], dims, Hidden::Relu, false)?,
        ];
        let target_networks = [
            mlp(&vb, Self::TARGET_PREFIXES[0], dims, Hidden::Relu, false)?,
            mlp(&vb, Self::TARGET_PREFIXES[1], dims, Hidden::Relu, false)?,
        ];
        for (target, network) in Self::TARGET_PREFIXES.iter().zip(Self::PREFIXES) {
            track(&mut varmap, &vb, target, network, dims, 1.0)?;
        }

        Ok(Self {
            varmap,
            vb,
            networks,
            target_networks,
            dims: dims.to_vec(),
        })
    }

    fn q(
        &self,
        index: usize,
        state: &Tensor,
        action: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        self.networks[index].forward(&xs)
    }

    /// The smaller of the two target estimates.
    fn target_min(
        &self,
        state: &Tensor,
        action: &Tensor,
    ) -> candle_core::Result<Tensor> {
        let xs = Tensor::cat(&[action, state], 1)?;
        let q1 = self.target_networks[0].forward(&xs)?;
        let q2 = self.target_networks[1].forward(&xs)?;
        q1.minimum(&q2)
    }

    fn track(
        &mut self,
        tau: f64,
    ) -> candle_core::Result<()> {
        for (target, network) in Self::TARGET_PREFIXES.iter().zip(Self::PREFIXES) {
            track(&mut self.varmap, &self.vb, target, network, &self.dims, tau)?;
        }
        Ok(())
    }
}

/// Twin Delayed DDPG.
///
/// With SDE the behaviour policy is `mu(s) + s @ W`, with `W` redrawn per
/// episode (or every `sample_freq` steps). Unless a scheduler owns
/// `log_std`, it is trained on replayed transitions by maximizing the
/// advantage-weighted log-likelihood of the stored actions, with advantage
/// `Q1(s, a) - Q1(s, mu(s))`.
#[allow(clippy::upper_case_acronyms)]
pub struct TD3 {
    config: TD3Config,
    actor: Actor,
    actor_optim: AdamW,
    critic: TwinCritic,
    critic_optim: AdamW,
    exploration: Option<StateDependentExploration>,
    sde_optim: Option<AdamW>,
    ou_noise: OuNoise,
    ou_reset_pending: bool,
    replay_buffer: ReplayBuffer,
    steps_since_train: usize,
    total_steps: usize,
    updates: usize,
}

impl TD3 {
    pub fn actor_forward_item(
        &self,
        state: &Tensor,
    ) -> Result<Tensor> {
        Ok(self.actor.forward(&state.detach()?.unsqueeze(0)?)?.squeeze(0)?)
    }

    /// Advantage-weighted log-likelihood step on `log_std`.
    fn train_sde(
        &mut self,
        states: &Tensor,
        actions: &Tensor,
    ) -> Result<()> {
        let (exploration, optimizer) = match (&self.exploration, &mut self.sde_optim) {
            (Some(exploration), Some(optimizer)) => (exploration, optimizer),
            _ => return Ok(()),
        };

        let mean = self.actor.forward(states)?.detach()?;
        let advantage = (self.critic.q(0, states, actions)? - self.critic.q(0, states, &mean)?)?
            .detach()?;
        let log_prob = exploration
            .distribution(&mean, states)?
            .log_prob(actions)?
            .sum_keepdim(1)?;
        let sde_loss = (advantage * log_prob)?.mean_all()?.neg()?;
        optimizer.backward_step(&sde_loss)?;
        debug!(sde_loss = scalar(&sde_loss)?, "TD3 log_std update");
        Ok(())
    }
}

impl Algorithm for TD3 {
    type Config = TD3Config;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn from_config(
        device: &Device,
        config: &TD3Config,
        size_state: usize,
        size_action: usize,
        rng: &mut StdRng,
    ) -> Result<Box<Self>> {
        let (h1, h2) = (config.hidden_1_size, config.hidden_2_size);
        let params = |lr: f64| ParamsAdamW {
            lr,
            weight_decay: 0.0,
            ..Default::default()
        };

        let actor = Actor::new(
            device,
            DType::F64,
            &[(size_state, h1), (h1, h2), (h2, size_action)],
        )?;
        let actor_optim = AdamW::new(
            vars_with_prefix(&actor.varmap, "actor"),
            params(config.actor_learning_rate),
        )?;

        let critic = TwinCritic::new(
            device,
            DType::F64,
            &[(size_state + size_action, h1), (h1, h2), (h2, 1)],
        )?;
        let critic_optim = AdamW::new(
            vars_with_prefix(&critic.varmap, "critic"),
            params(config.critic_learning_rate),
        )?;

        let (exploration, sde_optim) = if config.sde.use_sde {
            let mut exploration = StateDependentExploration::new(
                device,
                &config.sde,
                size_state,
                size_action,
                ResampleCadence::PerEpisode,
            )?;
            exploration.initialize(rng)?;
            let sde_optim = if exploration.has_scheduler() {
                None
            } else {
                Some(AdamW::new(exploration.vars(), params(config.sde_learning_rate))?)
            };
            (Some(exploration), sde_optim)
        } else {
            (None, None)
        };

        Ok(Box::new(Self {
            config: config.clone(),
            actor,
            actor_optim,
            critic,
            critic_optim,
            exploration,
            sde_optim,
            ou_noise: OuNoise::new(
                config.ou_mu,
                config.ou_theta,
                config.ou_sigma,
                size_action,
                device,
            )?,
            ou_reset_pending: false,
            replay_buffer: ReplayBuffer::new(config.replay_buffer_capacity),
            steps_since_train: 0,
            total_steps: 0,
            updates: 0,
        }))
    }

    fn actions(
        &mut self,
        state: &Tensor,
        mode: RunMode,
        rng: &mut StdRng,
    ) -> Result<Tensor> {
        let states = state.detach()?.unsqueeze(0)?;
        let mean = self.actor.forward(&states)?;
        let actions = match (mode, &mut self.exploration) {
            (RunMode::Test, _) => mean,
            (RunMode::Train, Some(exploration)) => {
                exploration.before_action(rng)?;
                (mean + exploration.noise(&states)?)?
            }
            (RunMode::Train, None) => {
                if self.ou_reset_pending {
                    self.ou_noise.reset()?;
                    self.ou_reset_pending = false;
                }
                mean.broadcast_add(&self.ou_noise.sample(rng)?)?
            }
        };
        Ok(actions.clamp(-1.0, 1.0)?.detach()?.squeeze(0)?)
    }

    fn train(
        &mut self,
        rng: &mut StdRng,
    ) -> Result<()> {
        let iterations = self
            .config
            .training_iterations
            .unwrap_or(self.steps_since_train);
        self.steps_since_train = 0;
        if self.total_steps <= self.config.learning_starts {
            return Ok(());
        }

        for _ in 0..iterations {
            let batch = match self
                .replay_buffer
                .random_batch(self.config.training_batch_size, rng)?
            {
                Some(batch) => batch,
                None => return Ok(()),
            };

            // target policy smoothing
            let next_actions = self.actor.target_forward(&batch.next_states)?;
            let noise = (standard_normal(rng, next_actions.dims(), next_actions.device())?
                * self.config.target_policy_noise)?
                .clamp(-self.config.target_noise_clip, self.config.target_noise_clip)?;
            let next_actions = (next_actions + noise)?.clamp(-1.0, 1.0)?;

            let q_target = self.critic.target_min(&batch.next_states, &next_actions)?;
            let not_done = (1.0 - &batch.terminateds)?;
            let q_target = (&batch.rewards + (self.config.gamma * (not_done * q_target)?)?)?
                .detach()?;

            let q1 = self.critic.q(0, &batch.states, &batch.actions)?;
            let q2 = self.critic.q(1, &batch.states, &batch.actions)?;
            let critic_loss = ((&q_target - q1)?.sqr()?.mean_all()?
                + (&q_target - q2)?.sqr()?.mean_all()?)?;
            let critic_loss_value = scalar(&critic_loss)?;
            if !critic_loss_value.is_finite() {
                bail!("TD3 critic loss is not finite: {critic_loss_value}");
            }
            self.critic_optim.backward_step(&critic_loss)?;
            self.updates += 1;

            if self.updates % self.config.policy_delay == 0 {
                let actor_loss = self
                    .critic
                    .q(0, &batch.states, &self.actor.forward(&batch.states)?)?
                    .mean_all()?
                    .neg()?;
                self.actor_optim.backward_step(&actor_loss)?;

                self.critic.track(self.config.tau)?;
                self.actor.track(self.config.tau)?;
                debug!(
                    critic_loss = critic_loss_value,
                    actor_loss = scalar(&actor_loss)?,
                    "TD3 update"
                );
            }

            self.train_sde(&batch.states, &batch.actions)?;
        }
        Ok(())
    }

    fn exploration(&self) -> Option<&StateDependentExploration> {
        self.exploration.as_ref()
    }

    fn exploration_mut(&mut self) -> Option<&mut StateDependentExploration> {
        self.exploration.as_mut()
    }
}

impl OffPolicyAlgorithm for TD3 {
    fn remember(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: &Tensor,
        next_state: &Tensor,
        terminated: &Tensor,
        episode_done: bool,
    ) {
        debug!(
            concat!(
                "\nPushing to replay buffer:",
                "\n{state:?}",
                "\n{action:?}",
                "\n{reward:?}",
                "\n{next_state:?}",
            ),
            state = state,
            action = action,
            reward = reward,
            next_state = next_state,
        );
        self.replay_buffer
            .push(state, action, reward, next_state, terminated);
        self.steps_since_train += 1;
        self.total_steps += 1;

        if let Some(exploration) = &mut self.exploration {
            exploration.after_step(episode_done);
        }
        if episode_done && self.exploration.is_none() {
            self.ou_reset_pending = true;
        }
    }

    fn replay_buffer(&self) -> &ReplayBuffer {
        &self.replay_buffer
    }
}

impl SaveableAlgorithm for TD3 {
    fn save(
        &self,
        path: &Path,
    ) -> Result<()> {
        checkpoint_store(
            &[&self.actor.varmap, &self.critic.varmap],
            self.exploration.as_ref(),
        )
        .save(path)?;
        Ok(())
    }

    fn load(
        &mut self,
        path: &Path,
    ) -> Result<()> {
        let mut store = checkpoint_store(
            &[&self.actor.varmap, &self.critic.varmap],
            self.exploration.as_ref(),
        );
        store.load(path)?;
        Ok(())
    }
}
