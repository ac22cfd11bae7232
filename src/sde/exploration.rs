use {
    super::{
        config::{
            ResampleCadence,
            SdeConfig,
        },
        error::{
            Result,
            SdeError,
        },
        gaussian::GaussianDistribution,
        generator::StateDependentNoiseGenerator,
        schedule::LogStdScheduler,
        weights::NoiseWeightDistribution,
    },
    candle_core::{
        Device,
        Tensor,
        Var,
    },
    rand::Rng,
    strum::Display,
    tracing::{
        debug,
        info,
    },
};

/// Schedule targets closer than this to the last applied value are ignored.
const SCHEDULE_TOLERANCE: f64 = 1e-8;

/// Lifecycle of the noise weight matrix inside a training loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum NoiseState {
    AwaitingNoise,
    NoiseActive,
    ResampleDue,
}

/// Training-loop side of SDE: owns the weight distribution and the current
/// noise epoch, and decides when to draw a new weight matrix.
///
/// Within one noise epoch every call to [`noise`](Self::noise) sees the same
/// `W`. A new epoch starts on the configured [`ResampleCadence`] or right
/// after the log-std schedule overwrote the scale.
///
/// The intended call order per environment step is
/// `before_action -> noise/distribution -> after_step`, with
/// `on_rollout_start` at the start of each on-policy rollout and
/// `on_update` once per outer update, strictly before any optimizer step.
pub struct StateDependentExploration {
    weights_dist: NoiseWeightDistribution,
    generator: StateDependentNoiseGenerator,
    cadence: ResampleCadence,
    scheduler: Option<LogStdScheduler>,
    state: NoiseState,
    weights: Option<Tensor>,
    steps_in_epoch: usize,
    epochs: usize,
    last_target: Option<f64>,
}

impl StateDependentExploration {
    pub fn new(
        device: &Device,
        config: &SdeConfig,
        state_dim: usize,
        action_dim: usize,
        default_cadence: ResampleCadence,
    ) -> Result<Self> {
        let weights_dist = NoiseWeightDistribution::new(
            device,
            state_dim,
            action_dim,
            config.log_std_init,
            config.full_std,
            config.sde_net_arch.as_deref(),
        )?;
        Ok(Self {
            weights_dist,
            generator: StateDependentNoiseGenerator::default(),
            cadence: config.cadence(default_cadence),
            scheduler: config.log_std_scheduler.clone(),
            state: NoiseState::AwaitingNoise,
            weights: None,
            steps_in_epoch: 0,
            epochs: 0,
            last_target: None,
        })
    }

    /// Draw the first weight matrix.
    pub fn initialize<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<()> {
        self.resample(rng)
    }

    pub fn state(&self) -> NoiseState {
        self.state
    }

    pub fn cadence(&self) -> ResampleCadence {
        self.cadence
    }

    /// Number of weight matrices drawn so far.
    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn has_scheduler(&self) -> bool {
        self.scheduler.is_some()
    }

    pub fn weights(&self) -> Option<&Tensor> {
        self.weights.as_ref()
    }

    pub fn log_std(&self) -> Result<Tensor> {
        self.weights_dist.log_std()
    }

    pub fn sigma_hat(&self) -> Result<Tensor> {
        self.weights_dist.sigma_hat()
    }

    /// Parameters of the scale, for joint optimization with the policy.
    pub fn vars(&self) -> Vec<Var> {
        self.weights_dist.vars()
    }

    pub fn weight_distribution(&self) -> &NoiseWeightDistribution {
        &self.weights_dist
    }

    /// Start a new noise epoch.
    pub fn resample<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<()> {
        self.weights = Some(self.weights_dist.sample(rng)?);
        self.state = NoiseState::NoiseActive;
        self.steps_in_epoch = 0;
        self.epochs += 1;
        debug!("Drew noise weights for epoch {}", self.epochs);
        Ok(())
    }

    pub fn on_rollout_start<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<()> {
        // weights drawn since the last step (e.g. by the schedule) are still unused
        let fresh = self.state == NoiseState::NoiseActive && self.steps_in_epoch == 0;
        if self.cadence == ResampleCadence::PerRollout && !fresh {
            self.state = NoiseState::ResampleDue;
        }
        self.before_action(rng)
    }

    /// Finish any pending resample so the next action sees fresh weights.
    pub fn before_action<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<()> {
        match self.state {
            NoiseState::NoiseActive => Ok(()),
            NoiseState::AwaitingNoise | NoiseState::ResampleDue => self.resample(rng),
        }
    }

    /// Account for one environment step and mark a resample as due when the
    /// cadence asks for one.
    pub fn after_step(
        &mut self,
        episode_done: bool,
    ) {
        if self.state != NoiseState::NoiseActive {
            return;
        }
        self.steps_in_epoch += 1;
        let due = match self.cadence {
            ResampleCadence::PerRollout => false,
            ResampleCadence::PerEpisode => episode_done,
            ResampleCadence::EveryNSteps(n) => self.steps_in_epoch >= n,
        };
        if due {
            self.state = NoiseState::ResampleDue;
        }
    }

    /// Evaluate the log-std schedule at `progress` and, when the target moved,
    /// overwrite the scale and immediately draw weights from it.
    ///
    /// Returns the applied target, or `None` without a schedule or when the
    /// target did not change.
    pub fn on_update<R: Rng + ?Sized>(
        &mut self,
        progress: f64,
        rng: &mut R,
    ) -> Result<Option<f64>> {
        let scheduler = match &self.scheduler {
            Some(scheduler) => scheduler,
            None => return Ok(None),
        };
        let target = scheduler.evaluate(progress)?;
        if let Some(last) = self.last_target {
            if (target - last).abs() <= SCHEDULE_TOLERANCE {
                return Ok(None);
            }
        }

        self.weights_dist.set_log_std(target)?;
        self.last_target = Some(target);
        info!("Scheduled log_std = {target} at progress {progress}");

        self.state = NoiseState::ResampleDue;
        self.resample(rng)?;
        Ok(Some(target))
    }

    fn current_weights(&self) -> Result<&Tensor> {
        match (&self.state, &self.weights) {
            (NoiseState::AwaitingNoise, _) | (_, None) => Err(SdeError::NoiseNotSampled),
            (_, Some(weights)) => Ok(weights),
        }
    }

    fn check_states(
        &self,
        states: &Tensor,
    ) -> Result<()> {
        let expected = self.weights_dist.state_dim();
        let found = states.dims().last().copied().unwrap_or(0);
        if found != expected {
            return Err(SdeError::StateDimension { expected, found });
        }
        Ok(())
    }

    /// `latent(state) @ W` with the weights of the current noise epoch.
    pub fn noise(
        &self,
        states: &Tensor,
    ) -> Result<Tensor> {
        self.check_states(states)?;
        let weights = self.current_weights()?;
        let latent = self.weights_dist.latent(states)?;
        Ok(self.generator.compute_noise(&latent, weights)?)
    }

    /// The action Gaussian around `mean` implied by the current scale.
    pub fn distribution(
        &self,
        mean: &Tensor,
        states: &Tensor,
    ) -> Result<GaussianDistribution> {
        self.check_states(states)?;
        let sigma_hat = self.weights_dist.sigma_hat()?;
        let latent = self.weights_dist.latent(states)?;
        Ok(self.generator.action_distribution(mean, &latent, &sigma_hat)?)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        candle_core::DType,
        rand::{
            rngs::StdRng,
            SeedableRng,
        },
    };

    fn exploration(
        config: &SdeConfig,
        cadence: ResampleCadence,
    ) -> Result<StateDependentExploration> {
        StateDependentExploration::new(&Device::Cpu, config, 3, 2, cadence)
    }

    fn weights(exploration: &StateDependentExploration) -> Vec<Vec<f64>> {
        exploration
            .weights()
            .expect("weights are sampled")
            .to_vec2::<f64>()
            .expect("weights are f64")
    }

    #[test]
    fn noise_requires_an_initial_sample() -> Result<()> {
        let mut exploration = exploration(&SdeConfig::enabled(0.0), ResampleCadence::PerRollout)?;
        let states = Tensor::ones((1, 3), DType::F64, &Device::Cpu)?;

        assert_eq!(exploration.state(), NoiseState::AwaitingNoise);
        assert!(matches!(exploration.noise(&states), Err(SdeError::NoiseNotSampled)));

        exploration.initialize(&mut StdRng::seed_from_u64(0))?;
        assert_eq!(exploration.state(), NoiseState::NoiseActive);
        assert_eq!(exploration.noise(&states)?.dims(), &[1, 2]);
        Ok(())
    }

    #[test]
    fn wrong_state_width_is_rejected() -> Result<()> {
        let mut exploration = exploration(&SdeConfig::enabled(0.0), ResampleCadence::PerRollout)?;
        exploration.initialize(&mut StdRng::seed_from_u64(0))?;
        let states = Tensor::ones((1, 4), DType::F64, &Device::Cpu)?;
        assert!(matches!(
            exploration.noise(&states),
            Err(SdeError::StateDimension { expected: 3, found: 4 })
        ));
        Ok(())
    }

    #[test]
    fn weights_are_held_for_a_whole_rollout() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1);
        let mut exploration = exploration(&SdeConfig::enabled(0.0), ResampleCadence::PerRollout)?;
        let states = Tensor::new(&[[0.3f64, -0.2, 0.9]], &Device::Cpu)?;

        exploration.on_rollout_start(&mut rng)?;
        let first_weights = weights(&exploration);
        let first_noise = exploration.noise(&states)?.to_vec2::<f64>()?;
        for step in 0..50 {
            exploration.before_action(&mut rng)?;
            assert_eq!(exploration.noise(&states)?.to_vec2::<f64>()?, first_noise);
            exploration.after_step(step % 10 == 9);
        }
        assert_eq!(weights(&exploration), first_weights);

        exploration.on_rollout_start(&mut rng)?;
        assert_ne!(weights(&exploration), first_weights);
        assert_eq!(exploration.epochs(), 2);
        Ok(())
    }

    #[test]
    fn per_episode_cadence_resamples_after_done() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(2);
        let mut exploration = exploration(&SdeConfig::enabled(0.0), ResampleCadence::PerEpisode)?;
        exploration.initialize(&mut rng)?;
        let first = weights(&exploration);

        exploration.after_step(false);
        exploration.before_action(&mut rng)?;
        assert_eq!(weights(&exploration), first);

        exploration.after_step(true);
        assert_eq!(exploration.state(), NoiseState::ResampleDue);
        exploration.before_action(&mut rng)?;
        assert_eq!(exploration.state(), NoiseState::NoiseActive);
        assert_ne!(weights(&exploration), first);
        Ok(())
    }

    #[test]
    fn sample_freq_overrides_the_default_cadence() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(3);
        let config = SdeConfig::enabled(0.0).with_sample_freq(4);
        let mut exploration = exploration(&config, ResampleCadence::PerEpisode)?;
        assert_eq!(exploration.cadence(), ResampleCadence::EveryNSteps(4));

        exploration.initialize(&mut rng)?;
        for _ in 0..12 {
            exploration.before_action(&mut rng)?;
            exploration.after_step(false);
        }
        exploration.before_action(&mut rng)?;
        assert_eq!(exploration.epochs(), 4);
        Ok(())
    }

    #[test]
    fn schedule_overwrites_scale_and_resamples() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(4);
        let config = SdeConfig::enabled(-2.0)
            .with_scheduler(LogStdScheduler::new(|progress| -2.0 * progress + 1.0));
        let mut exploration = exploration(&config, ResampleCadence::PerEpisode)?;
        exploration.initialize(&mut rng)?;
        let first = weights(&exploration);

        assert_eq!(exploration.on_update(1.0, &mut rng)?, Some(-1.0));
        assert_ne!(weights(&exploration), first);
        assert_eq!(exploration.epochs(), 2);

        // unchanged target: no overwrite, no new epoch
        assert_eq!(exploration.on_update(1.0, &mut rng)?, None);
        assert_eq!(exploration.epochs(), 2);

        assert_eq!(exploration.on_update(0.0, &mut rng)?, Some(1.0));
        assert_eq!(exploration.state(), NoiseState::NoiseActive);
        for value in exploration.log_std()?.flatten_all()?.to_vec1::<f64>()? {
            assert_eq!(value, 1.0);
        }
        Ok(())
    }

    #[test]
    fn scheduled_weights_serve_the_next_rollout() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(7);
        let config = SdeConfig::enabled(-2.0)
            .with_scheduler(LogStdScheduler::new(|progress| -2.0 * progress + 1.0));
        let mut exploration = exploration(&config, ResampleCadence::PerRollout)?;

        exploration.on_rollout_start(&mut rng)?;
        for _ in 0..5 {
            exploration.before_action(&mut rng)?;
            exploration.after_step(false);
        }
        assert_eq!(exploration.on_update(0.5, &mut rng)?, Some(0.0));
        let scheduled = weights(&exploration);
        assert_eq!(exploration.epochs(), 2);

        exploration.on_rollout_start(&mut rng)?;
        assert_eq!(weights(&exploration), scheduled);
        assert_eq!(exploration.epochs(), 2);
        Ok(())
    }

    #[test]
    fn network_noise_is_a_function_of_the_state() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(8);
        let config = SdeConfig::enabled(0.0).with_net_arch(Some(vec![32, 16]));
        let mut exploration = exploration(&config, ResampleCadence::PerRollout)?;
        exploration.initialize(&mut rng)?;
        assert_eq!(exploration.weights().map(|w| w.dims().to_vec()), Some(vec![16, 2]));

        let states = Tensor::new(&[[0.3f64, -0.2, 0.9], [-1.0, 0.5, 0.0]], &Device::Cpu)?;
        let noise = exploration.noise(&states)?.to_vec2::<f64>()?;
        assert_ne!(noise[0], noise[1]);
        assert_eq!(exploration.noise(&states)?.to_vec2::<f64>()?, noise);

        let mean = Tensor::zeros((2, 2), DType::F64, &Device::Cpu)?;
        let dist = exploration.distribution(&mean, &states)?;
        let std = dist.stddev().to_vec2::<f64>()?;
        assert_ne!(std[0], std[1]);
        Ok(())
    }

    #[test]
    fn no_schedule_leaves_scale_alone() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(5);
        let mut exploration = exploration(&SdeConfig::enabled(-0.5), ResampleCadence::PerEpisode)?;
        exploration.initialize(&mut rng)?;
        assert_eq!(exploration.on_update(0.0, &mut rng)?, None);
        for value in exploration.log_std()?.flatten_all()?.to_vec1::<f64>()? {
            assert_eq!(value, -0.5);
        }
        Ok(())
    }

    #[test]
    fn invalid_schedule_aborts_the_update() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(6);
        let config = SdeConfig::enabled(0.0).with_scheduler(LogStdScheduler::new(|_| f64::INFINITY));
        let mut exploration = exploration(&config, ResampleCadence::PerEpisode)?;
        exploration.initialize(&mut rng)?;
        assert!(matches!(
            exploration.on_update(0.5, &mut rng),
            Err(SdeError::ScheduleEvaluation { .. })
        ));
        Ok(())
    }
}
