use {
    super::{
        Environment,
        Step,
        VectorConvertible,
    },
    anyhow::Result,
    serde::{
        Deserialize,
        Serialize,
    },
    std::ops::RangeInclusive,
};

/// Running mean and variance over a stream of vectors (parallel Welford).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunningMeanStd {
    mean: Vec<f64>,
    var: Vec<f64>,
    count: f64,
}

impl RunningMeanStd {
    pub fn new(size: usize) -> Self {
        Self {
            mean: vec![0.0; size],
            var: vec![1.0; size],
            count: 1e-4,
        }
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn var(&self) -> &[f64] {
        &self.var
    }

    pub fn count(&self) -> f64 {
        self.count
    }

    /// Fold a single sample into the statistics.
    pub fn update(
        &mut self,
        sample: &[f64],
    ) {
        assert_eq!(sample.len(), self.mean.len());
        let total = self.count + 1.0;
        for ((mean, var), x) in self.mean.iter_mut().zip(self.var.iter_mut()).zip(sample) {
            let delta = x - *mean;
            let new_mean = *mean + delta / total;
            let m2 = *var * self.count + delta.powi(2) * self.count / total;
            *mean = new_mean;
            *var = m2 / total;
        }
        self.count = total;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizeConfig<C> {
    pub inner: C,
    pub norm_obs: bool,
    pub norm_reward: bool,
    /// Statistics are only updated while training.
    pub training: bool,
    pub gamma: f64,
    pub clip_obs: f64,
    pub clip_reward: f64,
    pub epsilon: f64,
}

impl<C> NormalizeConfig<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            norm_obs: true,
            norm_reward: true,
            training: true,
            gamma: 0.99,
            clip_obs: 10.0,
            clip_reward: 10.0,
            epsilon: 1e-8,
        }
    }

    /// Frozen statistics and raw rewards, as used for evaluation.
    pub fn for_evaluation(mut self) -> Self {
        self.training = false;
        self.norm_reward = false;
        self
    }
}

/// Observation and reward normalization around another [`Environment`].
///
/// Observations are standardized with a running mean/variance and clipped.
/// Rewards are divided by the running standard deviation of the discounted
/// return.
pub struct Normalize<E: Environment> {
    env: Box<E>,
    config: NormalizeConfig<E::Config>,
    obs_rms: RunningMeanStd,
    ret_rms: RunningMeanStd,
    returns: f64,
}

impl<E> Normalize<E>
where
    E: Environment,
    E::Observation: VectorConvertible,
{
    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn obs_rms(&self) -> &RunningMeanStd {
        &self.obs_rms
    }

    pub fn ret_rms(&self) -> &RunningMeanStd {
        &self.ret_rms
    }

    pub fn set_training(
        &mut self,
        training: bool,
    ) {
        self.config.training = training;
    }

    fn normalize_observation(
        &self,
        observation: E::Observation,
    ) -> E::Observation {
        self.normalize_vec(E::Observation::to_vec(observation))
    }

    fn normalize_vec(
        &self,
        raw: Vec<f64>,
    ) -> E::Observation {
        if !self.config.norm_obs {
            return E::Observation::from_vec(raw);
        }
        let clip = self.config.clip_obs;
        let normalized = raw
            .into_iter()
            .zip(self.obs_rms.mean.iter().zip(&self.obs_rms.var))
            .map(|(x, (mean, var))| {
                ((x - mean) / (var + self.config.epsilon).sqrt()).clamp(-clip, clip)
            })
            .collect();
        E::Observation::from_vec(normalized)
    }

    fn observe(
        &mut self,
        observation: E::Observation,
    ) -> E::Observation {
        let raw = E::Observation::to_vec(observation);
        if self.config.training && self.config.norm_obs {
            self.obs_rms.update(&raw);
        }
        self.normalize_vec(raw)
    }

    fn normalize_reward(
        &mut self,
        reward: f64,
        done: bool,
    ) -> f64 {
        if !self.config.norm_reward {
            return reward;
        }
        self.returns = self.returns * self.config.gamma + reward;
        if self.config.training {
            self.ret_rms.update(&[self.returns]);
        }
        if done {
            self.returns = 0.0;
        }
        let clip = self.config.clip_reward;
        (reward / (self.ret_rms.var[0] + self.config.epsilon).sqrt()).clamp(-clip, clip)
    }
}

impl<E> Environment for Normalize<E>
where
    E: Environment,
    E::Config: Clone,
    E::Observation: VectorConvertible,
{
    type Config = NormalizeConfig<E::Config>;
    type Action = E::Action;
    type Observation = E::Observation;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn new(config: Self::Config) -> Result<Box<Self>> {
        let env = E::new(config.inner.clone())?;
        let size: usize = env.observation_space().iter().product();
        Ok(Box::new(Self {
            env,
            config,
            obs_rms: RunningMeanStd::new(size),
            ret_rms: RunningMeanStd::new(1),
            returns: 0.0,
        }))
    }

    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Self::Observation> {
        self.returns = 0.0;
        let observation = self.env.reset(seed)?;
        Ok(self.observe(observation))
    }

    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<Step<Self::Observation, Self::Action>> {
        let step = self.env.step(action)?;
        let done = step.done();
        let reward = self.normalize_reward(step.reward, done);
        Ok(Step {
            observation: self.observe(step.observation),
            action: step.action,
            reward,
            terminated: step.terminated,
            truncated: step.truncated,
        })
    }

    fn timelimit(&self) -> usize {
        self.env.timelimit()
    }

    fn action_space(&self) -> Vec<usize> {
        self.env.action_space()
    }

    fn action_domain(&self) -> Vec<RangeInclusive<f64>> {
        self.env.action_domain()
    }

    fn observation_space(&self) -> Vec<usize> {
        self.env.observation_space()
    }

    fn observation_domain(&self) -> Vec<RangeInclusive<f64>> {
        let clip = self.config.clip_obs;
        if self.config.norm_obs {
            vec![-clip..=clip; self.obs_rms.mean.len()]
        } else {
            self.env.observation_domain()
        }
    }

    fn current_observation(&self) -> Self::Observation {
        self.normalize_observation(self.env.current_observation())
    }

    fn sync_statistics(
        &mut self,
        source: &Self,
    ) {
        self.obs_rms = source.obs_rms.clone();
        self.ret_rms = source.ret_rms.clone();
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::envs::{
            PendulumAction,
            PendulumConfig,
            PendulumEnv,
            PendulumObservation,
        },
    };

    #[test]
    fn running_statistics_match_batch_statistics() {
        let samples = [[1.0, -2.0], [3.0, 0.0], [5.0, 2.0], [7.0, 4.0]];
        let mut rms = RunningMeanStd::new(2);
        for sample in &samples {
            rms.update(sample);
        }
        assert!((rms.mean()[0] - 4.0).abs() < 1e-3);
        assert!((rms.mean()[1] - 1.0).abs() < 1e-3);
        assert!((rms.var()[0] - 5.0).abs() < 1e-2);
        assert!((rms.var()[1] - 5.0).abs() < 1e-2);
    }

    #[test]
    fn observations_are_clipped() -> Result<()> {
        let mut config = NormalizeConfig::new(PendulumConfig::default());
        config.clip_obs = 0.5;
        let mut env = *Normalize::<PendulumEnv>::new(config)?;
        env.reset(0)?;
        for _ in 0..50 {
            let step = env.step(PendulumAction::from_vec(vec![2.0]))?;
            for x in PendulumObservation::to_vec(step.observation) {
                assert!(x.abs() <= 0.5);
            }
        }
        Ok(())
    }

    #[test]
    fn frozen_statistics_are_not_updated() -> Result<()> {
        let config = NormalizeConfig::new(PendulumConfig::default()).for_evaluation();
        let mut env = *Normalize::<PendulumEnv>::new(config)?;
        let before = env.obs_rms().clone();
        env.reset(0)?;
        let step = env.step(PendulumAction::from_vec(vec![1.0]))?;
        assert_eq!(env.obs_rms(), &before);
        assert!(step.reward <= 0.0);
        Ok(())
    }

    #[test]
    fn statistics_can_be_copied_to_an_evaluation_env() -> Result<()> {
        let mut train = *Normalize::<PendulumEnv>::new(NormalizeConfig::new(PendulumConfig::default()))?;
        train.reset(0)?;
        for _ in 0..10 {
            train.step(PendulumAction::from_vec(vec![0.0]))?;
        }
        let config = NormalizeConfig::new(PendulumConfig::default()).for_evaluation();
        let mut eval = *Normalize::<PendulumEnv>::new(config)?;
        eval.sync_statistics(&train);
        assert_eq!(eval.obs_rms(), train.obs_rms());
        Ok(())
    }
}
