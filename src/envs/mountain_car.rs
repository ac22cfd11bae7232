use {
    super::{
        Environment,
        Sampleable,
        Step,
        TensorConvertible,
        VectorConvertible,
    },
    anyhow::Result,
    rand::{
        rngs::StdRng,
        Rng,
        RngCore,
        SeedableRng,
    },
    serde::{
        Deserialize,
        Serialize,
    },
    std::ops::RangeInclusive,
};

/// An underpowered car in a valley that has to build momentum to reach the
/// flag on the right hill, with a continuous force action.
///
/// Dynamics and reward follow the Gymnasium MountainCarContinuous-v0
/// environment: `-0.1 * force^2` per step and `+100` on reaching the goal.
pub struct MountainCarEnv {
    config: MountainCarConfig,
    position: f64,
    velocity: f64,
    steps: usize,
    rng: StdRng,
}

/// The configuration struct for the [`MountainCarEnv`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MountainCarConfig {
    pub timelimit: usize,
    pub power: f64,
    pub min_position: f64,
    pub max_position: f64,
    pub max_speed: f64,
    pub goal_position: f64,
    pub goal_velocity: f64,
}
impl Default for MountainCarConfig {
    fn default() -> Self {
        Self {
            timelimit: 999,
            power: 0.0015,
            min_position: -1.2,
            max_position: 0.6,
            max_speed: 0.07,
            goal_position: 0.45,
            goal_velocity: 0.0,
        }
    }
}

/// The action type for the [`MountainCarEnv`]: the force in \[-1.0, 1.0\].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountainCarAction {
    force: f64,
}
impl Sampleable for MountainCarAction {
    /// This function panics if the number of ranges in the domain is not 1.
    fn sample(
        rng: &mut dyn RngCore,
        domain: &[RangeInclusive<f64>],
    ) -> Self {
        assert!(domain.len() == 1);
        Self {
            force: rng.gen_range(domain[0].clone()),
        }
    }
}
impl VectorConvertible for MountainCarAction {
    /// Clamp the force to \[-1.0, 1.0\].
    fn from_vec_pp(mut value: Vec<f64>) -> Self {
        value[0] = value[0].clamp(-1.0, 1.0);
        Self::from_vec(value)
    }

    /// This function panics if the number of elements in the Vec is not 1.
    fn from_vec(value: Vec<f64>) -> Self {
        assert!(value.len() == 1);
        Self { force: value[0] }
    }

    fn to_vec(value: Self) -> Vec<f64> {
        vec![value.force]
    }
}
impl TensorConvertible for MountainCarAction {}

/// The observation type for the [`MountainCarEnv`]: `[position, velocity]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MountainCarObservation {
    position: f64,
    velocity: f64,
}
impl VectorConvertible for MountainCarObservation {
    fn from_vec_pp(value: Vec<f64>) -> Self {
        Self::from_vec(value)
    }

    /// This function panics if the number of elements in the Vec is not 2.
    fn from_vec(value: Vec<f64>) -> Self {
        assert!(value.len() == 2);
        Self {
            position: value[0],
            velocity: value[1],
        }
    }

    fn to_vec(value: Self) -> Vec<f64> {
        vec![value.position, value.velocity]
    }
}
impl TensorConvertible for MountainCarObservation {}

impl MountainCarEnv {
    fn observation(&self) -> MountainCarObservation {
        MountainCarObservation {
            position: self.position,
            velocity: self.velocity,
        }
    }
}

impl Environment for MountainCarEnv {
    type Config = MountainCarConfig;
    type Action = MountainCarAction;
    type Observation = MountainCarObservation;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn new(config: Self::Config) -> Result<Box<Self>> {
        Ok(Box::new(Self {
            config,
            position: -0.5,
            velocity: 0.0,
            steps: 0,
            rng: StdRng::seed_from_u64(0),
        }))
    }

    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Self::Observation> {
        self.rng = StdRng::seed_from_u64(seed);
        self.position = self.rng.gen_range(-0.6..=-0.4);
        self.velocity = 0.0;
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<Step<Self::Observation, Self::Action>> {
        let config = &self.config;
        let force = action.force.clamp(-1.0, 1.0);

        self.velocity += force * config.power - 0.0025 * (3.0 * self.position).cos();
        self.velocity = self.velocity.clamp(-config.max_speed, config.max_speed);
        self.position += self.velocity;
        self.position = self.position.clamp(config.min_position, config.max_position);
        if self.position == config.min_position && self.velocity < 0.0 {
            self.velocity = 0.0;
        }
        self.steps += 1;

        let terminated = self.position >= config.goal_position
            && self.velocity >= config.goal_velocity;
        let mut reward = -0.1 * force.powi(2);
        if terminated {
            reward += 100.0;
        }

        Ok(Step {
            observation: self.observation(),
            action,
            reward,
            terminated,
            truncated: !terminated && self.steps >= config.timelimit,
        })
    }

    fn timelimit(&self) -> usize {
        self.config.timelimit
    }

    fn action_space(&self) -> Vec<usize> {
        vec![1]
    }

    fn action_domain(&self) -> Vec<RangeInclusive<f64>> {
        vec![-1.0..=1.0]
    }

    fn observation_space(&self) -> Vec<usize> {
        vec![2]
    }

    fn observation_domain(&self) -> Vec<RangeInclusive<f64>> {
        vec![
            self.config.min_position..=self.config.max_position,
            -self.config.max_speed..=self.config.max_speed,
        ]
    }

    fn current_observation(&self) -> Self::Observation {
        self.observation()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_car_never_reaches_the_goal() -> Result<()> {
        let mut env = *MountainCarEnv::new(MountainCarConfig::default())?;
        env.reset(1)?;
        let mut steps = 0;
        loop {
            let step = env.step(MountainCarAction::from_vec(vec![0.0]))?;
            steps += 1;
            assert!(!step.terminated);
            assert_eq!(step.reward, 0.0);
            if step.truncated {
                break;
            }
        }
        assert_eq!(steps, 999);
        Ok(())
    }

    #[test]
    fn bang_bang_policy_reaches_the_goal() -> Result<()> {
        let mut env = *MountainCarEnv::new(MountainCarConfig::default())?;
        env.reset(1)?;
        for _ in 0..999 {
            let velocity = MountainCarObservation::to_vec(env.current_observation())[1];
            let force = if velocity >= 0.0 { 1.0 } else { -1.0 };
            let step = env.step(MountainCarAction::from_vec(vec![force]))?;
            if step.terminated {
                assert!(step.reward > 99.0);
                return Ok(());
            }
        }
        panic!("momentum policy should reach the goal");
    }
}
