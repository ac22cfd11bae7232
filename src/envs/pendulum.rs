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
    std::{
        f64::consts::PI,
        ops::RangeInclusive,
    },
};

fn angle_normalize(x: f64) -> f64 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

/// The classic inverted pendulum swing-up task.
///
/// Dynamics and reward follow the Gymnasium Pendulum-v1 environment: the
/// observation is `[cos(theta), sin(theta), theta_dot]` and the single action
/// is the torque applied to the free end.
pub struct PendulumEnv {
    config: PendulumConfig,
    theta: f64,
    theta_dot: f64,
    steps: usize,
    rng: StdRng,
}

/// The configuration struct for the [`PendulumEnv`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendulumConfig {
    pub timelimit: usize,
    pub max_speed: f64,
    pub max_torque: f64,
    pub dt: f64,
    pub g: f64,
    pub m: f64,
    pub l: f64,
}
impl Default for PendulumConfig {
    fn default() -> Self {
        Self {
            timelimit: 200,
            max_speed: 8.0,
            max_torque: 2.0,
            dt: 0.05,
            g: 10.0,
            m: 1.0,
            l: 1.0,
        }
    }
}

/// The action type for the [`PendulumEnv`]: a single torque value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumAction {
    torque: f64,
}
impl PendulumAction {
    pub fn torque(&self) -> f64 {
        self.torque
    }
}
impl Sampleable for PendulumAction {
    /// Sample a torque uniformly from the single range in `domain`.
    ///
    /// This function panics if the number of ranges in the domain is not 1.
    fn sample(
        rng: &mut dyn RngCore,
        domain: &[RangeInclusive<f64>],
    ) -> Self {
        assert!(domain.len() == 1);
        Self {
            torque: rng.gen_range(domain[0].clone()),
        }
    }
}
impl VectorConvertible for PendulumAction {
    /// Scale a network output in \[-1.0, 1.0\] to the torque range \[-2.0, 2.0\].
    fn from_vec_pp(mut value: Vec<f64>) -> Self {
        value[0] = (2.0 * value[0]).clamp(-2.0, 2.0);
        Self::from_vec(value)
    }

    /// This function panics if the number of elements in the Vec is not 1.
    fn from_vec(value: Vec<f64>) -> Self {
        assert!(value.len() == 1);
        Self { torque: value[0] }
    }

    fn to_vec(value: Self) -> Vec<f64> {
        vec![value.torque]
    }
}
impl TensorConvertible for PendulumAction {}

/// The observation type for the [`PendulumEnv`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendulumObservation {
    cos: f64,
    sin: f64,
    theta_dot: f64,
}
impl VectorConvertible for PendulumObservation {
    fn from_vec_pp(value: Vec<f64>) -> Self {
        Self::from_vec(value)
    }

    /// This function panics if the number of elements in the Vec is not 3.
    fn from_vec(value: Vec<f64>) -> Self {
        assert!(value.len() == 3);
        Self {
            cos: value[0],
            sin: value[1],
            theta_dot: value[2],
        }
    }

    fn to_vec(value: Self) -> Vec<f64> {
        vec![value.cos, value.sin, value.theta_dot]
    }
}
impl TensorConvertible for PendulumObservation {}

impl PendulumEnv {
    fn observation(&self) -> PendulumObservation {
        PendulumObservation {
            cos: self.theta.cos(),
            sin: self.theta.sin(),
            theta_dot: self.theta_dot,
        }
    }
}

impl Environment for PendulumEnv {
    type Config = PendulumConfig;
    type Action = PendulumAction;
    type Observation = PendulumObservation;

    fn config(&self) -> &Self::Config {
        &self.config
    }

    fn new(config: Self::Config) -> Result<Box<Self>> {
        Ok(Box::new(Self {
            config,
            theta: PI,
            theta_dot: 0.0,
            steps: 0,
            rng: StdRng::seed_from_u64(0),
        }))
    }

    fn reset(
        &mut self,
        seed: u64,
    ) -> Result<Self::Observation> {
        self.rng = StdRng::seed_from_u64(seed);
        self.theta = self.rng.gen_range(-PI..=PI);
        self.theta_dot = self.rng.gen_range(-1.0..=1.0);
        self.steps = 0;
        Ok(self.observation())
    }

    fn step(
        &mut self,
        action: Self::Action,
    ) -> Result<Step<Self::Observation, Self::Action>> {
        let PendulumConfig {
            max_speed,
            max_torque,
            dt,
            g,
            m,
            l,
            timelimit,
        } = self.config;

        let u = action.torque.clamp(-max_torque, max_torque);
        let theta = angle_normalize(self.theta);
        let cost = theta.powi(2) + 0.1 * self.theta_dot.powi(2) + 0.001 * u.powi(2);

        let theta_dot = self.theta_dot
            + (3.0 * g / (2.0 * l) * self.theta.sin() + 3.0 / (m * l * l) * u) * dt;
        self.theta_dot = theta_dot.clamp(-max_speed, max_speed);
        self.theta += self.theta_dot * dt;
        self.steps += 1;

        Ok(Step {
            observation: self.observation(),
            action,
            reward: -cost,
            terminated: false,
            truncated: self.steps >= timelimit,
        })
    }

    fn timelimit(&self) -> usize {
        self.config.timelimit
    }

    fn action_space(&self) -> Vec<usize> {
        vec![1]
    }

    fn action_domain(&self) -> Vec<RangeInclusive<f64>> {
        vec![-self.config.max_torque..=self.config.max_torque]
    }

    fn observation_space(&self) -> Vec<usize> {
        vec![3]
    }

    fn observation_domain(&self) -> Vec<RangeInclusive<f64>> {
        vec![
            -1.0..=1.0,
            -1.0..=1.0,
            -self.config.max_speed..=self.config.max_speed,
        ]
    }

    fn current_observation(&self) -> Self::Observation {
        self.observation()
    }
}
