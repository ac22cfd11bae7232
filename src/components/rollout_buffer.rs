use candle_core::{
    Device,
    Result,
    Tensor,
};

/// The flattened contents of a finished rollout.
pub struct RolloutBatch {
    pub states: Tensor,
    pub actions: Tensor,
    pub advantages: Tensor,
    pub returns: Tensor,
}

/// Fixed-length storage for on-policy rollouts.
///
/// Advantages use Generalized Advantage Estimation; with `gae_lambda = 1.0`
/// they reduce to Monte-Carlo returns minus the value baseline.
pub struct RolloutBuffer {
    capacity: usize,
    gamma: f64,
    gae_lambda: f64,
    states: Vec<Tensor>,
    actions: Vec<Tensor>,
    rewards: Vec<f64>,
    episode_starts: Vec<bool>,
    values: Vec<f64>,
    advantages: Vec<f64>,
    returns: Vec<f64>,
}

impl RolloutBuffer {
    pub fn new(
        capacity: usize,
        gamma: f64,
        gae_lambda: f64,
    ) -> Self {
        Self {
            capacity,
            gamma,
            gae_lambda,
            states: Vec::with_capacity(capacity),
            actions: Vec::with_capacity(capacity),
            rewards: Vec::with_capacity(capacity),
            episode_starts: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
            advantages: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.rewards.len() >= self.capacity
    }

    pub fn reset(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
        self.episode_starts.clear();
        self.values.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    /// Store one step. `episode_start` marks `state` as the first state of
    /// an episode.
    pub fn push(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: f64,
        episode_start: bool,
        value: f64,
    ) {
        self.states.push(state.clone());
        self.actions.push(action.clone());
        self.rewards.push(reward);
        self.episode_starts.push(episode_start);
        self.values.push(value);
    }

    pub fn advantages(&self) -> &[f64] {
        &self.advantages
    }

    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Backward GAE pass over the stored steps.
    ///
    /// `last_value` is the value estimate of the state following the final
    /// step and `done` tells whether that state begins a new episode.
    pub fn compute_returns_and_advantage(
        &mut self,
        last_value: f64,
        done: bool,
    ) {
        let n = self.len();
        self.advantages = vec![0.0; n];
        let mut last_gae = 0.0;
        for step in (0..n).rev() {
            let (next_non_terminal, next_value) = if step == n - 1 {
                (if done { 0.0 } else { 1.0 }, last_value)
            } else {
                let start = self.episode_starts[step + 1];
                (if start { 0.0 } else { 1.0 }, self.values[step + 1])
            };
            let delta = self.rewards[step] + self.gamma * next_value * next_non_terminal
                - self.values[step];
            last_gae = delta + self.gamma * self.gae_lambda * next_non_terminal * last_gae;
            self.advantages[step] = last_gae;
        }
        self.returns = self
            .advantages
            .iter()
            .zip(&self.values)
            .map(|(advantage, value)| advantage + value)
            .collect();
    }

    /// Stack the rollout into tensors. Scalars become `(n, 1)` columns.
    pub fn batch(
        &self,
        device: &Device,
    ) -> Result<RolloutBatch> {
        let n = self.len();
        let column = |values: &[f64]| Tensor::from_slice(values, (n, 1), device);
        Ok(RolloutBatch {
            states: Tensor::stack(&self.states, 0)?,
            actions: Tensor::stack(&self.actions, 0)?,
            advantages: column(&self.advantages)?,
            returns: column(&self.returns)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(
        rewards: &[f64],
        starts: &[bool],
        values: &[f64],
        gamma: f64,
        gae_lambda: f64,
    ) -> Result<RolloutBuffer> {
        let device = Device::Cpu;
        let mut buffer = RolloutBuffer::new(rewards.len(), gamma, gae_lambda);
        for i in 0..rewards.len() {
            buffer.push(
                &Tensor::new(&[i as f64], &device)?,
                &Tensor::new(&[0.0f64], &device)?,
                rewards[i],
                starts[i],
                values[i],
            );
        }
        Ok(buffer)
    }

    #[test]
    fn lambda_one_gives_discounted_returns() -> Result<()> {
        let mut buffer = filled(&[1.0, 1.0, 1.0], &[true, false, false], &[0.0; 3], 0.5, 1.0)?;
        assert!(buffer.is_full());
        buffer.compute_returns_and_advantage(0.0, true);
        assert_eq!(buffer.returns(), &[1.75, 1.5, 1.0]);
        assert_eq!(buffer.advantages(), buffer.returns());
        Ok(())
    }

    #[test]
    fn bootstraps_from_last_value_unless_done() -> Result<()> {
        let mut buffer = filled(&[0.0], &[true], &[1.0], 0.9, 0.95)?;
        buffer.compute_returns_and_advantage(2.0, false);
        assert!((buffer.returns()[0] - 1.8).abs() < 1e-12);
        buffer.compute_returns_and_advantage(2.0, true);
        assert_eq!(buffer.returns()[0], 0.0);
        Ok(())
    }

    #[test]
    fn episode_starts_cut_the_advantage_chain() -> Result<()> {
        let mut buffer = filled(&[1.0, 5.0], &[true, true], &[0.0, 0.0], 0.99, 1.0)?;
        buffer.compute_returns_and_advantage(0.0, true);
        assert_eq!(buffer.returns(), &[1.0, 5.0]);

        let batch = buffer.batch(&Device::Cpu)?;
        assert_eq!(batch.states.dims(), &[2, 1]);
        assert_eq!(batch.returns.dims(), &[2, 1]);
        Ok(())
    }
}
