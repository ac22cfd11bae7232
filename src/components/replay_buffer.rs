use {
    candle_core::{
        Result,
        Tensor,
    },
    rand::{
        distributions::Uniform,
        Rng,
    },
    std::collections::VecDeque,
    unzip_n::unzip_n,
};

unzip_n!(5);

/// A transition in the replay buffer.
///
/// Only `terminated` is stored: truncated episodes still bootstrap from the
/// next state.
#[derive(Clone)]
struct Transition {
    state: Tensor,
    action: Tensor,
    reward: Tensor,
    next_state: Tensor,
    terminated: Tensor,
}

/// A batch of transitions, each field stacked along dimension 0.
pub struct Batch {
    pub states: Tensor,
    pub actions: Tensor,
    pub rewards: Tensor,
    pub next_states: Tensor,
    pub terminateds: Tensor,
}

/// A ring buffer of transitions for off-policy algorithms.
#[derive(Clone)]
pub struct ReplayBuffer {
    buffer: VecDeque<Transition>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Push a transition, evicting the oldest one when the buffer is full.
    pub fn push(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: &Tensor,
        next_state: &Tensor,
        terminated: &Tensor,
    ) {
        if self.is_full() {
            self.buffer.pop_front();
        }
        self.buffer.push_back(Transition {
            state: state.clone(),
            action: action.clone(),
            reward: reward.clone(),
            next_state: next_state.clone(),
            terminated: terminated.clone(),
        });
    }

    /// Sample `batch_size` transitions uniformly with replacement.
    ///
    /// Returns `None` while the buffer holds fewer than `batch_size` transitions.
    pub fn random_batch<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Option<Batch>> {
        if self.buffer.len() < batch_size {
            return Ok(None);
        }

        let transition_to_tuple =
            |t: &Transition| -> Result<(Tensor, Tensor, Tensor, Tensor, Tensor)> {
                Ok((
                    t.state.unsqueeze(0)?,
                    t.action.unsqueeze(0)?,
                    t.reward.unsqueeze(0)?,
                    t.next_state.unsqueeze(0)?,
                    t.terminated.unsqueeze(0)?,
                ))
            };

        let indices = Uniform::from(0..self.buffer.len());
        let (states, actions, rewards, next_states, terminateds) = (0..batch_size)
            .map(|_| &self.buffer[rng.sample(indices)])
            .map(transition_to_tuple)
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .unzip_n_vec();

        Ok(Some(Batch {
            states: Tensor::cat(&states, 0)?,
            actions: Tensor::cat(&actions, 0)?,
            rewards: Tensor::cat(&rewards, 0)?,
            next_states: Tensor::cat(&next_states, 0)?,
            terminateds: Tensor::cat(&terminateds, 0)?,
        }))
    }
}
