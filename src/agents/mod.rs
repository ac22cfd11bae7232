mod a2c;
mod td3;

pub mod configs;

pub use a2c::A2C;
pub use td3::TD3;

use {
    crate::{
        components::ReplayBuffer,
        sde::StateDependentExploration,
        RunMode,
    },
    anyhow::Result,
    candle_core::{
        backprop::GradStore,
        Device,
        Error,
        Tensor,
        Var,
    },
    candle_nn::{
        func,
        linear,
        sequential::seq,
        Activation,
        Sequential,
        VarBuilder,
        VarMap,
    },
    rand::rngs::StdRng,
    std::{
        path::Path,
        sync::PoisonError,
    },
};

pub trait Algorithm {
    type Config;

    fn config(&self) -> &Self::Config;

    /// Build the agent. With SDE enabled the first noise weights are drawn
    /// here, so the agent can act right away.
    fn from_config(
        device: &Device,
        config: &Self::Config,
        size_state: usize,
        size_action: usize,
        rng: &mut StdRng,
    ) -> Result<Box<Self>>;

    fn actions(
        &mut self,
        state: &Tensor,
        mode: RunMode,
        rng: &mut StdRng,
    ) -> Result<Tensor>;

    fn train(
        &mut self,
        rng: &mut StdRng,
    ) -> Result<()>;

    fn exploration(&self) -> Option<&StateDependentExploration>;
    fn exploration_mut(&mut self) -> Option<&mut StateDependentExploration>;

    /// Report training progress (`1.0` at the start, `0.0` at the end).
    ///
    /// Must be called once per outer update, before [`train`](Self::train),
    /// so a scheduled `log_std` is in place before any gradient step.
    fn update_progress(
        &mut self,
        progress_remaining: f64,
        rng: &mut StdRng,
    ) -> Result<Option<f64>> {
        match self.exploration_mut() {
            Some(exploration) => Ok(exploration.on_update(progress_remaining, rng)?),
            None => Ok(None),
        }
    }
}

pub trait OnPolicyAlgorithm: Algorithm {
    fn rollout_length(&self) -> usize;

    fn start_rollout(
        &mut self,
        rng: &mut StdRng,
    ) -> Result<()>;

    fn record(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: f64,
        next_state: &Tensor,
        terminated: bool,
        truncated: bool,
    ) -> Result<()>;

    /// Close the rollout: `last_state` is the state following the final
    /// recorded step, `done` tells whether it starts a new episode.
    fn finish_rollout(
        &mut self,
        last_state: &Tensor,
        done: bool,
    ) -> Result<()>;
}

pub trait OffPolicyAlgorithm: Algorithm {
    fn remember(
        &mut self,
        state: &Tensor,
        action: &Tensor,
        reward: &Tensor,
        next_state: &Tensor,
        terminated: &Tensor,
        episode_done: bool,
    );

    fn replay_buffer(&self) -> &ReplayBuffer;
}

pub trait SaveableAlgorithm: Algorithm {
    fn save(
        &self,
        path: &Path,
    ) -> Result<()>;

    fn load(
        &mut self,
        path: &Path,
    ) -> Result<()>;
}

#[derive(Clone, Copy)]
enum Hidden {
    Relu,
    Tanh,
}

/// A feed-forward network with layers named `{prefix}-fc{i}`.
fn mlp(
    vb: &VarBuilder,
    prefix: &str,
    dims: &[(usize, usize)],
    hidden: Hidden,
    squash_output: bool,
) -> candle_core::Result<Sequential> {
    let mut network = seq();
    for (i, &(in_dim, out_dim)) in dims.iter().enumerate() {
        network = network.add(linear(in_dim, out_dim, vb.pp(format!("{prefix}-fc{i}")))?);
        if i + 1 < dims.len() {
            network = match hidden {
                Hidden::Relu => network.add(Activation::Relu),
                Hidden::Tanh => network.add(func(|xs| xs.tanh())),
            };
        }
    }
    if squash_output {
        network = network.add(func(|xs| xs.tanh()));
    }
    Ok(network)
}

/// Polyak update `target = tau * network + (1 - tau) * target`.
fn track(
    varmap: &mut VarMap,
    vb: &VarBuilder,
    target_prefix: &str,
    network_prefix: &str,
    dims: &[(usize, usize)],
    tau: f64,
) -> candle_core::Result<()> {
    for (i, &(in_dim, out_dim)) in dims.iter().enumerate() {
        let target_w = vb.get((out_dim, in_dim), &format!("{target_prefix}-fc{i}.weight"))?;
        let network_w = vb.get((out_dim, in_dim), &format!("{network_prefix}-fc{i}.weight"))?;
        varmap.set_one(
            format!("{target_prefix}-fc{i}.weight"),
            ((tau * network_w)? + ((1.0 - tau) * target_w)?)?,
        )?;

        let target_b = vb.get(out_dim, &format!("{target_prefix}-fc{i}.bias"))?;
        let network_b = vb.get(out_dim, &format!("{network_prefix}-fc{i}.bias"))?;
        varmap.set_one(
            format!("{target_prefix}-fc{i}.bias"),
            ((tau * network_b)? + ((1.0 - tau) * target_b)?)?,
        )?;
    }
    Ok(())
}

fn vars_with_prefix(
    varmap: &VarMap,
    prefix: &str,
) -> Vec<Var> {
    let data = varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
    let mut named = data
        .iter()
        .filter(|(name, _)| name.starts_with(prefix))
        .collect::<Vec<_>>();
    named.sort_by(|a, b| a.0.cmp(b.0));
    named.into_iter().map(|(_, var)| var.clone()).collect()
}

/// Rescale the gradients of `vars` so their joint L2 norm is at most
/// `max_norm`. Returns the norm before clipping.
fn clip_grad_norm(
    grads: &mut GradStore,
    vars: &[Var],
    max_norm: f64,
) -> candle_core::Result<f64> {
    let mut total = 0.0;
    for var in vars {
        if let Some(grad) = grads.get(var.as_tensor()) {
            total += grad.sqr()?.sum_all()?.to_scalar::<f64>()?;
        }
    }
    let norm = total.sqrt();
    if !norm.is_finite() {
        return Err(Error::Msg(format!("non-finite gradient norm {norm}")));
    }
    if norm > max_norm {
        let scale = max_norm / (norm + 1e-6);
        for var in vars {
            if let Some(grad) = grads.remove(var.as_tensor()) {
                grads.insert(var.as_tensor(), (grad * scale)?);
            }
        }
    }
    Ok(norm)
}

/// Collect every parameter of an agent, the exploration scale included,
/// into one store for safetensors checkpoints. The store shares storage with
/// the agent, so loading into it updates the agent in place.
fn checkpoint_store(
    varmaps: &[&VarMap],
    exploration: Option<&StateDependentExploration>,
) -> VarMap {
    let checkpoint = VarMap::new();
    {
        let mut target = checkpoint
            .data()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for varmap in varmaps {
            let source = varmap.data().lock().unwrap_or_else(PoisonError::into_inner);
            for (name, var) in source.iter() {
                target.insert(name.clone(), var.clone());
            }
        }
        if let Some(exploration) = exploration {
            for (i, var) in exploration.vars().into_iter().enumerate() {
                target.insert(format!("sde-param{i}"), var);
            }
        }
    }
    checkpoint
}

fn scalar(tensor: &Tensor) -> candle_core::Result<f64> {
    tensor.sum_all()?.to_scalar::<f64>()
}
