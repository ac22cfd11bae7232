use {
    candle_core::{
        DType,
        Device,
        Module,
        Result,
        Tensor,
        Var,
    },
    candle_nn::{
        func,
        linear,
        sequential::seq,
        Sequential,
        VarBuilder,
        VarMap,
    },
    std::sync::PoisonError,
};

/// Source of the unconstrained `log_std` behind `sigma_hat = exp(log_std)`,
/// and of the latent the noise weights act on.
///
/// The exploration code only ever talks to this trait, so it does not care
/// whether the latent is the policy features themselves or the output of a
/// small network over them.
pub trait NoiseScaleProvider {
    /// Width of the latent returned by [`latent`](Self::latent).
    fn latent_dim(&self) -> usize;

    /// Map a `(batch, feature_dim)` batch of policy features to the
    /// `(batch, latent_dim)` latent that multiplies the noise weights.
    fn latent(
        &self,
        features: &Tensor,
    ) -> Result<Tensor> {
        Ok(features.clone())
    }

    /// The current `log_std`, expanded to `(latent_dim, action_dim)`.
    fn log_std(&self) -> Result<Tensor>;

    /// `sigma_hat = exp(log_std)`, strictly positive for finite `log_std`.
    fn sigma_hat(&self) -> Result<Tensor> {
        self.log_std()?.exp()
    }

    /// Overwrite the parameter so that every entry of `log_std` equals
    /// `value`. This is a plain storage write and records no gradient.
    fn set_log_std(
        &mut self,
        value: f64,
    ) -> Result<()>;

    /// The learnable variables behind the scale and the latent, for the
    /// optimizer.
    fn vars(&self) -> Vec<Var>;
}

fn log_std_width(
    action_dim: usize,
    full_std: bool,
) -> usize {
    if full_std {
        action_dim
    } else {
        1
    }
}

/// `log_std` stored directly as a learnable tensor, with the policy features
/// used as the latent unchanged.
///
/// With `full_std` the tensor has one entry per `(feature, action)` pair,
/// otherwise a single column is shared across the action dimension.
pub struct ConstantTensorProvider {
    log_std: Var,
    latent_dim: usize,
    action_dim: usize,
}

impl ConstantTensorProvider {
    pub fn new(
        device: &Device,
        latent_dim: usize,
        action_dim: usize,
        log_std_init: f64,
        full_std: bool,
    ) -> Result<Self> {
        let width = log_std_width(action_dim, full_std);
        let log_std = Var::from_tensor(
            &Tensor::full(log_std_init, (latent_dim, width), device)?,
        )?;
        Ok(Self {
            log_std,
            latent_dim,
            action_dim,
        })
    }
}

impl NoiseScaleProvider for ConstantTensorProvider {
    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn log_std(&self) -> Result<Tensor> {
        self.log_std
            .as_tensor()
            .broadcast_as((self.latent_dim, self.action_dim))
    }

    fn set_log_std(
        &mut self,
        value: f64,
    ) -> Result<()> {
        let filled = Tensor::full(
            value,
            self.log_std.dims(),
            self.log_std.device(),
        )?;
        self.log_std.set(&filled)
    }

    fn vars(&self) -> Vec<Var> {
        vec![self.log_std.clone()]
    }
}

/// A tanh feed-forward network over the policy features produces the latent,
/// and `log_std` is a learnable tensor over that latent.
///
/// Noise is then `network(features) @ W`, so it still is a deterministic
/// function of the state within a noise epoch.
pub struct NetworkProvider {
    varmap: VarMap,
    network: Sequential,
    scale: ConstantTensorProvider,
}

impl NetworkProvider {
    pub fn new(
        device: &Device,
        feature_dim: usize,
        action_dim: usize,
        log_std_init: f64,
        full_std: bool,
        net_arch: &[usize],
    ) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F64, device);

        let mut network = seq();
        let mut in_dim = feature_dim;
        for (i, &out_dim) in net_arch.iter().enumerate() {
            network = network
                .add(linear(in_dim, out_dim, vb.pp(format!("sde-fc{i}")))?)
                .add(func(|xs| xs.tanh()));
            in_dim = out_dim;
        }

        Ok(Self {
            varmap,
            network,
            scale: ConstantTensorProvider::new(device, in_dim, action_dim, log_std_init, full_std)?,
        })
    }
}

impl NoiseScaleProvider for NetworkProvider {
    fn latent_dim(&self) -> usize {
        self.scale.latent_dim()
    }

    fn latent(
        &self,
        features: &Tensor,
    ) -> Result<Tensor> {
        self.network.forward(features)
    }

    fn log_std(&self) -> Result<Tensor> {
        self.scale.log_std()
    }

    fn set_log_std(
        &mut self,
        value: f64,
    ) -> Result<()> {
        self.scale.set_log_std(value)
    }

    /// Network weights sorted by parameter name, then `log_std`, so
    /// checkpoints line up across instances.
    fn vars(&self) -> Vec<Var> {
        let data = self
            .varmap
            .data()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut named = data.iter().collect::<Vec<_>>();
        named.sort_by(|a, b| a.0.cmp(b.0));
        let mut vars = named
            .into_iter()
            .map(|(_, var)| var.clone())
            .collect::<Vec<_>>();
        vars.extend(self.scale.vars());
        vars
    }
}
