use {
    super::{
        error::{
            Result,
            SdeError,
        },
        gaussian::standard_normal,
        noise_scale::{
            ConstantTensorProvider,
            NetworkProvider,
            NoiseScaleProvider,
        },
    },
    candle_core::{
        DType,
        Device,
        Tensor,
        Var,
    },
    rand::Rng,
};

/// Zero-mean Gaussian over the `(latent_dim, action_dim)` noise weight matrix.
///
/// Owns the learnable scale through a [`NoiseScaleProvider`]. Without a
/// network the latent is the state itself and `latent_dim == state_dim`.
/// Samples are
/// reparameterized as `W = sigma_hat * epsilon`, so gradients from a loss on
/// `W` flow back into the scale parameters.
pub struct NoiseWeightDistribution {
    provider: Box<dyn NoiseScaleProvider>,
    state_dim: usize,
    latent_dim: usize,
    action_dim: usize,
    device: Device,
}

impl NoiseWeightDistribution {
    /// Build the distribution with `sigma_hat = exp(log_std_init)`.
    ///
    /// A non-empty `net_arch` puts a small network between the state and
    /// the noise weights.
    pub fn new(
        device: &Device,
        state_dim: usize,
        action_dim: usize,
        log_std_init: f64,
        full_std: bool,
        net_arch: Option<&[usize]>,
    ) -> Result<Self> {
        if !log_std_init.is_finite() {
            return Err(SdeError::InvalidNoiseScale {
                value: log_std_init.exp(),
            });
        }
        let provider: Box<dyn NoiseScaleProvider> = match net_arch {
            Some(arch) if !arch.is_empty() => Box::new(NetworkProvider::new(
                device,
                state_dim,
                action_dim,
                log_std_init,
                full_std,
                arch,
            )?),
            _ => Box::new(ConstantTensorProvider::new(
                device,
                state_dim,
                action_dim,
                log_std_init,
                full_std,
            )?),
        };
        Ok(Self::with_provider(device, provider, state_dim, action_dim))
    }

    pub fn with_provider(
        device: &Device,
        provider: Box<dyn NoiseScaleProvider>,
        state_dim: usize,
        action_dim: usize,
    ) -> Self {
        Self {
            latent_dim: provider.latent_dim(),
            provider,
            state_dim,
            action_dim,
            device: device.clone(),
        }
    }

    pub fn state_dim(&self) -> usize {
        self.state_dim
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }

    /// The latent the noise weights act on, `(batch, latent_dim)`.
    pub fn latent(
        &self,
        states: &Tensor,
    ) -> Result<Tensor> {
        Ok(self.provider.latent(states)?)
    }

    pub fn log_std(&self) -> Result<Tensor> {
        Ok(self.provider.log_std()?)
    }

    /// The current `sigma_hat`, rejected if any entry is non-positive or
    /// non-finite.
    pub fn sigma_hat(&self) -> Result<Tensor> {
        let sigma_hat = self.provider.sigma_hat()?;
        let values = sigma_hat
            .flatten_all()?
            .to_dtype(DType::F64)?
            .to_vec1::<f64>()?;
        if let Some(&value) = values.iter().find(|v| !v.is_finite() || **v <= 0.0) {
            return Err(SdeError::InvalidNoiseScale { value });
        }
        Ok(sigma_hat)
    }

    /// Draw `W ~ N(0, sigma_hat)` as a differentiable function of `sigma_hat`.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Tensor> {
        let sigma_hat = self.sigma_hat()?;
        let epsilon = standard_normal(rng, &[self.latent_dim, self.action_dim], &self.device)?
            .to_dtype(sigma_hat.dtype())?;
        Ok((sigma_hat * epsilon)?)
    }

    /// Overwrite `log_std` wholesale, bypassing the optimizer.
    pub fn set_log_std(
        &mut self,
        value: f64,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(SdeError::InvalidNoiseScale { value: value.exp() });
        }
        Ok(self.provider.set_log_std(value)?)
    }

    pub fn vars(&self) -> Vec<Var> {
        self.provider.vars()
    }
}
