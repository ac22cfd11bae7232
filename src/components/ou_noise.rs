use {
    crate::sde::standard_normal,
    candle_core::{
        Device,
        Result,
        Tensor,
    },
    rand::Rng,
};

/// Ornstein-Uhlenbeck action noise, the exploration used by TD3 when
/// state-dependent exploration is off.
pub struct OuNoise {
    mu: f64,
    theta: f64,
    sigma: f64,
    state: Tensor,
}

impl OuNoise {
    pub fn new(
        mu: f64,
        theta: f64,
        sigma: f64,
        size_action: usize,
        device: &Device,
    ) -> Result<Self> {
        Ok(Self {
            mu,
            theta,
            sigma,
            state: Tensor::full(mu, size_action, device)?,
        })
    }

    /// Restart the process at its mean, typically at episode boundaries.
    pub fn reset(&mut self) -> Result<()> {
        self.state = self.state.ones_like()?.affine(0.0, self.mu)?;
        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
    ) -> Result<Tensor> {
        let rand = standard_normal(rng, self.state.dims(), self.state.device())?;
        let dx = ((self.theta * (self.mu - &self.state)?)? + (self.sigma * rand)?)?;
        self.state = (&self.state + dx)?;
        Ok(self.state.clone())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        rand::{
            rngs::StdRng,
            SeedableRng,
        },
    };

    #[test]
    fn zero_sigma_decays_towards_the_mean() -> Result<()> {
        let mut noise = OuNoise::new(0.0, 0.5, 0.0, 2, &Device::Cpu)?;
        noise.state = Tensor::new(&[1.0f64, -1.0], &Device::Cpu)?;
        let sample = noise.sample(&mut StdRng::seed_from_u64(0))?;
        assert_eq!(sample.to_vec1::<f64>()?, vec![0.5, -0.5]);
        Ok(())
    }

    #[test]
    fn reset_returns_to_the_mean() -> Result<()> {
        let mut noise = OuNoise::new(0.2, 0.15, 0.3, 3, &Device::Cpu)?;
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..5 {
            noise.sample(&mut rng)?;
        }
        noise.reset()?;
        for value in noise.state.to_vec1::<f64>()? {
            assert!((value - 0.2).abs() < 1e-12);
        }
        Ok(())
    }
}
