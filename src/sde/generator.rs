use {
    super::gaussian::GaussianDistribution,
    candle_core::{
        Result,
        Tensor,
    },
};

/// Lower bound applied to the per-action variance.
///
/// Only reached when a state row is (numerically) all zeros, which would
/// otherwise collapse the action Gaussian.
pub const VARIANCE_FLOOR: f64 = 1e-6;

/// Turns a state batch and a noise weight matrix into action noise and the
/// Gaussian that explains it.
///
/// All operations are pure: the same inputs always give the same outputs,
/// and nothing here draws new weights.
#[derive(Clone, Copy, Debug)]
pub struct StateDependentNoiseGenerator {
    variance_floor: f64,
}

impl Default for StateDependentNoiseGenerator {
    fn default() -> Self {
        Self {
            variance_floor: VARIANCE_FLOOR,
        }
    }
}

impl StateDependentNoiseGenerator {
    pub fn new(variance_floor: f64) -> Self {
        Self { variance_floor }
    }

    pub fn variance_floor(&self) -> f64 {
        self.variance_floor
    }

    /// `noise = state @ W`, of shape `(batch, action_dim)`.
    pub fn compute_noise(
        &self,
        states: &Tensor,
        weights: &Tensor,
    ) -> Result<Tensor> {
        states.matmul(weights)
    }

    /// `variance = state^2 @ sigma_hat^2`, floored at the variance floor.
    pub fn compute_variance(
        &self,
        states: &Tensor,
        sigma_hat: &Tensor,
    ) -> Result<Tensor> {
        let variance = states.sqr()?.matmul(&sigma_hat.sqr()?)?;
        let floor = variance.ones_like()?.affine(self.variance_floor, 0.0)?;
        variance.detach()?.lt(&floor)?.where_cond(&floor, &variance)
    }

    /// The Gaussian with the given mean and `sqrt(variance)` as its scale.
    pub fn action_distribution(
        &self,
        mean: &Tensor,
        states: &Tensor,
        sigma_hat: &Tensor,
    ) -> Result<GaussianDistribution> {
        let std = self.compute_variance(states, sigma_hat)?.sqrt()?;
        Ok(GaussianDistribution::new(mean.clone(), std))
    }

    /// `mean + state @ W` together with its action distribution.
    ///
    /// The returned action uses the given `W` rather than a fresh draw, so
    /// its log-probability is consistent with the noise that produced it.
    pub fn sample_action(
        &self,
        mean: &Tensor,
        states: &Tensor,
        weights: &Tensor,
        sigma_hat: &Tensor,
    ) -> Result<(Tensor, GaussianDistribution)> {
        let noise = self.compute_noise(states, weights)?;
        let action = mean.broadcast_add(&noise)?;
        let dist = self.action_distribution(mean, states, sigma_hat)?;
        Ok((action, dist))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::sde::gaussian::standard_normal,
        candle_core::{
            DType,
            Device,
            Var,
        },
        rand::{
            rngs::StdRng,
            Rng,
            SeedableRng,
        },
    };

    const RTOL: f64 = 1e-5;
    const ATOL: f64 = 1e-8;

    fn allclose(
        a: &[Vec<f64>],
        b: &[Vec<f64>],
    ) -> bool {
        a.iter().flatten().zip(b.iter().flatten()).all(|(x, y)| {
            (x - y).abs() <= ATOL + RTOL * y.abs()
        })
    }

    fn uniform_states(
        rng: &mut StdRng,
        n_states: usize,
        state_dim: usize,
        device: &Device,
    ) -> Result<Tensor> {
        let values = (0..n_states * state_dim)
            .map(|_| rng.gen::<f64>())
            .collect::<Vec<_>>();
        Tensor::from_vec(values, (n_states, state_dim), device)
    }

    /// Closed-form gradient of `mean_batch(sum_j log N(action_j; mu_j, sigma_j))`
    /// with respect to `sigma_hat[i, j]`.
    fn analytic_gradient(
        states: &[Vec<f64>],
        noise: &[Vec<f64>],
        variance: &[Vec<f64>],
        sigma_hat: &[Vec<f64>],
    ) -> Vec<Vec<f64>> {
        let n_states = states.len() as f64;
        sigma_hat
            .iter()
            .enumerate()
            .map(|(i, row)| {
                row.iter()
                    .enumerate()
                    .map(|(j, s_ij)| {
                        states
                            .iter()
                            .zip(noise.iter().zip(variance.iter()))
                            .map(|(state, (noise, variance))| {
                                let sigma_j = variance[j].sqrt();
                                let d_log_policy_j =
                                    (noise[j].powi(2) - sigma_j.powi(2)) / sigma_j.powi(3);
                                let d_sigma_j = state[i].powi(2) * s_ij / sigma_j;
                                d_log_policy_j * d_sigma_j
                            })
                            .sum::<f64>()
                            / n_states
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn gradient_matches_analytic_form() -> Result<()> {
        let (n_states, state_dim, action_dim) = (2, 3, 10);
        let device = Device::Cpu;
        let generator = StateDependentNoiseGenerator::default();
        let mut rng = StdRng::seed_from_u64(2);

        let sigma_hat = Var::ones((state_dim, action_dim), DType::F64, &device)?;
        let epsilon = standard_normal(&mut rng, &[state_dim, action_dim], &device)?;
        let weights = (sigma_hat.as_tensor() * epsilon)?;

        let states = uniform_states(&mut rng, n_states, state_dim, &device)?;
        let mu = Tensor::ones(action_dim, DType::F64, &device)?;

        let (action, dist) = generator.sample_action(&mu, &states, &weights, &sigma_hat)?;
        let loss = dist
            .log_prob(&action.detach()?)?
            .sum(1)?
            .mean_all()?;
        let grads = loss.backward()?;
        let grad = grads
            .get(sigma_hat.as_tensor())
            .expect("sigma_hat has a gradient")
            .to_vec2::<f64>()?;

        let noise = generator.compute_noise(&states, &weights)?.to_vec2::<f64>()?;
        let variance = generator
            .compute_variance(&states, &sigma_hat)?
            .to_vec2::<f64>()?;
        let expected = analytic_gradient(
            &states.to_vec2::<f64>()?,
            &noise,
            &variance,
            &sigma_hat.as_tensor().to_vec2::<f64>()?,
        );

        assert!(allclose(&grad, &expected), "{grad:?} != {expected:?}");
        Ok(())
    }

    #[test]
    fn gradient_survives_log_std_reparameterization() -> Result<()> {
        let (n_states, state_dim, action_dim) = (4, 3, 2);
        let device = Device::Cpu;
        let generator = StateDependentNoiseGenerator::default();
        let mut rng = StdRng::seed_from_u64(11);

        let log_std = Var::from_tensor(&Tensor::full(-0.3f64, (state_dim, action_dim), &device)?)?;
        let sigma_hat = log_std.as_tensor().exp()?;
        let epsilon = standard_normal(&mut rng, &[state_dim, action_dim], &device)?;
        let weights = (&sigma_hat * epsilon)?;

        let states = uniform_states(&mut rng, n_states, state_dim, &device)?;
        let mu = Tensor::zeros(action_dim, DType::F64, &device)?;

        let (action, dist) = generator.sample_action(&mu, &states, &weights, &sigma_hat)?;
        let loss = dist.log_prob(&action.detach()?)?.sum(1)?.mean_all()?;
        let grad = loss
            .backward()?
            .get(log_std.as_tensor())
            .expect("log_std has a gradient")
            .to_vec2::<f64>()?;

        // chain rule through sigma_hat = exp(log_std)
        let sigma_values = sigma_hat.to_vec2::<f64>()?;
        let by_sigma = analytic_gradient(
            &states.to_vec2::<f64>()?,
            &generator.compute_noise(&states, &weights)?.to_vec2::<f64>()?,
            &generator.compute_variance(&states, &sigma_hat)?.to_vec2::<f64>()?,
            &sigma_values,
        );
        let expected = by_sigma
            .iter()
            .zip(sigma_values.iter())
            .map(|(g, s)| g.iter().zip(s.iter()).map(|(g, s)| g * s).collect())
            .collect::<Vec<Vec<f64>>>();

        assert!(allclose(&grad, &expected), "{grad:?} != {expected:?}");
        Ok(())
    }

    #[test]
    fn zero_state_rows_are_floored() -> Result<()> {
        let device = Device::Cpu;
        let generator = StateDependentNoiseGenerator::default();
        let states = Tensor::new(&[[0.0f64, 0.0], [1.0, 2.0]], &device)?;
        let sigma_hat = Tensor::ones((2, 3), DType::F64, &device)?;

        let variance = generator.compute_variance(&states, &sigma_hat)?.to_vec2::<f64>()?;
        for value in &variance[0] {
            assert_eq!(*value, VARIANCE_FLOOR);
        }
        for value in &variance[1] {
            assert_eq!(*value, 5.0);
        }

        let dist = generator.action_distribution(
            &Tensor::zeros(3, DType::F64, &device)?,
            &states,
            &sigma_hat,
        )?;
        let log_prob = dist
            .log_prob(&Tensor::zeros((2, 3), DType::F64, &device)?)?
            .to_vec2::<f64>()?;
        assert!(log_prob.iter().flatten().all(|v| v.is_finite()));
        Ok(())
    }

    #[test]
    fn noise_is_a_pure_function_of_state_and_weights() -> Result<()> {
        let device = Device::Cpu;
        let generator = StateDependentNoiseGenerator::default();
        let mut rng = StdRng::seed_from_u64(5);
        let weights = standard_normal(&mut rng, &[4, 2], &device)?;
        let states = uniform_states(&mut rng, 8, 4, &device)?;

        let first = generator.compute_noise(&states, &weights)?.to_vec2::<f64>()?;
        for _ in 0..5 {
            let again = generator.compute_noise(&states, &weights)?.to_vec2::<f64>()?;
            assert_eq!(first, again);
        }
        Ok(())
    }
}
