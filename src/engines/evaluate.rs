use {
    crate::{
        agents::Algorithm,
        envs::{
            Environment,
            TensorConvertible,
        },
        RunMode,
    },
    anyhow::Result,
    candle_core::Device,
    rand::{
        rngs::StdRng,
        Rng,
    },
};

/// Mean undiscounted return of `n_episodes` episodes with the deterministic
/// (mean) action, leaving the agent's exploration state untouched.
pub fn evaluate<Alg, Env, Obs, Act>(
    env: &mut Env,
    agent: &mut Alg,
    n_episodes: usize,
    device: &Device,
    rng: &mut StdRng,
) -> Result<f64>
where
    Env: Environment<Action = Act, Observation = Obs>,
    Alg: Algorithm,
    Obs: TensorConvertible,
    Act: TensorConvertible,
{
    if n_episodes == 0 {
        return Ok(0.0);
    }
    let mut total = 0.0;
    for _ in 0..n_episodes {
        env.reset(rng.gen::<u64>())?;
        loop {
            let state = <Obs>::to_tensor(env.current_observation(), device)?;
            let action = agent.actions(&state, RunMode::Test, rng)?;
            let step = env.step(<Act>::from_tensor_pp(action)?)?;
            total += step.reward;
            if step.done() {
                break;
            }
        }
    }
    Ok(total / n_episodes as f64)
}
