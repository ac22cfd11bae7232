use {
    super::error::{
        Result,
        SdeError,
    },
    std::{
        fmt::Debug,
        sync::Arc,
    },
};

/// Fraction of training still remaining: `1.0` at the start, `0.0` at the end.
///
/// This is the `progress` every log-std schedule is evaluated at.
pub fn progress_remaining(
    elapsed_timesteps: usize,
    total_timesteps: usize,
) -> f64 {
    if total_timesteps == 0 {
        return 0.0;
    }
    (1.0 - elapsed_timesteps as f64 / total_timesteps as f64).clamp(0.0, 1.0)
}

type ScheduleFn = dyn Fn(f64) -> anyhow::Result<f64> + Send + Sync;

/// A caller-supplied map from training progress to a target `log_std`.
///
/// `progress` follows [`progress_remaining`], so a schedule that should end
/// at `log_std = x` must return `x` for `progress = 0.0`.
#[derive(Clone)]
pub struct LogStdScheduler {
    schedule: Arc<ScheduleFn>,
}

impl Debug for LogStdScheduler {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LogStdScheduler").finish_non_exhaustive()
    }
}

impl LogStdScheduler {
    pub fn new<F>(schedule: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            schedule: Arc::new(move |progress| Ok(schedule(progress))),
        }
    }

    /// A schedule that may fail, e.g. one backed by a lookup table.
    pub fn try_new<F>(schedule: F) -> Self
    where
        F: Fn(f64) -> anyhow::Result<f64> + Send + Sync + 'static,
    {
        Self {
            schedule: Arc::new(schedule),
        }
    }

    /// Linear interpolation from `start` (progress 1) to `end` (progress 0).
    pub fn linear(
        start: f64,
        end: f64,
    ) -> Self {
        Self::new(move |progress| end + (start - end) * progress)
    }

    /// The target `log_std` for `progress`, which must be finite.
    pub fn evaluate(
        &self,
        progress: f64,
    ) -> Result<f64> {
        let target = (self.schedule)(progress).map_err(|e| SdeError::ScheduleEvaluation {
            progress,
            reason: format!("{e:#}"),
        })?;
        if !target.is_finite() {
            return Err(SdeError::ScheduleEvaluation {
                progress,
                reason: format!("schedule returned non-finite value {target}"),
            });
        }
        Ok(target)
    }
}
