//! Outcome Policy
//!
//! Decides how long a simulated call takes and whether it fails. Kept behind
//! the [`OutcomePolicy`] trait so tests can seed or pin the randomness.
//!
//! Boundary rule: a sample `r` is drawn uniformly from `[0, 1)` and the call
//! succeeds iff `r < reliability`. Reliability `1.0` therefore always
//! succeeds and `0.0` always fails, with no exceptional draw.

use crate::span::Outcome;
use rand::prelude::*;
use rand_distr::LogNormal;
use std::sync::Mutex;
use std::time::Duration;

pub trait OutcomePolicy: Send + Sync {
    /// Terminal outcome for a call with the given success probability.
    fn decide_outcome(&self, reliability: f64) -> Outcome;

    /// Simulated duration, in `[0, typical_duration_ms)`.
    fn decide_duration(&self, typical_duration_ms: u64) -> Duration;
}

/// Map one uniform sample in `[0, 1)` to an outcome.
pub fn outcome_for_sample(reliability: f64, sample: f64) -> Outcome {
    if sample < reliability {
        Outcome::Ok
    } else {
        Outcome::Error
    }
}

/// Map one uniform sample in `[0, 1)` to a duration in `[0, typical)`.
pub fn duration_for_sample(typical_duration_ms: u64, sample: f64) -> Duration {
    if typical_duration_ms == 0 {
        return Duration::ZERO;
    }
    let span_us = typical_duration_ms.saturating_mul(1_000);
    let us = ((sample * span_us as f64) as u64).min(span_us - 1);
    Duration::from_micros(us)
}

/// Shape of the duration draw.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DurationModel {
    /// Uniform over `[0, typical)`.
    #[default]
    Uniform,
    /// Long-tailed draw with its median at half the typical duration,
    /// clamped into `[0, typical)`.
    LogNormal { sigma: f64 },
}

enum RngSource {
    Thread,
    Seeded(Mutex<StdRng>),
}

/// Policy backed by a random number generator.
pub struct RandomPolicy {
    source: RngSource,
    model: DurationModel,
}

impl RandomPolicy {
    /// Draws from the thread-local generator.
    pub fn new() -> Self {
        Self {
            source: RngSource::Thread,
            model: DurationModel::Uniform,
        }
    }

    /// Reproducible draws from a seeded generator.
    pub fn seeded(seed: u64) -> Self {
        Self {
            source: RngSource::Seeded(Mutex::new(StdRng::seed_from_u64(seed))),
            model: DurationModel::Uniform,
        }
    }

    pub fn with_duration_model(mut self, model: DurationModel) -> Self {
        self.model = model;
        self
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut dyn RngCore) -> T) -> T {
        match &self.source {
            RngSource::Thread => f(&mut rand::rng()),
            RngSource::Seeded(rng) => {
                let mut guard = rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                f(&mut *guard)
            }
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl OutcomePolicy for RandomPolicy {
    fn decide_outcome(&self, reliability: f64) -> Outcome {
        let sample: f64 = self.with_rng(|rng| rng.random());
        outcome_for_sample(reliability, sample)
    }

    fn decide_duration(&self, typical_duration_ms: u64) -> Duration {
        if typical_duration_ms == 0 {
            return Duration::ZERO;
        }

        match self.model {
            DurationModel::Uniform => {
                let sample: f64 = self.with_rng(|rng| rng.random());
                duration_for_sample(typical_duration_ms, sample)
            }
            DurationModel::LogNormal { sigma } => {
                let median_ms = typical_duration_ms as f64 / 2.0;
                let Ok(dist) = LogNormal::new(median_ms.ln(), sigma) else {
                    let sample: f64 = self.with_rng(|rng| rng.random());
                    return duration_for_sample(typical_duration_ms, sample);
                };
                let ms: f64 = self.with_rng(|rng| dist.sample(rng));
                let fraction = (ms / typical_duration_ms as f64).clamp(0.0, 1.0);
                duration_for_sample(typical_duration_ms, fraction)
            }
        }
    }
}

/// Policy with pinned results, for deterministic runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPolicy {
    /// Forced outcome; `None` falls back to thresholding `reliability`
    /// against 0.5.
    pub outcome: Option<Outcome>,
    /// Fraction of the typical duration to wait, in `[0, 1]`.
    pub duration_fraction: f64,
}

impl FixedPolicy {
    /// Every call completes instantly with OK.
    pub fn instant_ok() -> Self {
        Self {
            outcome: Some(Outcome::Ok),
            duration_fraction: 0.0,
        }
    }

    /// Every call waits its full typical duration (minus one microsecond).
    pub fn full_duration(outcome: Outcome) -> Self {
        Self {
            outcome: Some(outcome),
            duration_fraction: 1.0,
        }
    }
}

impl OutcomePolicy for FixedPolicy {
    fn decide_outcome(&self, reliability: f64) -> Outcome {
        self.outcome
            .unwrap_or_else(|| outcome_for_sample(reliability, 0.5))
    }

    fn decide_duration(&self, typical_duration_ms: u64) -> Duration {
        duration_for_sample(typical_duration_ms, self.duration_fraction.clamp(0.0, 1.0))
    }
}
