//! Retry backoff policy.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::JobError;

/// Upper bound applied to the default exponential policy (one hour).
const DEFAULT_MAX_DELAY_MS: u64 = 60 * 60 * 1000;

/// How long a failed job waits before it is retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackoffPolicy {
    /// The same delay after every failure.
    Fixed { delay_ms: u64 },
    /// `base^attempts * unit_ms`, capped at `max_delay_ms`, then scaled by a
    /// random factor in `[1 - jitter, 1 + jitter]`.
    Exponential {
        base: u32,
        unit_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_delay_ms: Option<u64>,
        #[serde(default)]
        jitter: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::Exponential {
            base: 2,
            unit_ms: 1000,
            max_delay_ms: Some(DEFAULT_MAX_DELAY_MS),
            jitter: 0.0,
        }
    }
}

impl BackoffPolicy {
    /// Exponential backoff: 2s, 4s, 8s, ... capped at one hour.
    pub fn exponential() -> Self {
        Self::default()
    }

    /// Exponential backoff with no upper bound.
    pub fn uncapped() -> Self {
        Self::Exponential {
            base: 2,
            unit_ms: 1000,
            max_delay_ms: None,
            jitter: 0.0,
        }
    }

    /// A constant delay between attempts.
    pub fn fixed(delay: Duration) -> Self {
        Self::Fixed {
            delay_ms: saturating_millis(delay),
        }
    }

    /// Replace the cap of an exponential policy. No effect on fixed policies.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        if let Self::Exponential { max_delay_ms, .. } = &mut self {
            *max_delay_ms = Some(saturating_millis(max_delay));
        }
        self
    }

    /// Set the jitter factor of an exponential policy. No effect on fixed policies.
    pub fn with_jitter(mut self, factor: f64) -> Self {
        if let Self::Exponential { jitter, .. } = &mut self {
            *jitter = factor;
        }
        self
    }

    /// Reject policies that cannot produce a sensible delay.
    pub fn validate(&self) -> Result<(), JobError> {
        match self {
            Self::Fixed { .. } => Ok(()),
            Self::Exponential { base, jitter, .. } => {
                if *base == 0 {
                    return Err(JobError::InvalidOptions(
                        "backoff base must be at least 1".into(),
                    ));
                }
                if !(0.0..=1.0).contains(jitter) {
                    return Err(JobError::InvalidOptions(format!(
                        "backoff jitter must be within 0.0..=1.0, got {}",
                        jitter
                    )));
                }
                Ok(())
            }
        }
    }

    /// Delay before the next attempt, given the number of attempts made so far.
    pub fn delay_for(&self, attempts: u32) -> Duration {
        match self {
            Self::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            Self::Exponential {
                base,
                unit_ms,
                max_delay_ms,
                jitter,
            } => {
                let factor = u64::from(*base).checked_pow(attempts).unwrap_or(u64::MAX);
                let mut delay_ms = factor.saturating_mul(*unit_ms);
                if let Some(cap) = max_delay_ms {
                    delay_ms = delay_ms.min(*cap);
                }
                if *jitter > 0.0 && delay_ms > 0 {
                    let scale = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
                    delay_ms = (delay_ms as f64 * scale).round() as u64;
                }
                Duration::from_millis(delay_ms)
            }
        }
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
