//! Retry policy for reconnection groups.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How long to wait between connection attempts.
///
/// Serialized with millisecond fields, e.g. `{ kind = "exponential", base_ms = 500, max_ms = 30000 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    /// The same delay before every retry.
    Fixed { delay_ms: u64 },
    /// `step * n` before the n-th retry.
    Linear { step_ms: u64 },
    /// `base * 2^(n-1)` before the n-th retry, capped at `max`.
    Exponential { base_ms: u64, max_ms: u64 },
}

impl Backoff {
    /// Delay before the retry that follows `failures` failed attempts.
    pub fn delay(&self, failures: u32) -> Duration {
        let n = failures.max(1);
        let ms = match *self {
            Self::Fixed { delay_ms } => delay_ms,
            Self::Linear { step_ms } => step_ms.saturating_mul(u64::from(n)),
            Self::Exponential { base_ms, max_ms } => {
                let multiplier = 1u64.checked_shl(n - 1).unwrap_or(u64::MAX);
                base_ms.saturating_mul(multiplier).min(max_ms)
            }
        };
        Duration::from_millis(ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            base_ms: 500,
            max_ms: 30_000,
        }
    }
}

/// Backoff plus an attempt budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default)]
    pub backoff: Backoff,
    /// Total attempts allowed per member, the first one included.
    /// `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(backoff: Backoff, max_attempts: Option<u32>) -> Self {
        Self {
            backoff,
            max_attempts,
        }
    }

    /// A policy that never retries.
    pub fn once() -> Self {
        Self::new(Backoff::Fixed { delay_ms: 0 }, Some(1))
    }

    /// Whether `attempts` made so far use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }

    pub fn delay(&self, failures: u32) -> Duration {
        self.backoff.delay(failures)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Backoff::default(), Some(8))
    }
}
