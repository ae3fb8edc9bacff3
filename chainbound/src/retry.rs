//! Retry policy for transient stage failures.
//!
//! Retries are bounded by both the attempt ceiling and the shared
//! deadline, whichever is tighter: a retry only proceeds when enough
//! budget remains for the backoff delay plus one more viable attempt.

use crate::deadline::Deadline;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The smallest budget worth spending on one more attempt.
///
/// Roughly the cost of a trivial no-op model call; below this the
/// stage is treated as exhausted.
pub const MIN_ATTEMPT_BUDGET: Duration = Duration::from_millis(250);

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// delay = base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// delay = base
    Constant,
}

/// Jitter strategy to spread retries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    /// No jitter.
    None,
    /// Random from 0 to the computed delay.
    #[default]
    Full,
}

/// Configuration for per-stage retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff strategy.
    pub backoff: Backoff,
    /// Jitter strategy.
    pub jitter: Jitter,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            backoff: Backoff::Exponential,
            jitter: Jitter::Full,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the attempt ceiling (including the initial attempt).
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay preceding the next attempt.
    ///
    /// `attempts_made` is the number of attempts already performed
    /// (so the first retry passes 1).
    #[must_use]
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1);
        let raw = match self.backoff {
            Backoff::Exponential => self
                .base_delay_ms
                .saturating_mul(2u64.saturating_pow(exponent)),
            Backoff::Constant => self.base_delay_ms,
        };
        let capped = raw.min(self.max_delay_ms);

        let jittered = match self.jitter {
            Jitter::None => capped,
            Jitter::Full => {
                if capped == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=capped)
                }
            }
        };

        Duration::from_millis(jittered)
    }

    /// Decides whether one more attempt may start.
    ///
    /// Requires attempts remaining, an unexpired deadline, and enough
    /// budget left for the backoff delay plus [`MIN_ATTEMPT_BUDGET`].
    /// No retry ever starts once the deadline has expired, regardless
    /// of retry budget remaining.
    #[must_use]
    pub fn permits_retry(&self, attempts_made: u32, deadline: &Deadline) -> Option<Duration> {
        if attempts_made >= self.max_attempts || deadline.expired() {
            return None;
        }
        let delay = self.delay_for(attempts_made);
        if deadline.remaining() > delay + MIN_ATTEMPT_BUDGET {
            Some(delay)
        } else {
            None
        }
    }
}
