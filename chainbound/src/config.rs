//! Process configuration.
//!
//! Read once at startup; every request derives its own [`Deadline`]
//! from the configured budget.

use crate::deadline::Deadline;
use anyhow::Context;
use std::env;

/// Default total budget per request, in seconds.
///
/// Slightly under five minutes so the answer lands before typical
/// upstream proxy timeouts.
pub const DEFAULT_DEADLINE_SECONDS: f64 = 285.0;

/// Environment variable holding the per-request budget in seconds.
pub const DEADLINE_SECONDS_VAR: &str = "DEADLINE_SECONDS";

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Total wall-clock budget per request, in seconds.
    pub deadline_seconds: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deadline_seconds: DEFAULT_DEADLINE_SECONDS,
        }
    }
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// # Errors
    ///
    /// Fails if `DEADLINE_SECONDS` is set but not a number.
    pub fn from_env() -> anyhow::Result<Self> {
        let deadline_seconds = match env::var(DEADLINE_SECONDS_VAR) {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("invalid {DEADLINE_SECONDS_VAR} value '{raw}'"))?,
            Err(_) => DEFAULT_DEADLINE_SECONDS,
        };

        Ok(Self { deadline_seconds })
    }

    /// Creates a fresh deadline for one request.
    #[must_use]
    pub fn deadline(&self) -> Deadline {
        Deadline::from_secs_f64(self.deadline_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_budget() {
        let config = Config::default();
        assert!((config.deadline_seconds - 285.0).abs() < f64::EPSILON);
    }

    #[test]
    fn deadline_reflects_configured_budget() {
        let config = Config {
            deadline_seconds: 1.0,
        };
        let deadline = config.deadline();
        assert!(!deadline.expired());
        assert!(deadline.budget() <= std::time::Duration::from_secs(1));
    }

    #[test]
    fn extreme_configured_budget_caps_instead_of_panicking() {
        let config = Config {
            deadline_seconds: 1e20,
        };
        assert!(!config.deadline().expired());
    }

    #[test]
    fn zero_budget_config_yields_expired_deadline() {
        let config = Config {
            deadline_seconds: 0.0,
        };
        assert!(config.deadline().expired());
    }
}
