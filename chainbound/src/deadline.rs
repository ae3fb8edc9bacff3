//! Shared wall-clock budget for a single pipeline run.
//!
//! A [`Deadline`] is created once per incoming request and passed by
//! reference through the entire chain. It is the only component that
//! touches the clock; everything else asks it how much time is left.

use std::time::Duration;
use tokio::time::Instant;

/// An immutable-origin time budget.
///
/// The origin is captured at construction and never reset. Remaining
/// time is derived on every query, so `remaining()` is monotonically
/// non-increasing and safe to call from any number of tasks.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    origin: Instant,
    budget: Duration,
}

/// Budgets at or above this many seconds are treated as effectively
/// unlimited and capped, keeping [`Duration::from_secs_f64`] in range.
const MAX_BUDGET_SECS: u64 = u32::MAX as u64;

impl Deadline {
    /// Creates a deadline with the given budget, starting now.
    #[must_use]
    pub fn new(budget: Duration) -> Self {
        Self {
            origin: Instant::now(),
            budget,
        }
    }

    /// Creates a deadline from a budget in seconds.
    ///
    /// NaN and non-positive values clamp to a zero budget: the very
    /// first `expired()` check then reports true and the chain
    /// collapses to the zero-stage fallback path. Infinite or
    /// oversized values cap at `MAX_BUDGET_SECS` seconds, an
    /// effectively unlimited budget. This function never panics.
    #[must_use]
    pub fn from_secs_f64(secs: f64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let budget = if secs.is_nan() || secs <= 0.0 {
            Duration::ZERO
        } else if secs >= MAX_BUDGET_SECS as f64 {
            Duration::from_secs(MAX_BUDGET_SECS)
        } else {
            Duration::from_secs_f64(secs)
        };
        Self::new(budget)
    }

    /// Returns the total budget this deadline was created with.
    #[must_use]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Returns the time elapsed since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    /// Returns the remaining allowance, saturating at zero.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.origin.elapsed())
    }

    /// Returns true once the budget is exhausted.
    ///
    /// Once this reports true it never reports false again.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.remaining().is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_deadline_is_not_expired() {
        let deadline = Deadline::new(Duration::from_secs(300));
        assert!(!deadline.expired());
        assert!(deadline.remaining() <= Duration::from_secs(300));
        assert!(deadline.remaining() > Duration::from_secs(299));
    }

    #[test]
    fn zero_budget_is_expired_immediately() {
        let deadline = Deadline::new(Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn negative_seconds_clamp_to_zero() {
        let deadline = Deadline::from_secs_f64(-5.0);
        assert!(deadline.expired());
        assert_eq!(deadline.budget(), Duration::ZERO);
    }

    #[test]
    fn nan_seconds_clamp_to_zero() {
        assert!(Deadline::from_secs_f64(f64::NAN).expired());
    }

    #[test]
    fn infinite_budget_caps_instead_of_expiring() {
        let deadline = Deadline::from_secs_f64(f64::INFINITY);
        assert!(!deadline.expired());
        assert_eq!(deadline.budget(), Duration::from_secs(MAX_BUDGET_SECS));
    }

    #[test]
    fn oversized_finite_budget_caps_without_panicking() {
        let deadline = Deadline::from_secs_f64(1e20);
        assert!(!deadline.expired());
        assert_eq!(deadline.budget(), Duration::from_secs(MAX_BUDGET_SECS));
    }

    #[test]
    fn remaining_never_exceeds_budget() {
        let deadline = Deadline::from_secs_f64(1.5);
        assert!(deadline.remaining() <= deadline.budget());
    }

    #[test]
    fn remaining_decreases_as_time_passes() {
        tokio_test::block_on(async {
            let deadline = Deadline::new(Duration::from_millis(100));
            let before = deadline.remaining();
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(deadline.remaining() < before);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_budget_elapses() {
        let deadline = Deadline::new(Duration::from_secs(2));
        assert!(!deadline.expired());

        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(deadline.expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn deadline_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync + Clone>() {}
        assert_send_sync::<Deadline>();
    }
}
