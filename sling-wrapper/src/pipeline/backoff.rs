//! Waits between sync attempts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How the wait grows between attempts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// wait = base * 2^(attempt - 1)
    #[default]
    Exponential,
    /// wait = base * attempt
    Linear,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exponential => write!(f, "exponential"),
            Self::Linear => write!(f, "linear"),
        }
    }
}

/// Computes the wait after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    strategy: BackoffStrategy,
}

impl BackoffPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(base: Duration, strategy: BackoffStrategy) -> Self {
        Self { base, strategy }
    }

    /// Creates an exponential policy.
    #[must_use]
    pub const fn exponential(base: Duration) -> Self {
        Self::new(base, BackoffStrategy::Exponential)
    }

    /// Returns the base wait.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Returns the strategy.
    #[must_use]
    pub const fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    /// Wait after failed attempt number `attempt` (1-based). Saturates
    /// instead of overflowing.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let factor = match self.strategy {
            BackoffStrategy::Exponential => 2u32.checked_pow(attempt - 1),
            BackoffStrategy::Linear => Some(attempt),
        };
        factor
            .and_then(|f| self.base.checked_mul(f))
            .unwrap_or(Duration::MAX)
    }
}

/// Suspends the retry loop between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Waits for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_exponential_delays() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(5));
        let delays: Vec<_> = (1..=4).map(|a| policy.delay_for_attempt(a)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40),
            ]
        );
    }

    #[test]
    fn test_linear_delays() {
        let policy = BackoffPolicy::new(Duration::from_millis(100), BackoffStrategy::Linear);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn test_delay_saturates() {
        let policy = BackoffPolicy::exponential(Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(40), Duration::MAX);
        assert_eq!(
            BackoffPolicy::exponential(Duration::MAX).delay_for_attempt(2),
            Duration::MAX
        );
    }

    #[test]
    fn test_zero_base_never_waits() {
        let policy = BackoffPolicy::exponential(Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(10), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_sleeper_waits() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(30)).await;
        assert!(start.elapsed() >= Duration::from_secs(30));
    }
}
