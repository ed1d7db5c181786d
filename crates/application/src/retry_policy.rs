//! Bounded exponential-backoff retries for audit store operations.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use pipeaudit_core::{AppError, AppResult};
use tokio::time::Instant;
use tracing::{debug, error, warn};

mod classification;


/// Named retry profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RetryTier {
    /// Regular audit writes.
    #[default]
    Default,
    /// Critical writes over an unstable store.
    Aggressive,
    /// Interactive reads that should fail fast.
    Quick,
}

impl RetryTier {
    /// Returns the configuration token for this tier.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Aggressive => "aggressive",
            Self::Quick => "quick",
        }
    }
}

impl fmt::Display for RetryTier {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for RetryTier {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "aggressive" => Ok(Self::Aggressive),
            "quick" => Ok(Self::Quick),
            other => Err(AppError::Configuration(format!(
                "unknown retry tier '{other}', expected default, aggressive or quick"
            ))),
        }
    }
}

/// Retry policy applied to store operations.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    tier: RetryTier,
    max_attempts: u32,
    initial_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::default_tier()
    }
}

impl RetryPolicy {
    /// Three attempts starting at one second, doubling, capped at thirty seconds.
    #[must_use]
    pub fn default_tier() -> Self {
        Self {
            tier: RetryTier::Default,
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Five attempts starting at half a second, growing by 1.5, capped at fifteen seconds.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            tier: RetryTier::Aggressive,
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            multiplier: 1.5,
            max_delay: Duration::from_secs(15),
        }
    }

    /// Two attempts starting at 100ms, doubling, capped at one second.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            tier: RetryTier::Quick,
            max_attempts: 2,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(1),
        }
    }

    /// Returns the preset for a tier.
    #[must_use]
    pub fn for_tier(tier: RetryTier) -> Self {
        match tier {
            RetryTier::Default => Self::default_tier(),
            RetryTier::Aggressive => Self::aggressive(),
            RetryTier::Quick => Self::quick(),
        }
    }

    /// Creates a custom policy; the tier only selects the transient vocabulary.
    pub fn new(
        tier: RetryTier,
        max_attempts: u32,
        initial_delay: Duration,
        multiplier: f64,
        max_delay: Duration,
    ) -> AppResult<Self> {
        if max_attempts == 0 {
            return Err(AppError::Configuration(
                "retry max_attempts must be at least 1".to_owned(),
            ));
        }

        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(AppError::Configuration(format!(
                "retry multiplier must be a finite number >= 1.0, got {multiplier}"
            )));
        }

        if max_delay < initial_delay {
            return Err(AppError::Configuration(
                "retry max_delay must not be shorter than initial_delay".to_owned(),
            ));
        }

        Ok(Self {
            tier,
            max_attempts,
            initial_delay,
            multiplier,
            max_delay,
        })
    }

    /// Returns the tier.
    #[must_use]
    pub fn tier(&self) -> RetryTier {
        self.tier
    }

    /// Returns the attempt budget, first attempt included.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the delay before the first retry.
    #[must_use]
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Returns the backoff multiplier.
    #[must_use]
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Returns the delay cap.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.powi(exponent);
        let delay_secs = self.initial_delay.as_secs_f64() * factor;

        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }

        Duration::from_secs_f64(delay_secs)
    }

    /// Returns whether `error` is a transient store failure worth another attempt.
    #[must_use]
    pub fn is_retryable(&self, error: &AppError) -> bool {
        error.is_retry_candidate() && classification::is_transient(self.tier, error)
    }

    /// Runs `operation` until it succeeds, fails fatally or the budget is spent.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut attempt_fn: F) -> AppResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let started_at = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            match attempt_fn().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "store operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) if !self.is_retryable(&failure) => {
                    debug!(
                        operation,
                        attempt,
                        error_code = failure.code(),
                        "store operation failed with a non-retryable error"
                    );
                    return Err(failure);
                }
                Err(failure) if attempt >= self.max_attempts => {
                    let elapsed_ms =
                        u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
                    error!(
                        operation,
                        attempts = attempt,
                        max_attempts = self.max_attempts,
                        elapsed_ms,
                        tier = %self.tier,
                        error = %failure,
                        "store operation retry budget exhausted"
                    );
                    return Err(AppError::RetryExhausted {
                        operation: operation.to_owned(),
                        attempts: attempt,
                        max_attempts: self.max_attempts,
                        elapsed_ms,
                        last_error: failure.to_string(),
                    });
                }
                Err(failure) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %failure,
                        "retrying store operation after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
