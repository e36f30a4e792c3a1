//! Optimistic-concurrency retry with exponential backoff.
//!
//! Rating and comment writes follow load → compute → conditional save. When
//! the save loses a race ([`StoreError::VersionConflict`]) the whole attempt
//! is re-run against freshly loaded state. Every other error ends the
//! operation immediately.
//!
//! # Example
//!
//! ```rust
//! use bookshelf_runtime::retry::{AttemptError, RetryPolicy, retry_on_conflict};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), bookshelf_core::EngagementError> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(5))
//!     .build();
//!
//! let value = retry_on_conflict(&policy, "example", |_attempt| async {
//!     Ok::<_, AttemptError>(42)
//! })
//! .await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::metrics::EngagementMetrics;
use bookshelf_core::{EngagementError, StoreError};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `initial_delay`: 5ms
/// - `max_delay`: 200ms
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first try
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

const DEFAULT_MAX_RETRIES: usize = 5;
const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(5);
const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(200);
const DEFAULT_MULTIPLIER: f64 = 2.0;

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Policy that retries immediately, for tests.
    #[must_use]
    pub const fn immediate(max_retries: usize) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_sign_loss
    )] // Delays are small, positive millisecond counts
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let exponent = attempt.min(32) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            initial_delay: self.initial_delay.unwrap_or(DEFAULT_INITIAL_DELAY),
            max_delay: self.max_delay.unwrap_or(DEFAULT_MAX_DELAY),
            multiplier: self.multiplier.unwrap_or(DEFAULT_MULTIPLIER),
        }
    }
}

/// Outcome of a failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// The conditional save lost a race; retry on fresh state
    Conflict(StoreError),
    /// Anything else; give up
    Fatal(EngagementError),
}

impl From<EngagementError> for AttemptError {
    fn from(err: EngagementError) -> Self {
        Self::Fatal(err)
    }
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            Self::Conflict(err)
        } else {
            Self::Fatal(err.into())
        }
    }
}

/// Run `attempt` until it succeeds, fails fatally, or conflicts more than
/// `policy.max_retries` times.
///
/// The closure receives the 0-based attempt number.
///
/// # Errors
///
/// Returns the fatal error unchanged, or [`EngagementError::Persistence`]
/// once retries are exhausted.
pub async fn retry_on_conflict<F, Fut, T>(
    policy: &RetryPolicy,
    operation: &'static str,
    mut attempt: F,
) -> Result<T, EngagementError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut tries = 0;

    loop {
        match attempt(tries).await {
            Ok(value) => {
                if tries > 0 {
                    tracing::debug!(operation, attempt = tries, "Write succeeded after retry");
                }
                return Ok(value);
            }
            Err(AttemptError::Fatal(err)) => return Err(err),
            Err(AttemptError::Conflict(err)) => {
                if tries >= policy.max_retries {
                    EngagementMetrics::record_retries_exhausted(operation);
                    tracing::error!(
                        operation,
                        attempt = tries,
                        error = %err,
                        "Write abandoned after repeated version conflicts"
                    );
                    return Err(EngagementError::Persistence(format!(
                        "{operation} gave up after {} conflicting writes",
                        tries + 1
                    )));
                }

                let delay = policy.delay_for_attempt(tries);
                EngagementMetrics::record_conflict_retry(operation);
                tracing::warn!(
                    operation,
                    attempt = tries,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "Version conflict, retrying on fresh state"
                );

                sleep(delay).await;
                tries += 1;
            }
        }
    }
}
