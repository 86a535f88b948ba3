//! # Retry Policy Module
//!
//! One exponential-backoff policy shared by every retrying call site:
//! workspace resolution, relay delivery and credential refresh. Each call site
//! supplies its own predicate deciding which errors are worth another attempt.
//!
//! The policy is bounded by total elapsed time rather than attempt count. An
//! attempt is never started once the remaining budget is exhausted, and each
//! attempt is itself cut off when the budget runs out. Callers sharing one
//! deadline across several retried steps use [`RetryPolicy::retry_until`].

use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Exponential backoff bounded by a maximum elapsed time.
///
/// # Examples
///
/// ```rust
/// use hook_relay_core::retry::RetryPolicy;
/// use std::time::Duration;
///
/// // 2s, 4s, 8s, ... until 30s have elapsed
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.calculate_delay(0), Duration::from_secs(2));
/// assert_eq!(policy.calculate_delay(2), Duration::from_secs(8));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_interval: Duration,

    /// Growth factor applied after every retry
    pub multiplier: f64,

    /// Cap on a single delay
    pub max_interval: Duration,

    /// Total time budget across all attempts and delays
    pub max_elapsed: Duration,

    /// Random spread applied to each delay (0.0 disables jitter)
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            max_elapsed: Duration::from_secs(30),
            jitter_percent: 0.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_interval: Duration, multiplier: f64, max_elapsed: Duration) -> Self {
        Self {
            initial_interval,
            multiplier,
            max_elapsed,
            ..Self::default()
        }
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = max_interval;
        self
    }

    /// Delay before retry number `attempt` (0-based).
    ///
    /// `initial * multiplier^attempt`, capped at `max_interval`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_secs =
            self.initial_interval.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped_secs = base_secs.min(self.max_interval.as_secs_f64());

        let final_secs = if self.jitter_percent > 0.0 {
            Self::add_jitter(capped_secs, self.jitter_percent)
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent;
        if jitter_range <= 0.0 {
            return delay_secs;
        }
        let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }

    /// Run `operation` until it succeeds, fails permanently or the budget
    /// runs out.
    ///
    /// `operation` receives the 1-based attempt number. `is_retryable` decides
    /// whether a failure earns another attempt.
    pub async fn retry<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        self.retry_until(
            operation_name,
            Instant::now() + self.max_elapsed,
            operation,
            is_retryable,
        )
        .await
    }

    /// [`retry`](Self::retry) that also stops at `deadline`, whichever of
    /// the deadline and the policy budget comes first.
    pub async fn retry_until<T, E, F, Fut, P>(
        &self,
        operation_name: &str,
        deadline: Instant,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
        E: Display,
    {
        let start = Instant::now();
        let deadline = deadline.min(start + self.max_elapsed);
        let budget = deadline.saturating_duration_since(start);
        let mut state = RetryState::new();
        let mut last_error: Option<E> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RetryError::Exhausted {
                    attempts: state.attempts_made(),
                    elapsed: start.elapsed(),
                    last_error,
                });
            }

            let attempt = state.total_attempts;
            let result = match tokio::time::timeout(remaining, operation(attempt)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        operation = operation_name,
                        attempt,
                        budget_ms = budget.as_millis() as u64,
                        "Attempt cut off by retry budget"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        elapsed: start.elapsed(),
                        last_error,
                    });
                }
            };

            match result {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) if !is_retryable(&error) => {
                    return Err(RetryError::Permanent {
                        attempts: attempt,
                        error,
                    });
                }
                Err(error) => {
                    let delay = state.get_delay(self);

                    if Instant::now() + delay >= deadline {
                        let elapsed = start.elapsed();
                        warn!(
                            operation = operation_name,
                            attempt,
                            elapsed_ms = elapsed.as_millis() as u64,
                            error = %error,
                            "Retry budget exhausted"
                        );
                        return Err(RetryError::Exhausted {
                            attempts: attempt,
                            elapsed,
                            last_error: Some(error),
                        });
                    }

                    warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, backing off"
                    );
                    last_error = Some(error);
                    tokio::time::sleep(delay).await;
                    state.next_attempt();
                }
            }
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The predicate rejected the error.
    Permanent { attempts: u32, error: E },

    /// The time budget ran out. `last_error` is `None` when the final attempt
    /// was cut off rather than failing on its own.
    Exhausted {
        attempts: u32,
        elapsed: Duration,
        last_error: Option<E>,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Permanent { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    /// The most recent underlying error, if any.
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::Permanent { error, .. } => Some(error),
            Self::Exhausted { last_error, .. } => last_error,
        }
    }
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Permanent { attempts, error } => {
                write!(f, "permanent failure after {} attempt(s): {}", attempts, error)
            }
            Self::Exhausted {
                attempts,
                elapsed,
                last_error: Some(error),
            } => write!(
                f,
                "gave up after {} attempt(s) in {}ms: {}",
                attempts,
                elapsed.as_millis(),
                error
            ),
            Self::Exhausted {
                attempts, elapsed, ..
            } => write!(
                f,
                "gave up after {} attempt(s) in {}ms: retry budget exhausted",
                attempts,
                elapsed.as_millis()
            ),
        }
    }
}

/// Tracks progress through a retry loop.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry number (0-based)
    pub attempt: u32,

    /// 1-based number of the attempt about to run
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    fn attempts_made(&self) -> u32 {
        self.total_attempts - 1
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
