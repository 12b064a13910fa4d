//! Bounded retry with exponential backoff.
//!
//! `run_with_retry` executes a blocking, fallible action on the blocking pool
//! up to `max_attempts` times. Errors and panics raised by the action are both
//! turned into a failed attempt; nothing escapes past this boundary.

use std::any::Any;
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::error::{truncate_error, LoadError};

/// Default number of attempts per operation.
/// 3 attempts ride out a brief store hiccup without delaying startup much.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds, doubled after each failed attempt.
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 200;

/// Upper bound on a single backoff delay in milliseconds.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(DEFAULT_INITIAL_BACKOFF_MS),
            max_backoff: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// At least one attempt is always made; `max_backoff` is raised to
    /// `initial_backoff` if it is smaller.
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Retry immediately, without sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    ///
    /// Non-decreasing in `attempt` and never above `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << doublings)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Result of a retried operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    Succeeded { value: T, attempts: u32 },
    Failed { attempts: u32, last_error: String },
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, RetryOutcome::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Extract a readable message from a panic payload
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run `action` until it succeeds or `policy.max_attempts` is exhausted.
///
/// `operation` names the work in log output. Each attempt runs on tokio's
/// blocking pool, so a synchronous data-access call never stalls the async
/// workers.
pub async fn run_with_retry<T, E, F>(operation: &str, policy: &RetryPolicy, action: F) -> RetryOutcome<T>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    let action = Arc::new(action);
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let action = Arc::clone(&action);
        let error_text = match tokio::task::spawn_blocking(move || action()).await {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return RetryOutcome::Succeeded {
                    value,
                    attempts: attempt,
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(join_err) if join_err.is_panic() => {
                LoadError::Panicked(panic_message(join_err.into_panic())).to_string()
            }
            Err(join_err) => join_err.to_string(),
        };

        last_error = truncate_error(&error_text);

        if attempt < max_attempts {
            let backoff = policy.backoff_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts,
                backoff_ms = backoff.as_millis() as u64,
                error = %last_error,
                "Attempt failed, backing off"
            );
            tokio::time::sleep(backoff).await;
        } else {
            warn!(operation, attempt, max_attempts, error = %last_error, "Attempt failed");
        }
    }

    error!(operation, attempts = max_attempts, error = %last_error, "Retry budget exhausted");
    RetryOutcome::Failed {
        attempts: max_attempts,
        last_error,
    }
}
