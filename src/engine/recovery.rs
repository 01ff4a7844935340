//! Bounded retry with a safe fallback, and a capped log of recent failures.

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{AutofillError, CoreResult};

/// Failures kept by [`ErrorReporter`]; older ones are dropped first.
pub const MAX_ERROR_RECORDS: usize = 100;

/// How often, and how patiently, a failed operation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Extra attempts after the first one (default: 1)
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base delay; attempt `n` waits `retry_delay_ms * (n + 1)` (default: 100)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_retry_count() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    100
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            retry_count: 0,
            ..Self::default()
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(u64::from(attempt) + 1))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorRecovery {
    policy: RetryPolicy,
    timeout_ms: Option<u64>,
}

impl ErrorRecovery {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            timeout_ms: None,
        }
    }

    /// Bound every [`execute`](Self::execute) call, attempts and backoff
    /// included, by one deadline.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout_ms
    }

    /// Run `operation`, retrying retryable failures with linear backoff.
    /// Returns the last error once attempts are used up or the error is not
    /// worth retrying. A panicking attempt fails with
    /// [`AutofillError::Unknown`]; running past the deadline fails with
    /// [`AutofillError::Timeout`].
    pub async fn execute<T, F, Fut>(&self, operation: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let Some(timeout_ms) = self.timeout_ms else {
            return self.attempts(operation).await;
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), self.attempts(operation)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(target: "autofill::error", timeout_ms, "deadline exceeded");
                Err(AutofillError::Timeout { timeout_ms })
            }
        }
    }

    async fn attempts<T, F, Fut>(&self, mut operation: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let total_attempts = self.policy.retry_count + 1;
        let mut attempt = 0;
        loop {
            let outcome = AssertUnwindSafe(operation())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    let message = panic_message(panic.as_ref());
                    error!(target: "autofill::error", panic = message.as_str(), "operation panicked");
                    Err(AutofillError::Unknown(message))
                });

            match outcome {
                Ok(value) => {
                    if attempt > 0 {
                        info!(
                            target: "autofill::error",
                            attempt,
                            total_attempts,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(
                        target: "autofill::error",
                        attempt = attempt + 1,
                        total_attempts,
                        error_kind = err.kind(),
                        error = %err,
                        "operation failed"
                    );

                    if !err.is_retryable() {
                        debug!(target: "autofill::error", error_kind = err.kind(), "error is not retryable");
                        return Err(err);
                    }
                    if attempt >= self.policy.retry_count {
                        return Err(err);
                    }

                    let delay = self.policy.delay_for(attempt);
                    debug!(
                        target: "autofill::error",
                        next_attempt = attempt + 2,
                        delay_ms = delay.as_millis() as u64,
                        "retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but a final failure is turned into a
    /// value by `fallback` instead of being returned.
    pub async fn execute_with_recovery<T, F, Fut, R>(&self, operation: F, fallback: R) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
        R: FnOnce(AutofillError) -> T,
    {
        match self.execute(operation).await {
            Ok(value) => value,
            Err(err) => {
                info!(target: "autofill::error", original_error = %err, "using fallback");
                fallback(err)
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic: <non-string payload>".to_string()
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    /// Epoch milliseconds
    pub timestamp: i64,
    /// Package or domain of the request that failed
    pub source: Option<String>,
}

#[derive(Debug, Default)]
struct ReporterState {
    recent: VecDeque<ErrorRecord>,
    counts: BTreeMap<String, u64>,
}

/// Cloneable handle to a capped log of recent failures with per-kind counts.
#[derive(Debug, Clone, Default)]
pub struct ErrorReporter {
    inner: Arc<Mutex<ReporterState>>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, error: &AutofillError, source: Option<&str>) {
        let record = ErrorRecord {
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            source: source.map(str::to_string),
        };

        let mut state = self.inner.lock();
        *state.counts.entry(record.kind.clone()).or_default() += 1;
        if state.recent.len() == MAX_ERROR_RECORDS {
            state.recent.pop_front();
        }
        state.recent.push_back(record);
    }

    /// Up to `limit` records, newest first.
    pub fn recent_errors(&self, limit: usize) -> Vec<ErrorRecord> {
        self.inner
            .lock()
            .recent
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn error_counts(&self) -> BTreeMap<String, u64> {
        self.inner.lock().counts.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.recent.clear();
        state.counts.clear();
    }
}
