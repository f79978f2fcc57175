//! Bounded retries around a single relay send.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::{
    classifier::{ErrorKind, classify},
    error::RelayError,
    policy::RetryPolicy,
    relay::{Relay, RelayReceipt},
    types::{MessageJob, RelayConfig, RetryStatsSnapshot},
};

/// Batch-wide retry counters, updated concurrently by every worker.
#[derive(Debug, Default)]
pub struct RetryStats {
    total_retries: AtomicU64,
    max_retries_used: AtomicU32,
    success_after_retry: AtomicU64,
}

impl RetryStats {
    /// Account for a finished job that took `attempts` attempts.
    pub fn record(&self, attempts: u32, success: bool) {
        let retries = attempts.saturating_sub(1);
        self.total_retries
            .fetch_add(u64::from(retries), Ordering::Relaxed);
        self.max_retries_used.fetch_max(retries, Ordering::Relaxed);
        if success && retries > 0 {
            self.success_after_retry.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> RetryStatsSnapshot {
        RetryStatsSnapshot {
            total_retries: self.total_retries.load(Ordering::Relaxed),
            max_retries_used: self.max_retries_used.load(Ordering::Relaxed),
            success_after_retry: self.success_after_retry.load(Ordering::Relaxed),
        }
    }
}

/// The last error of a job that ran out of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendFailure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted {
    pub attempts: u32,
    pub result: Result<RelayReceipt, SendFailure>,
}

impl Attempted {
    #[must_use]
    pub const fn succeeded_after_retry(&self) -> bool {
        self.result.is_ok() && self.attempts > 1
    }
}

#[derive(Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
    stats: RetryStats,
}

impl RetryController {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            stats: RetryStats::default(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    #[must_use]
    pub fn stats(&self) -> RetryStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send `job`, retrying failures with backoff until it succeeds or the
    /// policy's attempts are used up.
    pub async fn send(&self, relay: &dyn Relay, job: &MessageJob, config: &RelayConfig) -> Attempted {
        let timeout_ms = u64::try_from(self.policy.attempt_timeout.as_millis()).unwrap_or(u64::MAX);
        let mut attempt_index = 0;

        let attempted = loop {
            let attempt = attempt_index + 1;
            debug!(index = job.index, recipient = %job.to, attempt, "Sending");

            let result =
                match tokio::time::timeout(self.policy.attempt_timeout, relay.send(job, config))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RelayError::Timeout(timeout_ms)),
                };

            let error = match result {
                Ok(receipt) => {
                    break Attempted {
                        attempts: attempt,
                        result: Ok(receipt),
                    };
                }
                Err(error) => error.to_string(),
            };

            let kind = classify(&error);
            warn!(
                index = job.index,
                recipient = %job.to,
                attempt,
                error_kind = %kind,
                %error,
                "Send attempt failed"
            );

            if !self.policy.should_retry(attempt_index) {
                break Attempted {
                    attempts: attempt,
                    result: Err(SendFailure {
                        kind,
                        message: error,
                    }),
                };
            }

            let delay = self.policy.backoff(attempt_index);
            debug!(
                index = job.index,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Backing off before retry"
            );
            tokio::time::sleep(delay).await;
            attempt_index += 1;
        };

        self.stats
            .record(attempted.attempts, attempted.result.is_ok());
        attempted
    }
}
