//! Batch dispatch orchestration.

pub mod history;
pub mod pool;
pub mod retry;
pub mod summary;

use std::{collections::HashSet, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};
use ulid::Ulid;

use crate::{
    error::DispatchError,
    policy::RetryPolicy,
    rate_limiter::RateLimiter,
    relay::Relay,
    store::HistoryStore,
    types::{BatchReport, MessageJob, RelayConfig},
};
use history::{HistoryProjector, HistoryRecorder};
use pool::{PoolSettings, Worker};
use retry::RetryController;
use summary::SummaryInputs;

/// Called with `(processed, total)` after every job.
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

mod defaults {
    pub const fn max_concurrent() -> usize {
        50
    }

    pub const fn chunk_size() -> usize {
        50
    }

    pub const fn delay_between_chunks_ms() -> u64 {
        2000
    }

    pub const fn attempt_timeout_ms() -> u64 {
        30_000
    }

    pub const fn max_retries() -> u32 {
        3
    }

    pub const fn target_throughput() -> f64 {
        50.0
    }

    pub const fn emails_per_second() -> u32 {
        2
    }

    pub const fn history_batch_size() -> usize {
        250
    }

    pub const fn backoff_base_ms() -> u64 {
        1000
    }

    pub const fn backoff_multiplier() -> f64 {
        1.5
    }

    pub const fn backoff_cap_ms() -> u64 {
        10_000
    }
}

/// Tuning for a batch. Every field has a serde default, so a config file
/// only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchOptions {
    /// Jobs in flight at once within a chunk.
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,

    /// Pause after each chunk except the last.
    #[serde(default = "defaults::delay_between_chunks_ms")]
    pub delay_between_chunks_ms: u64,

    #[serde(default = "defaults::attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Retries after the first attempt.
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Messages per second the batch aims for. Only affects `target_achieved`.
    #[serde(default = "defaults::target_throughput")]
    pub target_throughput: f64,

    /// Send ceiling. `0` disables rate limiting.
    #[serde(default = "defaults::emails_per_second")]
    pub emails_per_second: u32,

    /// Records per history store write.
    #[serde(default = "defaults::history_batch_size")]
    pub history_batch_size: usize,

    #[serde(default = "defaults::backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "defaults::backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Backoff randomisation, `0.0` to `1.0`.
    #[serde(default)]
    pub jitter_factor: f64,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::max_concurrent(),
            chunk_size: defaults::chunk_size(),
            delay_between_chunks_ms: defaults::delay_between_chunks_ms(),
            attempt_timeout_ms: defaults::attempt_timeout_ms(),
            max_retries: defaults::max_retries(),
            target_throughput: defaults::target_throughput(),
            emails_per_second: defaults::emails_per_second(),
            history_batch_size: defaults::history_batch_size(),
            backoff_base_ms: defaults::backoff_base_ms(),
            backoff_multiplier: defaults::backoff_multiplier(),
            backoff_cap_ms: defaults::backoff_cap_ms(),
            jitter_factor: 0.0,
        }
    }
}

impl DispatchOptions {
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] naming the first bad field.
    pub fn validate(&self) -> Result<(), DispatchError> {
        if self.max_concurrent == 0 {
            return Err(DispatchError::configuration("max_concurrent must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(DispatchError::configuration("chunk_size must be at least 1"));
        }
        if self.history_batch_size == 0 {
            return Err(DispatchError::configuration(
                "history_batch_size must be at least 1",
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(DispatchError::configuration(
                "attempt_timeout_ms must be at least 1",
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(DispatchError::configuration(
                "backoff_multiplier must be a finite number >= 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(DispatchError::configuration(
                "jitter_factor must be between 0 and 1",
            ));
        }
        if !self.target_throughput.is_finite() || self.target_throughput < 0.0 {
            return Err(DispatchError::configuration(
                "target_throughput must be a finite, non-negative number",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_multiplier: self.backoff_multiplier,
            backoff_cap: Duration::from_millis(self.backoff_cap_ms),
            jitter_factor: self.jitter_factor,
        }
    }

    const fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            chunk_size: self.chunk_size,
            max_concurrent: self.max_concurrent,
            delay_between_chunks: Duration::from_millis(self.delay_between_chunks_ms),
        }
    }
}

/// Runs batches against one relay and one history store.
pub struct Dispatcher {
    relay: Arc<dyn Relay>,
    store: Arc<dyn HistoryStore>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        relay: Arc<dyn Relay>,
        store: Arc<dyn HistoryStore>,
        options: DispatchOptions,
    ) -> Self {
        Self {
            relay,
            store,
            options,
        }
    }

    #[must_use]
    pub const fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Send every job and write its history.
    ///
    /// Per-job failures never fail the batch; they show up in the outcomes
    /// and the summary. `cancel` stops new jobs from starting: in-flight jobs
    /// finish and the rest are reported as cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] before sending anything if
    /// the job list is empty or reuses an index, the relay has no host or
    /// sender, or the options are invalid.
    #[instrument(skip_all, fields(jobs = jobs.len(), host = %config.host))]
    pub async fn dispatch_batch(
        &self,
        jobs: Vec<MessageJob>,
        config: RelayConfig,
        progress: Option<ProgressCallback>,
        cancel: Option<CancellationToken>,
    ) -> Result<BatchReport, DispatchError> {
        if jobs.is_empty() {
            return Err(DispatchError::configuration("no jobs to dispatch"));
        }
        let mut seen = HashSet::with_capacity(jobs.len());
        if let Some(job) = jobs.iter().find(|job| !seen.insert(job.index)) {
            return Err(DispatchError::Configuration(format!(
                "duplicate job index {}",
                job.index
            )));
        }
        if config.host.trim().is_empty() {
            return Err(DispatchError::configuration("relay host is empty"));
        }
        if config.from_address.trim().is_empty() {
            return Err(DispatchError::configuration("relay sender address is empty"));
        }
        self.options.validate()?;

        let batch_id = Ulid::new().to_string();
        let total = jobs.len();
        info!(
            batch_id = %batch_id,
            total,
            max_concurrent = self.options.max_concurrent,
            chunk_size = self.options.chunk_size,
            emails_per_second = self.options.emails_per_second,
            target_throughput = self.options.target_throughput,
            "Starting batch"
        );

        let projector = HistoryProjector::new(batch_id.as_str(), &config);
        let retry = Arc::new(RetryController::new(self.options.retry_policy()));
        let worker = Arc::new(Worker {
            relay: Arc::clone(&self.relay),
            config: Arc::new(config),
            limiter: Arc::new(RateLimiter::new(self.options.emails_per_second)),
            retry: Arc::clone(&retry),
            max_concurrent: self.options.max_concurrent,
            cancel: cancel.unwrap_or_default(),
        });

        let started = Instant::now();
        let result = pool::run(
            worker,
            jobs,
            self.options.pool_settings(),
            &projector,
            progress,
        )
        .await;
        let elapsed = started.elapsed();

        let history = HistoryRecorder::new(Arc::clone(&self.store), self.options.history_batch_size)
            .record(&result.records)
            .await;

        let summary = summary::build(&SummaryInputs {
            batch_id: &batch_id,
            outcomes: &result.outcomes,
            elapsed,
            peak_throughput: result.monitor.peak(),
            target_throughput: self.options.target_throughput,
            retry_stats: retry.stats(),
            history,
        });

        info!(
            batch_id = %batch_id,
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            cancelled = summary.cancelled,
            avg_throughput = summary.avg_throughput,
            peak_throughput = summary.peak_throughput,
            duration_secs = summary.total_duration_seconds,
            target_achieved = summary.target_achieved,
            total_retries = summary.retry_stats.total_retries,
            history_dropped = summary.history.dropped,
            "Batch finished"
        );

        Ok(BatchReport {
            summary,
            outcomes: result.outcomes,
        })
    }
}
