//! Chunked fan-out of jobs over a bounded set of tasks.

use std::{sync::Arc, time::Duration};

use courier_common::internal;
use tokio::{task::JoinSet, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{ProgressCallback, history::HistoryProjector, retry::RetryController};
use crate::{
    classifier::ErrorKind,
    rate_limiter::RateLimiter,
    relay::Relay,
    throughput::ThroughputMonitor,
    types::{DispatchOutcome, HistoryRecord, MessageJob, RelayConfig},
};

/// Everything a worker task needs, shared by all of them.
pub struct Worker {
    pub relay: Arc<dyn Relay>,
    pub config: Arc<RelayConfig>,
    pub limiter: Arc<RateLimiter>,
    pub retry: Arc<RetryController>,
    pub max_concurrent: usize,
    pub cancel: CancellationToken,
}

impl Worker {
    /// Run one job to completion, unless the batch is cancelled before it
    /// gets a send permit.
    async fn run(&self, job: &MessageJob) -> DispatchOutcome {
        let slot = job.index % self.max_concurrent;

        if self.cancel.is_cancelled() {
            return DispatchOutcome::cancelled(job, slot);
        }
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => return DispatchOutcome::cancelled(job, slot),
            () = self.limiter.wait_if_needed() => {}
        }

        let started = Instant::now();
        let attempted = self
            .retry
            .send(self.relay.as_ref(), job, &self.config)
            .await;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let succeeded_after_retry = attempted.succeeded_after_retry();

        match attempted.result {
            Ok(receipt) => DispatchOutcome {
                success: true,
                index: job.index,
                recipient: job.to.clone(),
                duration_ms,
                attempts: attempted.attempts,
                error_kind: None,
                error: None,
                message_id: receipt.message_id,
                slot,
                succeeded_after_retry,
                cancelled: false,
            },
            Err(failure) => DispatchOutcome {
                success: false,
                index: job.index,
                recipient: job.to.clone(),
                duration_ms,
                attempts: attempted.attempts,
                error_kind: Some(failure.kind),
                error: Some(failure.message),
                message_id: None,
                slot,
                succeeded_after_retry: false,
                cancelled: false,
            },
        }
    }
}

/// Tuning for the chunk loop.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub chunk_size: usize,
    pub max_concurrent: usize,
    pub delay_between_chunks: Duration,
}

/// Results collected by the aggregating loop.
#[derive(Debug, Default)]
pub struct PoolResult {
    pub outcomes: Vec<DispatchOutcome>,
    pub records: Vec<HistoryRecord>,
    pub monitor: ThroughputMonitor,
}

/// Single owner of the outcome list, history buffer and throughput monitor.
struct Aggregator<'a> {
    result: PoolResult,
    projector: &'a HistoryProjector,
    progress: Option<ProgressCallback>,
    total: usize,
}

impl Aggregator<'_> {
    fn push(&mut self, job: &MessageJob, outcome: DispatchOutcome) {
        if !outcome.cancelled {
            let rate = self.result.monitor.record_completion();
            internal!(
                level = DEBUG,
                index = outcome.index,
                success = outcome.success,
                attempts = outcome.attempts,
                rate,
                "Job finished"
            );
        }

        self.result.records.push(self.projector.project(job, &outcome));
        self.result.outcomes.push(outcome);

        if let Some(progress) = &self.progress {
            progress(self.result.outcomes.len(), self.total);
        }
    }
}

/// Dispatch `jobs` chunk by chunk.
///
/// Within a chunk at most `max_concurrent` jobs are in flight; the chunk is
/// fully drained before the inter-chunk pause. Every job yields exactly one
/// outcome, including jobs whose task panicked and jobs skipped because of
/// cancellation.
pub async fn run(
    worker: Arc<Worker>,
    jobs: Vec<MessageJob>,
    settings: PoolSettings,
    projector: &HistoryProjector,
    progress: Option<ProgressCallback>,
) -> PoolResult {
    let total = jobs.len();
    let total_chunks = total.div_ceil(settings.chunk_size);
    let jobs: Vec<Arc<MessageJob>> = jobs.into_iter().map(Arc::new).collect();

    let mut aggregator = Aggregator {
        result: PoolResult {
            outcomes: Vec::with_capacity(total),
            records: Vec::with_capacity(total),
            monitor: ThroughputMonitor::new(),
        },
        projector,
        progress,
        total,
    };

    for (chunk_index, chunk) in jobs.chunks(settings.chunk_size).enumerate() {
        let chunk_number = chunk_index + 1;

        if worker.cancel.is_cancelled() {
            for job in chunk {
                let slot = job.index % settings.max_concurrent;
                aggregator.push(job, DispatchOutcome::cancelled(job, slot));
            }
            continue;
        }

        info!(
            chunk = chunk_number,
            total_chunks,
            jobs = chunk.len(),
            "Dispatching chunk"
        );

        let successful = run_chunk(&worker, chunk, settings.max_concurrent, &mut aggregator).await;

        info!(
            chunk = chunk_number,
            total_chunks,
            successful,
            jobs = chunk.len(),
            rate = aggregator.result.monitor.current(),
            peak = aggregator.result.monitor.peak(),
            "Chunk complete"
        );

        if chunk_number < total_chunks && !settings.delay_between_chunks.is_zero() {
            internal!(
                level = DEBUG,
                delay_ms = u64::try_from(settings.delay_between_chunks.as_millis()).unwrap_or(u64::MAX),
                "Pausing between chunks"
            );
            tokio::select! {
                () = worker.cancel.cancelled() => {}
                () = tokio::time::sleep(settings.delay_between_chunks) => {}
            }
        }
    }

    aggregator.result.outcomes.sort_by_key(|outcome| outcome.index);
    aggregator.result
}

/// Run one chunk, returning how many of its jobs succeeded.
async fn run_chunk(
    worker: &Arc<Worker>,
    chunk: &[Arc<MessageJob>],
    max_concurrent: usize,
    aggregator: &mut Aggregator<'_>,
) -> usize {
    let mut join_set: JoinSet<(usize, DispatchOutcome)> = JoinSet::new();
    let mut finished = vec![false; chunk.len()];
    let mut successful = 0;
    let mut pending = chunk.iter().enumerate();

    let spawn = |join_set: &mut JoinSet<_>, position: usize, job: &Arc<MessageJob>| {
        let worker = Arc::clone(worker);
        let job = Arc::clone(job);
        join_set.spawn(async move { (position, worker.run(&job).await) });
    };

    for (position, job) in pending.by_ref().take(max_concurrent) {
        spawn(&mut join_set, position, job);
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((position, outcome)) => {
                finished[position] = true;
                successful += usize::from(outcome.success);
                aggregator.push(&chunk[position], outcome);
            }
            Err(err) => {
                // The job is identified once the chunk has drained.
                error!(error = %err, "Dispatch task failed");
            }
        }

        if let Some((position, job)) = pending.next() {
            spawn(&mut join_set, position, job);
        }
    }

    for (position, job) in chunk.iter().enumerate() {
        if !finished[position] {
            aggregator.push(job, panicked(job, max_concurrent));
        }
    }

    successful
}

fn panicked(job: &MessageJob, max_concurrent: usize) -> DispatchOutcome {
    DispatchOutcome {
        success: false,
        index: job.index,
        recipient: job.to.clone(),
        duration_ms: 0,
        attempts: 1,
        error_kind: Some(ErrorKind::GeneralError),
        error: Some("dispatch task panicked".to_string()),
        message_id: None,
        slot: job.index % max_concurrent,
        succeeded_after_retry: false,
        cancelled: false,
    }
}
