use std::{collections::BTreeMap, time::Duration};

use crate::{
    classifier::ErrorKind,
    types::{BatchSummary, DispatchOutcome, HistoryStats, RetryStatsSnapshot},
};

/// Inputs gathered while a batch ran.
pub struct SummaryInputs<'a> {
    pub batch_id: &'a str,
    pub outcomes: &'a [DispatchOutcome],
    pub elapsed: Duration,
    pub peak_throughput: f64,
    pub target_throughput: f64,
    pub retry_stats: RetryStatsSnapshot,
    pub history: HistoryStats,
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn build(inputs: &SummaryInputs<'_>) -> BatchSummary {
    let total = inputs.outcomes.len();
    let successful = inputs.outcomes.iter().filter(|o| o.success).count();
    let cancelled = inputs.outcomes.iter().filter(|o| o.cancelled).count();

    let mut error_breakdown: BTreeMap<ErrorKind, usize> = BTreeMap::new();
    for kind in inputs.outcomes.iter().filter_map(|o| o.error_kind) {
        *error_breakdown.entry(kind).or_default() += 1;
    }

    let seconds = inputs.elapsed.as_secs_f64();
    let avg_throughput = if seconds > 0.0 {
        total as f64 / seconds
    } else {
        0.0
    };

    // Jobs cancelled before their first attempt have no duration.
    let (attempted, duration_sum) = inputs
        .outcomes
        .iter()
        .filter(|o| o.attempts > 0)
        .fold((0usize, 0u64), |(count, sum), o| {
            (count + 1, sum.saturating_add(o.duration_ms))
        });
    let avg_email_duration_ms = if attempted == 0 {
        0
    } else {
        (duration_sum as f64 / attempted as f64).round() as u64
    };

    let success_rate_percent = if total == 0 {
        0.0
    } else {
        round_to(successful as f64 / total as f64 * 100.0, 1)
    };

    BatchSummary {
        batch_id: inputs.batch_id.to_string(),
        total,
        successful,
        failed: total - successful,
        cancelled,
        avg_throughput: round_to(avg_throughput, 2),
        peak_throughput: round_to(inputs.peak_throughput, 2),
        total_duration_seconds: round_to(seconds, 2),
        target_achieved: target_achieved(
            avg_throughput,
            inputs.peak_throughput,
            inputs.target_throughput,
        ),
        avg_email_duration_ms,
        success_rate_percent,
        error_breakdown,
        retry_stats: inputs.retry_stats,
        history: inputs.history,
    }
}

/// Reached when the average is within 70% of the target or the peak hit it.
#[must_use]
pub fn target_achieved(avg: f64, peak: f64, target: f64) -> bool {
    avg >= target * 0.7 || peak >= target
}
