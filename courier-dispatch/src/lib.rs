//! Batch email dispatch engine.
//!
//! A [`Dispatcher`] sends a list of [`MessageJob`]s through a [`Relay`]:
//! - jobs run in chunks, with bounded concurrency inside a chunk and a pause
//!   between chunks
//! - every send waits on a per-batch [`RateLimiter`] and is retried with
//!   exponential backoff
//! - failures are classified into an [`ErrorKind`]
//! - one [`HistoryRecord`] per job is written to a [`HistoryStore`]
//!
//! The result is a [`BatchReport`]: a [`BatchSummary`] plus every outcome.

pub mod classifier;
pub mod content;
mod error;
pub mod policy;
mod processor;
pub mod rate_limiter;
mod relay;
mod smtp_relay;
mod store;
pub mod throughput;
mod types;

pub use classifier::{ErrorKind, classify};
pub use courier_smtp::Security;
pub use error::{ContentError, DispatchError, RelayError, StoreError};
pub use policy::RetryPolicy;
pub use processor::{
    DispatchOptions, Dispatcher, ProgressCallback, history::parse_recipient,
    summary::target_achieved,
};
pub use rate_limiter::RateLimiter;
pub use relay::{Relay, RelayReceipt};
pub use smtp_relay::{ProbeReport, SmtpRelay};
pub use store::{HistoryStore, JsonLinesHistoryStore, MemoryHistoryStore};
pub use throughput::ThroughputMonitor;
pub use tokio_util::sync::CancellationToken;
pub use types::{
    AttachmentRef, BatchReport, BatchSummary, Correlation, DeliveryStatus, DispatchOutcome,
    HistoryRecord, HistoryStats, MessageJob, RelayConfig, RetryStatsSnapshot, SendType,
};
