use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use courier_smtp::Security;
use serde::{Deserialize, Serialize};

use crate::classifier::ErrorKind;

/// A file to attach, referenced by local path or `http(s)` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub filename: String,
    pub path: String,
    pub content_type: String,
}

impl AttachmentRef {
    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.path.starts_with("http://") || self.path.starts_with("https://")
    }
}

/// Identifiers carried through to the history record. Never used for sending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub template_name: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
}

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageJob {
    /// Zero-based position in the batch.
    pub index: usize,
    /// Recipient, either `addr@domain` or `Name <addr@domain>`.
    pub to: String,
    pub subject: String,
    /// Rendered HTML body.
    pub html: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRef>,
    /// Overrides the relay's default sender display name.
    #[serde(default)]
    pub from_name: Option<String>,
    /// Overrides the relay's default sender address.
    #[serde(default)]
    pub from_address: Option<String>,
    #[serde(default)]
    pub correlation: Correlation,
}

impl MessageJob {
    pub fn new(
        index: usize,
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            index,
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            attachments: Vec::new(),
            from_name: None,
            from_address: None,
            correlation: Correlation::default(),
        }
    }
}

/// Connection and identity settings for the outbound relay.
#[derive(Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub host: String,
    #[serde(default = "RelayConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub security: Security,
    /// Login name. Falls back to [`RelayConfig::from_address`] when absent.
    #[serde(default)]
    pub username: Option<String>,
    /// No `AUTH` is attempted without a password.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub from_name: Option<String>,
    pub from_address: String,
    /// Name sent with `EHLO`. Defaults to `localhost`.
    #[serde(default)]
    pub helo_name: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl RelayConfig {
    const fn default_port() -> u16 {
        587
    }

    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, from_address: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            security: Security::for_port(port),
            username: None,
            password: None,
            from_name: None,
            from_address: from_address.into(),
            helo_name: None,
            accept_invalid_certs: false,
        }
    }

    /// The account used for `AUTH`.
    #[must_use]
    pub fn login(&self) -> &str {
        self.username
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.from_address)
    }

    #[must_use]
    pub fn helo_name(&self) -> &str {
        self.helo_name.as_deref().unwrap_or("localhost")
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from_name", &self.from_name)
            .field("from_address", &self.from_address)
            .field("helo_name", &self.helo_name)
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish()
    }
}

/// What happened to one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    pub index: usize,
    pub recipient: String,
    pub duration_ms: u64,
    /// Attempts made. Zero only for jobs cancelled before they started.
    pub attempts: u32,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
    /// Provider message id returned by the relay on success.
    pub message_id: Option<String>,
    /// `index % max_concurrent`, kept for log correlation.
    pub slot: usize,
    pub succeeded_after_retry: bool,
    pub cancelled: bool,
}

impl DispatchOutcome {
    /// Outcome for a job that never started because the batch was cancelled.
    #[must_use]
    pub fn cancelled(job: &MessageJob, slot: usize) -> Self {
        Self {
            success: false,
            index: job.index,
            recipient: job.to.clone(),
            duration_ms: 0,
            attempts: 0,
            error_kind: None,
            error: None,
            message_id: None,
            slot,
            succeeded_after_retry: false,
            cancelled: true,
        }
    }

    /// `"<ErrorKind>: <message>"` for failed jobs.
    #[must_use]
    pub fn error_summary(&self) -> Option<String> {
        match (&self.error_kind, &self.error) {
            (Some(kind), Some(error)) => Some(format!("{kind}: {error}")),
            (Some(kind), None) => Some(kind.to_string()),
            (None, Some(error)) => Some(error.clone()),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendType {
    #[default]
    Batch,
}

/// Row persisted for every outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub batch_id: String,
    pub template_id: Option<String>,
    pub template_name: Option<String>,
    pub recipient_id: Option<String>,
    pub recipient_name: String,
    pub recipient_address: String,
    pub sender_name: Option<String>,
    pub sender_address: String,
    pub status: DeliveryStatus,
    pub send_type: SendType,
    pub error: Option<String>,
    pub sent_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryStatsSnapshot {
    pub total_retries: u64,
    pub max_retries_used: u32,
    pub success_after_retry: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub written: usize,
    pub dropped: usize,
}

/// Aggregate report for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub avg_throughput: f64,
    pub peak_throughput: f64,
    pub total_duration_seconds: f64,
    pub target_achieved: bool,
    pub avg_email_duration_ms: u64,
    pub success_rate_percent: f64,
    pub error_breakdown: BTreeMap<ErrorKind, usize>,
    pub retry_stats: RetryStatsSnapshot,
    pub history: HistoryStats,
}

/// The summary plus every per-job outcome, ordered by job index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub outcomes: Vec<DispatchOutcome>,
}
