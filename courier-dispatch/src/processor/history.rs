//! Projection of outcomes into history records, and bounded store writes.

use std::sync::Arc;

use chrono::Utc;
use mailparse::MailAddr;
use tracing::{debug, error};

use crate::{
    store::HistoryStore,
    types::{
        DeliveryStatus, DispatchOutcome, HistoryRecord, HistoryStats, MessageJob, RelayConfig,
        SendType,
    },
};

/// Builds the history row for one outcome.
#[derive(Debug, Clone)]
pub struct HistoryProjector {
    batch_id: String,
    default_sender_name: Option<String>,
    default_sender_address: String,
}

impl HistoryProjector {
    #[must_use]
    pub fn new(batch_id: impl Into<String>, config: &RelayConfig) -> Self {
        Self {
            batch_id: batch_id.into(),
            default_sender_name: config.from_name.clone(),
            default_sender_address: config.from_address.clone(),
        }
    }

    #[must_use]
    pub fn project(&self, job: &MessageJob, outcome: &DispatchOutcome) -> HistoryRecord {
        let (display_name, address) = parse_recipient(&job.to);
        let recipient_name = job
            .correlation
            .recipient_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .or(display_name)
            .unwrap_or_else(|| local_part(&address).to_string());

        let status = if outcome.success {
            DeliveryStatus::Delivered
        } else if outcome.cancelled {
            DeliveryStatus::Cancelled
        } else {
            DeliveryStatus::Failed
        };

        HistoryRecord {
            batch_id: self.batch_id.clone(),
            template_id: job.correlation.template_id.clone(),
            template_name: job.correlation.template_name.clone(),
            recipient_id: job.correlation.recipient_id.clone(),
            recipient_name,
            recipient_address: address,
            sender_name: job
                .from_name
                .clone()
                .or_else(|| self.default_sender_name.clone()),
            sender_address: job
                .from_address
                .clone()
                .unwrap_or_else(|| self.default_sender_address.clone()),
            status,
            send_type: SendType::Batch,
            error: outcome.error_summary(),
            sent_at: Utc::now(),
        }
    }
}

/// Display name (if any) and bare address of a recipient string. Unparsable
/// input is kept verbatim as the address.
#[must_use]
pub fn parse_recipient(recipient: &str) -> (Option<String>, String) {
    let single = mailparse::addrparse(recipient)
        .ok()
        .and_then(|list| match list.first() {
            Some(MailAddr::Single(info)) => Some(info.clone()),
            Some(MailAddr::Group(group)) => group.addrs.first().cloned(),
            None => None,
        });

    single.map_or_else(
        || (None, recipient.trim().to_string()),
        |info| {
            (
                info.display_name.filter(|name| !name.trim().is_empty()),
                info.addr,
            )
        },
    )
}

fn local_part(address: &str) -> &str {
    address.split_once('@').map_or(address, |(local, _)| local)
}

/// Writes records to the store in slices of `batch_size`.
pub struct HistoryRecorder {
    store: Arc<dyn HistoryStore>,
    batch_size: usize,
}

impl HistoryRecorder {
    #[must_use]
    pub fn new(store: Arc<dyn HistoryStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    /// Write every record. A failed slice is logged and counted as dropped;
    /// it is never retried and never fails the batch.
    pub async fn record(&self, records: &[HistoryRecord]) -> HistoryStats {
        let mut stats = HistoryStats::default();

        for (slice_index, slice) in records.chunks(self.batch_size).enumerate() {
            match self.store.insert_history_records(slice).await {
                Ok(()) => {
                    debug!(slice = slice_index, records = slice.len(), "History slice written");
                    stats.written += slice.len();
                }
                Err(err) => {
                    error!(
                        slice = slice_index,
                        records = slice.len(),
                        error = %err,
                        "Failed to write history slice, dropping it"
                    );
                    stats.dropped += slice.len();
                }
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{classifier::ErrorKind, store::MemoryHistoryStore};

    fn outcome(job: &MessageJob, success: bool) -> DispatchOutcome {
        DispatchOutcome {
            success,
            index: job.index,
            recipient: job.to.clone(),
            duration_ms: 10,
            attempts: if success { 1 } else { 4 },
            error_kind: (!success).then_some(ErrorKind::AuthError),
            error: (!success).then(|| "SMTP auth invalid".to_string()),
            message_id: None,
            slot: 0,
            succeeded_after_retry: false,
            cancelled: false,
        }
    }

    fn config() -> RelayConfig {
        let mut config = RelayConfig::new("smtp.acme.test", 587, "news@acme.test");
        config.from_name = Some("Acme".to_string());
        config
    }

    #[test]
    fn parses_named_and_bare_recipients() {
        assert_eq!(
            parse_recipient("Ana Souza <ana@example.com>"),
            (Some("Ana Souza".to_string()), "ana@example.com".to_string())
        );
        assert_eq!(
            parse_recipient("bob@example.com"),
            (None, "bob@example.com".to_string())
        );
    }

    #[test]
    fn projects_success_and_failure() {
        let projector = HistoryProjector::new("b1", &config());
        let mut job = MessageJob::new(0, "carol@example.com", "Hi", "<p>Hi</p>");
        job.correlation.template_id = Some("tpl".to_string());

        let delivered = projector.project(&job, &outcome(&job, true));
        assert_eq!(delivered.status, DeliveryStatus::Delivered);
        assert_eq!(delivered.recipient_name, "carol");
        assert_eq!(delivered.sender_name.as_deref(), Some("Acme"));
        assert_eq!(delivered.template_id.as_deref(), Some("tpl"));
        assert_eq!(delivered.error, None);

        job.from_address = Some("sales@acme.test".to_string());
        job.correlation.recipient_name = Some("Carol".to_string());
        let failed = projector.project(&job, &outcome(&job, false));
        assert_eq!(failed.status, DeliveryStatus::Failed);
        assert_eq!(failed.recipient_name, "Carol");
        assert_eq!(failed.sender_address, "sales@acme.test");
        assert_eq!(failed.error.as_deref(), Some("AuthError: SMTP auth invalid"));
    }

    #[test]
    fn projects_cancelled() {
        let projector = HistoryProjector::new("b1", &config());
        let job = MessageJob::new(4, "Dan <dan@example.com>", "Hi", "<p>Hi</p>");

        let record = projector.project(&job, &DispatchOutcome::cancelled(&job, 4));
        assert_eq!(record.status, DeliveryStatus::Cancelled);
        assert_eq!(record.recipient_name, "Dan");
        assert_eq!(record.recipient_address, "dan@example.com");
    }

    #[tokio::test]
    async fn failed_slices_are_dropped_not_fatal() {
        let store = MemoryHistoryStore::with_capacity(300);
        let recorder = HistoryRecorder::new(Arc::new(store.clone()), 250);
        let projector = HistoryProjector::new("b1", &config());

        let records: Vec<_> = (0..600)
            .map(|i| {
                let job = MessageJob::new(i, format!("r{i}@example.com"), "s", "h");
                projector.project(&job, &outcome(&job, true))
            })
            .collect();

        let stats = recorder.record(&records).await;

        assert_eq!(stats, HistoryStats { written: 250, dropped: 350 });
        assert_eq!(store.len(), 250);
    }
}
