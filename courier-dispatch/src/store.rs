//! Delivery history persistence.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

use crate::{error::StoreError, types::HistoryRecord};

/// Destination for history records. One call writes one slice; a slice
/// either lands completely or the call fails.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_history_records(&self, records: &[HistoryRecord]) -> Result<(), StoreError>;
}

/// Keeps records in memory.
///
/// An optional capacity makes writes fail once the store would grow past it,
/// which is mostly useful for exercising the failure path.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<RwLock<Vec<HistoryRecord>>>,
    capacity: Option<usize>,
}

impl MemoryHistoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Arc::default(),
            capacity: Some(capacity),
        }
    }

    #[must_use]
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn insert_history_records(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        let mut stored = self.records.write();

        if let Some(capacity) = self.capacity
            && stored.len() + records.len() > capacity
        {
            return Err(StoreError::Rejected(format!(
                "capacity of {capacity} records exceeded"
            )));
        }

        stored.extend_from_slice(records);
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonLinesHistoryStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonLinesHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryStore for JsonLinesHistoryStore {
    async fn insert_history_records(&self, records: &[HistoryRecord]) -> Result<(), StoreError> {
        // Serialise the whole slice first so a bad record writes nothing.
        let mut buffer = Vec::with_capacity(records.len() * 256);
        for record in records {
            serde_json::to_writer(&mut buffer, record)?;
            buffer.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&buffer).await?;
        file.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::types::{DeliveryStatus, SendType};

    fn record(recipient: &str) -> HistoryRecord {
        HistoryRecord {
            batch_id: "batch".to_string(),
            template_id: Some("tpl-1".to_string()),
            template_name: Some("Welcome".to_string()),
            recipient_id: None,
            recipient_name: "ana".to_string(),
            recipient_address: recipient.to_string(),
            sender_name: None,
            sender_address: "news@acme.test".to_string(),
            status: DeliveryStatus::Delivered,
            send_type: SendType::Batch,
            error: None,
            sent_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_respects_capacity() {
        let store = MemoryHistoryStore::with_capacity(2);

        store
            .insert_history_records(&[record("a@x.test"), record("b@x.test")])
            .await
            .unwrap();
        let error = store
            .insert_history_records(&[record("c@x.test")])
            .await
            .unwrap_err();

        assert!(matches!(error, StoreError::Rejected(_)));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn json_lines_store_appends() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonLinesHistoryStore::new(dir.path().join("nested/history.jsonl"));

        store
            .insert_history_records(&[record("a@x.test")])
            .await
            .unwrap();
        store
            .insert_history_records(&[record("b@x.test"), record("c@x.test")])
            .await
            .unwrap();

        let contents = tokio::fs::read_to_string(store.path()).await.unwrap();
        let recipients: Vec<String> = contents
            .lines()
            .map(|line| {
                serde_json::from_str::<HistoryRecord>(line)
                    .unwrap()
                    .recipient_address
            })
            .collect();

        assert_eq!(recipients, vec!["a@x.test", "b@x.test", "c@x.test"]);
    }
}
