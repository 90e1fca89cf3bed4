// In-memory stream store for single-node deployments and tests

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{StreamRecord, StreamStatus, StreamStore, UpdateOutcome};
use crate::error::Result;

/// `DashMap`-backed [`StreamStore`]. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStreamStore {
    records: Arc<DashMap<String, StreamRecord>>,
}

impl MemoryStreamStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record. Returns the stream id.
    pub fn save(&self, record: StreamRecord) -> String {
        let stream_id = record.stream_id.clone();
        self.records.insert(stream_id.clone(), record);
        stream_id
    }

    /// Change a record's lifecycle status, keeping its viewer count.
    pub fn set_status(&self, stream_id: &str, status: StreamStatus) -> bool {
        self.records
            .get_mut(stream_id)
            .map(|mut record| record.status = status)
            .is_some()
    }

    pub fn remove(&self, stream_id: &str) -> Option<StreamRecord> {
        self.records.remove(stream_id).map(|(_, record)| record)
    }

    /// Current stored viewer count, `None` if the record is absent.
    #[must_use]
    pub fn viewer_count(&self, stream_id: &str) -> Option<i64> {
        self.records.get(stream_id).map(|r| r.hls_viewer_count)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn get(&self, stream_id: &str) -> Result<Option<StreamRecord>> {
        Ok(self.records.get(stream_id).map(|r| r.clone()))
    }

    async fn adjust_viewer_count(&self, stream_id: &str, delta: i64) -> Result<UpdateOutcome> {
        Ok(match self.records.get_mut(stream_id) {
            Some(mut record) => {
                record.hls_viewer_count = record.hls_viewer_count.saturating_add(delta).max(0);
                UpdateOutcome::Updated(record.hls_viewer_count)
            }
            None => UpdateOutcome::NotFound,
        })
    }

    async fn set_viewer_count(&self, stream_id: &str, viewer_count: u64) -> Result<UpdateOutcome> {
        Ok(match self.records.get_mut(stream_id) {
            Some(mut record) => {
                record.hls_viewer_count = i64::try_from(viewer_count).unwrap_or(i64::MAX);
                UpdateOutcome::Updated(record.hls_viewer_count)
            }
            None => UpdateOutcome::NotFound,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_record_is_not_found() {
        let store = MemoryStreamStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(
            store.adjust_viewer_count("missing", 3).await.unwrap(),
            UpdateOutcome::NotFound
        );
        assert_eq!(
            store.set_viewer_count("missing", 3).await.unwrap(),
            UpdateOutcome::NotFound
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_adjust_clamps_at_zero() {
        let store = MemoryStreamStore::new();
        store.save(StreamRecord::new("s1", StreamStatus::Broadcasting));

        assert_eq!(
            store.adjust_viewer_count("s1", 2).await.unwrap(),
            UpdateOutcome::Updated(2)
        );
        assert_eq!(
            store.adjust_viewer_count("s1", -5).await.unwrap(),
            UpdateOutcome::Updated(0)
        );
    }

    #[tokio::test]
    async fn test_set_status_keeps_count() {
        let store = MemoryStreamStore::new();
        store.save(StreamRecord::new("s1", StreamStatus::Broadcasting));
        store.set_viewer_count("s1", 4).await.unwrap();

        assert!(store.set_status("s1", StreamStatus::Finished));
        let record = store.get("s1").await.unwrap().unwrap();
        assert_eq!(record.status, StreamStatus::Finished);
        assert_eq!(record.hls_viewer_count, 4);
        assert!(!store.set_status("missing", StreamStatus::Finished));
    }
}
