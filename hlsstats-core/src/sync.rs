// Store synchronizer: forwards per-stream counter changes to the stream store.
//
// Stateless between flushes. Missing records are skipped, failures are logged
// and swallowed; the next sweep tick recomputes and flushes again.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::STORE_FLUSHES_TOTAL;
use crate::store::{StreamStore, UpdateOutcome};

/// How viewer counts are written to the shared record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Atomic add of the change since the last flush. Safe with many writers.
    #[default]
    Delta,
    /// Overwrite with this instance's count. Single-writer deployments only.
    Absolute,
}

/// Result of one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Count written; carries the stored value after the write.
    Written(i64),
    /// Nothing to write.
    Unchanged,
    /// The stream has no record in the store.
    NoRecord,
    /// Store unreachable or write rejected.
    Failed,
}

impl FlushOutcome {
    const fn label(self) -> &'static str {
        match self {
            Self::Written(_) => "written",
            Self::Unchanged => "unchanged",
            Self::NoRecord => "no_record",
            Self::Failed => "failed",
        }
    }
}

pub struct StoreSynchronizer {
    store: Arc<dyn StreamStore>,
    mode: SyncMode,
}

impl StoreSynchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn StreamStore>, mode: SyncMode) -> Self {
        Self { store, mode }
    }

    /// Push `current_viewer_count` for `stream_id` to the store.
    ///
    /// `delta` is the change since the last acknowledged flush and is what
    /// gets applied in [`SyncMode::Delta`].
    pub async fn flush(&self, stream_id: &str, current_viewer_count: u64, delta: i64) -> FlushOutcome {
        let outcome = self.try_flush(stream_id, current_viewer_count, delta).await;
        STORE_FLUSHES_TOTAL.with_label_values(&[outcome.label()]).inc();
        outcome
    }

    async fn try_flush(&self, stream_id: &str, current_viewer_count: u64, delta: i64) -> FlushOutcome {
        if self.mode == SyncMode::Delta && delta == 0 {
            return FlushOutcome::Unchanged;
        }

        let record = match self.store.get(stream_id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(stream_id = %stream_id, "No stream record, skipping viewer count write");
                return FlushOutcome::NoRecord;
            }
            Err(e) => {
                warn!(
                    stream_id = %stream_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to read stream record"
                );
                return FlushOutcome::Failed;
            }
        };

        let result = match self.mode {
            SyncMode::Delta => self.store.adjust_viewer_count(stream_id, delta).await,
            SyncMode::Absolute => {
                self.store
                    .set_viewer_count(stream_id, current_viewer_count)
                    .await
            }
        };

        match result {
            Ok(UpdateOutcome::Updated(stored)) => {
                debug!(
                    stream_id = %stream_id,
                    status = %record.status,
                    viewers = current_viewer_count,
                    delta,
                    stored,
                    "Flushed viewer count"
                );
                FlushOutcome::Written(stored)
            }
            Ok(UpdateOutcome::NotFound) => {
                debug!(stream_id = %stream_id, "Stream record removed during flush");
                FlushOutcome::NoRecord
            }
            Err(e) => {
                warn!(
                    stream_id = %stream_id,
                    error = %e,
                    transient = e.is_transient(),
                    "Failed to write viewer count, retrying next sweep"
                );
                FlushOutcome::Failed
            }
        }
    }
}
