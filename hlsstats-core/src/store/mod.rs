// Stream record store abstraction
//
// The persisted stream record is owned by an external store. This engine
// reads its lifecycle status and writes its viewer count, nothing else.

mod memory;
mod redis_store;

pub use memory::MemoryStreamStore;
pub use redis_store::RedisStreamStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Lifecycle status of a stream record. Read, never written, by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    #[default]
    Created,
    Broadcasting,
    Finished,
    /// Status value this engine does not know about.
    #[serde(other)]
    Unknown,
}

impl StreamStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Broadcasting => "broadcasting",
            Self::Finished => "finished",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a stored status string. Unrecognised values map to `Unknown`.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "created" => Self::Created,
            "broadcasting" => Self::Broadcasting,
            "finished" => Self::Finished,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally persisted stream record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub stream_id: String,
    #[serde(default)]
    pub status: StreamStatus,
    #[serde(default)]
    pub hls_viewer_count: i64,
}

impl StreamRecord {
    #[must_use]
    pub fn new(stream_id: impl Into<String>, status: StreamStatus) -> Self {
        Self {
            stream_id: stream_id.into(),
            status,
            hls_viewer_count: 0,
        }
    }
}

/// Result of a viewer-count write against the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Record updated; carries the stored count after the write.
    Updated(i64),
    /// No record for this stream id.
    NotFound,
}

/// Stream record store.
///
/// Implementations must treat a missing record as [`UpdateOutcome::NotFound`],
/// not as an error. Transport failures are errors.
#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Fetch the stream record, if it exists.
    async fn get(&self, stream_id: &str) -> Result<Option<StreamRecord>>;

    /// Atomically add `delta` to the viewer count (clamped at zero).
    ///
    /// Safe with several engine instances writing the same record.
    async fn adjust_viewer_count(&self, stream_id: &str, delta: i64) -> Result<UpdateOutcome>;

    /// Overwrite the viewer count. Only correct with a single writer.
    async fn set_viewer_count(&self, stream_id: &str, viewer_count: u64) -> Result<UpdateOutcome>;
}
