// Redis-backed stream store
//
// A stream record is a hash at "{prefix}stream:{stream_id}" with fields
// `status` and `hls_viewer_count`. Writes run as Lua scripts so they only
// touch records that already exist and several nodes can adjust the same
// count without losing updates.

use async_trait::async_trait;
use redis::aio::ConnectionManager as RedisConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use tracing::debug;

use super::{StreamRecord, StreamStatus, StreamStore, UpdateOutcome};
use crate::error::{Error, Result};

const STATUS_FIELD: &str = "status";
const VIEWER_COUNT_FIELD: &str = "hls_viewer_count";

/// Returned by the scripts when the record does not exist.
const NOT_FOUND: i64 = -1;

const ADJUST_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    local count = redis.call('HINCRBY', KEYS[1], ARGV[1], ARGV[2])
    if count < 0 then
        redis.call('HSET', KEYS[1], ARGV[1], 0)
        count = 0
    end
    return count
";

const SET_SCRIPT: &str = r"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
    return tonumber(ARGV[2])
";

/// [`StreamStore`] over a shared Redis hash per stream.
#[derive(Clone)]
pub struct RedisStreamStore {
    redis: RedisConnectionManager,
    key_prefix: String,
    adjust_script: redis::Script,
    set_script: redis::Script,
}

impl RedisStreamStore {
    #[must_use]
    pub fn new(redis: RedisConnectionManager, key_prefix: impl Into<String>) -> Self {
        Self {
            redis,
            key_prefix: key_prefix.into(),
            adjust_script: redis::Script::new(ADJUST_SCRIPT),
            set_script: redis::Script::new(SET_SCRIPT),
        }
    }

    /// Connect to `redis_url` and build a store.
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self::new(conn, key_prefix))
    }

    fn record_key(key_prefix: &str, stream_id: &str) -> String {
        format!("{key_prefix}stream:{stream_id}")
    }

    fn key(&self, stream_id: &str) -> String {
        Self::record_key(&self.key_prefix, stream_id)
    }

    /// Create or replace a stream record.
    ///
    /// Stream records belong to the stream lifecycle owner; this is for
    /// provisioning and tests.
    pub async fn save(&self, record: &StreamRecord) -> Result<()> {
        let mut conn = self.redis.clone();
        let key = self.key(&record.stream_id);
        let _: () = conn
            .hset_multiple(
                &key,
                &[
                    (STATUS_FIELD, record.status.as_str().to_string()),
                    (VIEWER_COUNT_FIELD, record.hls_viewer_count.to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    fn outcome(stream_id: &str, raw: i64) -> UpdateOutcome {
        if raw == NOT_FOUND {
            debug!(stream_id = %stream_id, "Stream record not found in Redis");
            UpdateOutcome::NotFound
        } else {
            UpdateOutcome::Updated(raw)
        }
    }
}

#[async_trait]
impl StreamStore for RedisStreamStore {
    async fn get(&self, stream_id: &str) -> Result<Option<StreamRecord>> {
        let mut conn = self.redis.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.key(stream_id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let status = fields
            .get(STATUS_FIELD)
            .map_or(StreamStatus::Unknown, |s| StreamStatus::parse(s));
        let hls_viewer_count = match fields.get(VIEWER_COUNT_FIELD) {
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                Error::Store(format!("Invalid viewer count for stream {stream_id}: {e}"))
            })?,
            None => 0,
        };

        Ok(Some(StreamRecord {
            stream_id: stream_id.to_string(),
            status,
            hls_viewer_count,
        }))
    }

    async fn adjust_viewer_count(&self, stream_id: &str, delta: i64) -> Result<UpdateOutcome> {
        let mut conn = self.redis.clone();
        let raw: i64 = self
            .adjust_script
            .key(self.key(stream_id))
            .arg(VIEWER_COUNT_FIELD)
            .arg(delta)
            .invoke_async(&mut conn)
            .await?;
        Ok(Self::outcome(stream_id, raw))
    }

    async fn set_viewer_count(&self, stream_id: &str, viewer_count: u64) -> Result<UpdateOutcome> {
        let mut conn = self.redis.clone();
        let raw: i64 = self
            .set_script
            .key(self.key(stream_id))
            .arg(VIEWER_COUNT_FIELD)
            .arg(viewer_count)
            .invoke_async(&mut conn)
            .await?;
        Ok(Self::outcome(stream_id, raw))
    }
}
