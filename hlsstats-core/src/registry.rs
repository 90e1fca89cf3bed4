// Presence registry: stream -> (session -> last seen) plus live counters.
//
// Each stream's sessions and counters live in one DashMap value, so the
// structural change (insert/remove a session) and the counter update happen
// under the same shard lock. Heartbeats for streams in different shards never
// contend. The global total is bumped inside that same critical section.
//
// Every registry adds its own viewers to the active gauge and takes them back
// on eviction or drop, so the gauge sums over all instances in the process.

use dashmap::DashMap;
use prometheus::IntGauge;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

use crate::metrics::VIEWERS_ACTIVE;

fn gauge_amount(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Per-stream presence state. Owned exclusively by [`PresenceRegistry`].
#[derive(Debug, Default)]
struct StreamPresence {
    /// `session_id` -> last heartbeat (ms on the registry clock)
    sessions: HashMap<String, u64>,
    live_count: u64,
    /// Unit synchronized to the store. Always equal to `live_count`.
    pending_counter: u64,
    /// Last count acknowledged by the store for this stream.
    flushed_count: u64,
}

impl StreamPresence {
    fn add_session(&mut self) {
        self.live_count += 1;
        self.pending_counter += 1;
        self.check_invariant();
    }

    fn remove_sessions(&mut self, removed: u64) {
        self.live_count -= removed;
        self.pending_counter -= removed;
        self.check_invariant();
    }

    fn check_invariant(&self) {
        debug_assert_eq!(
            self.live_count, self.pending_counter,
            "pending counter diverged from live count"
        );
        debug_assert_eq!(self.live_count, self.sessions.len() as u64);
    }

    const fn is_dirty(&self) -> bool {
        self.pending_counter != self.flushed_count
    }
}

/// Counter state of a stream that has changes not yet acknowledged by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFlush {
    pub stream_id: String,
    pub live_count: u64,
    pub pending_counter: u64,
    pub flushed_count: u64,
}

impl PendingFlush {
    /// Signed change since the last acknowledged flush.
    #[must_use]
    pub const fn delta(&self) -> i64 {
        self.pending_counter as i64 - self.flushed_count as i64
    }
}

/// Point-in-time view of one stream's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub live_count: u64,
    pub pending_counter: u64,
    pub flushed_count: u64,
}

/// Concurrent map of stream -> sessions with per-stream and global counters.
#[derive(Debug)]
pub struct PresenceRegistry {
    streams: DashMap<String, StreamPresence>,
    global_total: AtomicU64,
    active_gauge: IntGauge,
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceRegistry {
    /// Registry reporting into the process-wide active viewers gauge.
    #[must_use]
    pub fn new() -> Self {
        Self::with_gauge(VIEWERS_ACTIVE.clone())
    }

    /// Registry reporting into `active_gauge`.
    #[must_use]
    pub fn with_gauge(active_gauge: IntGauge) -> Self {
        Self {
            streams: DashMap::new(),
            global_total: AtomicU64::new(0),
            active_gauge,
        }
    }

    /// Record a heartbeat for `session_id` on `stream_id` at `now_ms`.
    ///
    /// Returns `true` when the session was not known yet and the counters
    /// were incremented. Repeated heartbeats only refresh the timestamp.
    pub fn register_heartbeat_at(&self, stream_id: &str, session_id: &str, now_ms: u64) -> bool {
        // Fast path avoids allocating the stream key for known streams.
        if let Some(mut stream) = self.streams.get_mut(stream_id) {
            return self.touch(&mut stream, stream_id, session_id, now_ms);
        }
        let mut stream = self.streams.entry(stream_id.to_string()).or_default();
        self.touch(&mut stream, stream_id, session_id, now_ms)
    }

    fn touch(&self, stream: &mut StreamPresence, stream_id: &str, session_id: &str, now_ms: u64) -> bool {
        if let Some(last_seen) = stream.sessions.get_mut(session_id) {
            *last_seen = (*last_seen).max(now_ms);
            return false;
        }
        stream.sessions.insert(session_id.to_string(), now_ms);
        stream.add_session();
        self.global_total.fetch_add(1, Ordering::SeqCst);
        self.active_gauge.inc();
        trace!(
            stream_id = %stream_id,
            session_id = %session_id,
            viewers = stream.live_count,
            "New viewer registered"
        );
        true
    }

    /// Live viewer count for a stream, `0` for unknown streams.
    #[must_use]
    pub fn get_viewer_count(&self, stream_id: &str) -> u64 {
        self.streams.get(stream_id).map_or(0, |s| s.live_count)
    }

    /// Pending counter for a stream. Equal to [`Self::get_viewer_count`].
    #[must_use]
    pub fn get_pending_counter(&self, stream_id: &str) -> u64 {
        self.streams.get(stream_id).map_or(0, |s| s.pending_counter)
    }

    #[must_use]
    pub fn get_global_total(&self) -> u64 {
        self.global_total.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn snapshot(&self, stream_id: &str) -> Option<StreamSnapshot> {
        self.streams.get(stream_id).map(|s| StreamSnapshot {
            live_count: s.live_count,
            pending_counter: s.pending_counter,
            flushed_count: s.flushed_count,
        })
    }

    /// Session ids currently tracked for a stream.
    #[must_use]
    pub fn session_ids(&self, stream_id: &str) -> Vec<String> {
        self.streams
            .get(stream_id)
            .map(|s| s.sessions.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of streams with registry state (including fully evicted ones
    /// whose zero has not been flushed yet).
    #[must_use]
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Remove every session with `now_ms - last_seen > timeout_ms`.
    ///
    /// Returns the number of evicted sessions per affected stream.
    pub fn evict_expired(&self, now_ms: u64, timeout_ms: u64) -> HashMap<String, u64> {
        let mut evicted = HashMap::new();

        for mut entry in self.streams.iter_mut() {
            let stream = entry.value_mut();
            let before = stream.sessions.len();
            stream
                .sessions
                .retain(|_, last_seen| now_ms.saturating_sub(*last_seen) <= timeout_ms);
            let removed = (before - stream.sessions.len()) as u64;
            if removed == 0 {
                continue;
            }

            stream.remove_sessions(removed);
            self.global_total.fetch_sub(removed, Ordering::SeqCst);
            self.active_gauge.sub(gauge_amount(removed));
            debug!(
                stream_id = %entry.key(),
                evicted = removed,
                viewers = entry.value().live_count,
                "Evicted stale viewers"
            );
            evicted.insert(entry.key().clone(), removed);
        }

        evicted
    }

    /// Streams whose pending counter differs from the last flushed count.
    #[must_use]
    pub fn dirty_streams(&self) -> Vec<PendingFlush> {
        self.streams
            .iter()
            .filter(|entry| entry.value().is_dirty())
            .map(|entry| {
                let s = entry.value();
                PendingFlush {
                    stream_id: entry.key().clone(),
                    live_count: s.live_count,
                    pending_counter: s.pending_counter,
                    flushed_count: s.flushed_count,
                }
            })
            .collect()
    }

    /// Record that the store now reflects `count` for this stream.
    ///
    /// Pass the count that was flushed, not the current one: registrations
    /// that landed during the flush keep the stream dirty for the next tick.
    pub fn mark_flushed(&self, stream_id: &str, count: u64) {
        if let Some(mut stream) = self.streams.get_mut(stream_id) {
            stream.flushed_count = count;
        }
    }

    /// Forget what any store has acknowledged.
    ///
    /// Used when a new store is bound: every stream with viewers becomes
    /// dirty and the next flush carries its full count.
    pub fn reset_flushed(&self) {
        for mut entry in self.streams.iter_mut() {
            entry.value_mut().flushed_count = 0;
        }
    }

    /// Drop streams with no sessions whose zero count has been flushed.
    ///
    /// Returns the number of streams removed.
    pub fn prune_idle(&self) -> usize {
        let before = self.streams.len();
        self.streams
            .retain(|_, s| !(s.sessions.is_empty() && s.flushed_count == 0));
        before.saturating_sub(self.streams.len())
    }
}

impl Drop for PresenceRegistry {
    fn drop(&mut self) {
        self.active_gauge
            .sub(gauge_amount(*self.global_total.get_mut()));
    }
}
