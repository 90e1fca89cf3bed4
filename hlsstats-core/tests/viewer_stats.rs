//! End-to-end viewer tracking against an in-memory stream store.
//!
//! Time is virtual (`start_paused`), so the eviction scenarios run instantly.
//!
//! Run with: cargo test -p hlsstats-core --test viewer_stats

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hlsstats_core::{
    compute_timeout_ms, Clock, MemoryStreamStore, StreamRecord, StreamStatus, StreamStore, SyncMode,
    TokioTimer, ViewerStats, ViewerStatsConfig, DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS,
};
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Poll `condition` until it holds, panicking after `limit`.
/// Returns how long it took.
async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> Duration {
    let started = Instant::now();
    loop {
        if condition() {
            return started.elapsed();
        }
        assert!(
            started.elapsed() <= limit,
            "condition not met within {limit:?}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn hls_settings(segment_duration: &str, sweep_period_ms: u64) -> ViewerStatsConfig {
    ViewerStatsConfig {
        segment_duration: segment_duration.to_string(),
        sweep_period_ms,
        ..ViewerStatsConfig::default()
    }
}

#[derive(Default)]
struct ManualClock(AtomicU64);

impl ManualClock {
    fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

fn assert_totals(stats: &ViewerStats, streams: &[&str]) {
    let mut sum = 0;
    for stream in streams {
        assert_eq!(
            stats.get_pending_counter(stream),
            stats.get_viewer_count(stream),
            "pending counter diverged for {stream}"
        );
        sum += stats.get_viewer_count(stream);
    }
    assert_eq!(stats.get_global_total(), sum);
}

#[tokio::test]
async fn test_hls_viewer_count() {
    let stats = ViewerStats::new(ViewerStatsConfig::default());
    stats
        .configure(ViewerStatsConfig::default(), Arc::new(MemoryStreamStore::new()))
        .unwrap();
    let stream_id = "stream-123456";

    for i in 0..100 {
        stats.register_heartbeat(stream_id, &format!("session-{i}"));
    }
    assert_eq!(stats.get_viewer_count(stream_id), 100);
    assert_eq!(stats.get_viewer_count("no_streamid"), 0);

    for _ in 0..10 {
        stats.register_heartbeat(stream_id, "sameSessionID");
    }
    assert_eq!(stats.get_viewer_count(stream_id), 101);
    assert_totals(&stats, &[stream_id]);
}

#[test]
fn test_get_timeout() {
    let fallback = DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS;
    assert_eq!(compute_timeout_ms("", fallback), fallback);
    assert_eq!(compute_timeout_ms("2", fallback), 20_000);
}

#[tokio::test(start_paused = true)]
async fn test_viewer_eviction_propagates_to_store() {
    let store = MemoryStreamStore::new();
    let stream_id = store.save(StreamRecord::new("live-stream", StreamStatus::Broadcasting));

    let stats = ViewerStats::new(ViewerStatsConfig::default());
    stats
        .configure(hls_settings("1", 1_000), Arc::new(store.clone()))
        .unwrap();
    assert_eq!(stats.sweep_period_ms(), 1_000);
    assert_eq!(stats.timeout_ms(), 10_000);
    stats.start().unwrap();

    let session_id = "sessionId42";
    stats.register_heartbeat(&stream_id, session_id);
    stats.register_heartbeat(&stream_id, session_id);
    let last_heartbeat = Instant::now();

    assert_eq!(stats.get_viewer_count(&stream_id), 1);
    assert_eq!(stats.get_pending_counter(&stream_id), 1);
    assert_eq!(stats.get_global_total(), 1);

    // Viewer is online in the store.
    wait_until(Duration::from_secs(5), || store.viewer_count(&stream_id) == Some(1)).await;

    // Viewer is detected gone within timeout + sweep period.
    wait_until(Duration::from_secs(12), || store.viewer_count(&stream_id) == Some(0)).await;
    let bound = Duration::from_millis(stats.timeout_ms() + stats.sweep_period_ms()) + POLL_INTERVAL;
    assert!(last_heartbeat.elapsed() <= bound);

    assert_eq!(stats.get_viewer_count(&stream_id), 0);
    assert_eq!(stats.get_pending_counter(&stream_id), 0);
    assert_eq!(stats.get_global_total(), 0);

    // Finished streams follow the same rules.
    assert!(store.set_status(&stream_id, StreamStatus::Finished));
    stats.register_heartbeat(&stream_id, session_id);

    assert_eq!(stats.get_viewer_count(&stream_id), 1);
    assert_eq!(stats.get_pending_counter(&stream_id), 1);
    assert_eq!(stats.get_global_total(), 1);

    wait_until(Duration::from_secs(5), || store.viewer_count(&stream_id) == Some(1)).await;
    wait_until(Duration::from_secs(12), || store.viewer_count(&stream_id) == Some(0)).await;

    assert_eq!(stats.get_viewer_count(&stream_id), 0);
    assert_eq!(stats.get_pending_counter(&stream_id), 0);
    assert_eq!(stats.get_global_total(), 0);
    assert_eq!(
        store.get(&stream_id).await.unwrap().unwrap().status,
        StreamStatus::Finished
    );

    stats.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeats_keep_viewer_alive() {
    let store = MemoryStreamStore::new();
    let stream_id = store.save(StreamRecord::new("live-stream", StreamStatus::Broadcasting));

    let stats = ViewerStats::new(ViewerStatsConfig::default());
    stats
        .configure(hls_settings("1", 1_000), Arc::new(store.clone()))
        .unwrap();
    stats.start().unwrap();

    // A player fetching a segment every second for 30 seconds.
    for _ in 0..30 {
        stats.register_heartbeat(&stream_id, "player");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(stats.get_viewer_count(&stream_id), 1);
    }
    assert_eq!(store.viewer_count(&stream_id), Some(1));

    stats.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_store_record_created_after_viewers() {
    let store = MemoryStreamStore::new();
    let stats = ViewerStats::new(ViewerStatsConfig::default());
    stats
        .configure(hls_settings("1", 1_000), Arc::new(store.clone()))
        .unwrap();
    stats.start().unwrap();

    stats.register_heartbeat("late-stream", "a");
    stats.register_heartbeat("late-stream", "b");
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(store.viewer_count("late-stream"), None);
    assert_eq!(stats.get_viewer_count("late-stream"), 2);

    store.save(StreamRecord::new("late-stream", StreamStatus::Broadcasting));
    wait_until(Duration::from_secs(2), || store.viewer_count("late-stream") == Some(2)).await;

    stats.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_two_instances_share_record_in_delta_mode() {
    let store = MemoryStreamStore::new();
    let stream_id = store.save(StreamRecord::new("shared", StreamStatus::Broadcasting));

    let settings = ViewerStatsConfig {
        sync_mode: SyncMode::Delta,
        ..hls_settings("1", 1_000)
    };
    let node_a = ViewerStats::new(ViewerStatsConfig::default());
    let node_b = ViewerStats::new(ViewerStatsConfig::default());
    node_a.configure(settings.clone(), Arc::new(store.clone())).unwrap();
    node_b.configure(settings, Arc::new(store.clone())).unwrap();
    node_a.start().unwrap();
    node_b.start().unwrap();

    node_a.register_heartbeat(&stream_id, "a1");
    node_a.register_heartbeat(&stream_id, "a2");
    node_b.register_heartbeat(&stream_id, "b1");

    wait_until(Duration::from_secs(3), || store.viewer_count(&stream_id) == Some(3)).await;
    wait_until(Duration::from_secs(12), || store.viewer_count(&stream_id) == Some(0)).await;

    node_a.stop().await;
    node_b.stop().await;
}

#[tokio::test]
async fn test_global_total_tracks_streams_across_zero() {
    let clock = Arc::new(ManualClock::default());
    let stats = ViewerStats::with_clock_and_timer(
        hls_settings("1", 1_000),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::new(TokioTimer),
    );
    let streams = ["a", "b", "c"];

    stats.register_heartbeat("a", "s1");
    stats.register_heartbeat("a", "s2");
    stats.register_heartbeat("b", "s1");
    assert_totals(&stats, &streams);

    clock.advance(6_000);
    stats.register_heartbeat("a", "s1");
    stats.register_heartbeat("c", "s1");
    assert_totals(&stats, &streams);
    assert_eq!(stats.get_global_total(), 4);

    // a/s2 and b/s1 go stale.
    clock.advance(5_000);
    let report = stats.sweep_now().await;
    assert_eq!(report.total_evicted(), 2);
    assert_eq!(stats.get_viewer_count("b"), 0);
    assert_totals(&stats, &streams);
    assert_eq!(stats.get_global_total(), 2);

    clock.advance(20_000);
    stats.sweep_now().await;
    assert_totals(&stats, &streams);
    assert_eq!(stats.get_global_total(), 0);

    stats.register_heartbeat("b", "s9");
    assert_totals(&stats, &streams);
    assert_eq!(stats.get_global_total(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_with_running_sweep() {
    let store = MemoryStreamStore::new();
    let streams: Vec<String> = (0..4).map(|i| format!("stream-{i}")).collect();
    for stream in &streams {
        store.save(StreamRecord::new(stream.clone(), StreamStatus::Broadcasting));
    }

    let stats = Arc::new(ViewerStats::new(ViewerStatsConfig::default()));
    stats
        .configure(hls_settings("60", 10), Arc::new(store.clone()))
        .unwrap();
    stats.start().unwrap();

    let mut tasks = Vec::new();
    for worker in 0..16 {
        let stats = Arc::clone(&stats);
        let streams = streams.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..200 {
                let session = i % 50;
                let stream = &streams[session % streams.len()];
                stats.register_heartbeat(stream, &format!("w{worker}-s{session}"));
                if i % 20 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // Each worker produced 50 distinct (stream, session) pairs.
    let refs: Vec<&str> = streams.iter().map(String::as_str).collect();
    assert_eq!(stats.get_global_total(), 16 * 50);
    assert_totals(&stats, &refs);

    stats.stop().await;
    stats.sweep_now().await;
    let stored: i64 = streams
        .iter()
        .map(|s| store.viewer_count(s).unwrap_or_default())
        .sum();
    assert_eq!(stored, 16 * 50);
}
