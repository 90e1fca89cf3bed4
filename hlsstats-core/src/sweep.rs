//! Periodic eviction of stale viewers and reconciliation with the store.
//!
//! One [`Sweeper::tick`] runs per sweep period on a single logical task.
//! Store I/O happens only here, never on the heartbeat path.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, Instrument};

use crate::error::{Error, Result};
use crate::metrics::{SWEEPS_TOTAL, VIEWERS_EVICTED_TOTAL};
use crate::registry::PresenceRegistry;
use crate::sync::{FlushOutcome, StoreSynchronizer};
use crate::timer::{Clock, TickFn, Timer, TimerHandle};

/// What one sweep tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Evicted sessions per stream.
    pub evicted: HashMap<String, u64>,
    /// Streams whose count the store acknowledged.
    pub flushed: usize,
    /// Streams skipped because the store has no record for them.
    pub skipped: usize,
    /// Streams whose flush failed and will be retried next tick.
    pub failed: usize,
    /// Idle streams dropped from the registry.
    pub pruned: usize,
}

impl SweepReport {
    #[must_use]
    pub fn total_evicted(&self) -> u64 {
        self.evicted.values().sum()
    }

    fn is_quiet(&self) -> bool {
        self.evicted.is_empty() && self.flushed == 0 && self.skipped == 0 && self.failed == 0
    }
}

/// Tick logic: evict, flush dirty streams, prune.
pub struct Sweeper {
    registry: Arc<PresenceRegistry>,
    synchronizer: Option<Arc<StoreSynchronizer>>,
    clock: Arc<dyn Clock>,
    timeout_ms: u64,
    /// Serializes ticks so two sweeps never flush the same delta twice.
    tick_lock: tokio::sync::Mutex<()>,
}

impl Sweeper {
    #[must_use]
    pub fn new(
        registry: Arc<PresenceRegistry>,
        synchronizer: Option<Arc<StoreSynchronizer>>,
        clock: Arc<dyn Clock>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            registry,
            synchronizer,
            clock,
            timeout_ms,
            tick_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub async fn tick(&self) -> SweepReport {
        let _guard = self.tick_lock.lock().await;
        let now = self.clock.now_millis();
        let mut report = SweepReport {
            evicted: self.registry.evict_expired(now, self.timeout_ms),
            ..SweepReport::default()
        };
        VIEWERS_EVICTED_TOTAL.inc_by(report.total_evicted());

        if let Some(synchronizer) = &self.synchronizer {
            for pending in self.registry.dirty_streams() {
                let outcome = synchronizer
                    .flush(&pending.stream_id, pending.live_count, pending.delta())
                    .await;
                match outcome {
                    FlushOutcome::Written(_) | FlushOutcome::Unchanged => {
                        self.registry
                            .mark_flushed(&pending.stream_id, pending.pending_counter);
                        report.flushed += 1;
                    }
                    FlushOutcome::NoRecord => {
                        // Nothing of ours is stored; a record that shows up later
                        // receives the full count.
                        self.registry.mark_flushed(&pending.stream_id, 0);
                        report.skipped += 1;
                    }
                    FlushOutcome::Failed => report.failed += 1,
                }
            }
        }

        report.pruned = self.registry.prune_idle();

        let total = self.registry.get_global_total();
        SWEEPS_TOTAL.inc();

        if report.is_quiet() {
            trace!(total_viewers = total, "Sweep tick: no changes");
        } else {
            debug!(
                evicted = report.total_evicted(),
                flushed = report.flushed,
                skipped = report.skipped,
                failed = report.failed,
                pruned = report.pruned,
                total_viewers = total,
                "Sweep tick completed"
            );
        }
        report
    }
}

/// Runs a [`Sweeper`] on an injected [`Timer`].
pub struct SweepScheduler {
    timer: Arc<dyn Timer>,
    handle: Mutex<Option<TimerHandle>>,
}

impl SweepScheduler {
    #[must_use]
    pub fn new(timer: Arc<dyn Timer>) -> Self {
        Self {
            timer,
            handle: Mutex::new(None),
        }
    }

    /// Start ticking every `period`.
    ///
    /// Fails with [`Error::AlreadyRunning`] if a sweep is already scheduled.
    pub fn start(&self, sweeper: Arc<Sweeper>, period: Duration) -> Result<()> {
        let mut handle = self.handle.lock();
        if handle.is_some() {
            return Err(Error::AlreadyRunning);
        }

        let timeout_ms = sweeper.timeout_ms();
        let tick: TickFn = Arc::new(move || {
            let sweeper = Arc::clone(&sweeper);
            let span = tracing::debug_span!("viewer_sweep");
            async move {
                sweeper.tick().await;
            }
            .instrument(span)
            .boxed()
        });
        *handle = Some(self.timer.schedule(period, tick));

        info!(
            sweep_period_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX),
            timeout_ms,
            "Viewer sweep started"
        );
        Ok(())
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.lock().is_some()
    }

    /// Cancel future ticks and wait for an in-flight tick to finish.
    ///
    /// Returns `false` if nothing was running. Registry state is untouched.
    pub async fn stop(&self) -> bool {
        let handle = self.handle.lock().take();
        match handle {
            Some(handle) => {
                handle.cancel().await;
                info!("Viewer sweep stopped");
                true
            }
            None => false,
        }
    }
}
