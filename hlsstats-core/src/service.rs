// Viewer stats service: the per-application instance callers talk to.
//
// Two-phase lifecycle: construct with defaults, `configure` once the settings
// snapshot and stream store are available, then `start`/`stop` with the
// owning application. Nothing here is process-global; tests and multi-tenant
// deployments each hold their own instance.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ViewerStatsConfig;
use crate::error::{Error, Result};
use crate::registry::PresenceRegistry;
use crate::store::StreamStore;
use crate::sweep::{SweepReport, SweepScheduler, Sweeper};
use crate::sync::StoreSynchronizer;
use crate::timer::{Clock, MonotonicClock, Timer, TokioTimer};

struct ServiceState {
    config: ViewerStatsConfig,
    timeout_ms: u64,
    configured: bool,
    sweeper: Arc<Sweeper>,
}

pub struct ViewerStats {
    registry: Arc<PresenceRegistry>,
    clock: Arc<dyn Clock>,
    scheduler: SweepScheduler,
    state: RwLock<ServiceState>,
}

impl ViewerStats {
    /// Create an unconfigured instance on tokio's clock and timer.
    #[must_use]
    pub fn new(defaults: ViewerStatsConfig) -> Self {
        Self::with_clock_and_timer(defaults, Arc::new(MonotonicClock::new()), Arc::new(TokioTimer))
    }

    #[must_use]
    pub fn with_clock_and_timer(
        defaults: ViewerStatsConfig,
        clock: Arc<dyn Clock>,
        timer: Arc<dyn Timer>,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let timeout_ms = defaults.timeout_ms();
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&registry),
            None,
            Arc::clone(&clock),
            timeout_ms,
        ));

        Self {
            registry,
            clock,
            scheduler: SweepScheduler::new(timer),
            state: RwLock::new(ServiceState {
                config: defaults,
                timeout_ms,
                configured: false,
                sweeper,
            }),
        }
    }

    /// Bind the settings snapshot and stream store.
    ///
    /// Must be called while stopped; fails with [`Error::AlreadyRunning`]
    /// otherwise. Calling it again replaces the previous binding, and the
    /// next sweep writes every stream's full count to the new store.
    pub fn configure(&self, settings: ViewerStatsConfig, store: Arc<dyn StreamStore>) -> Result<()> {
        // Held until the swap so a concurrent `start` sees either binding whole.
        let mut state = self.state.write();
        if self.scheduler.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let timeout_ms = settings.timeout_ms();
        let synchronizer = Arc::new(StoreSynchronizer::new(store, settings.sync_mode));
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&self.registry),
            Some(synchronizer),
            Arc::clone(&self.clock),
            timeout_ms,
        ));

        info!(
            segment_duration = %settings.segment_duration,
            timeout_ms,
            sweep_period_ms = settings.sweep_period_ms,
            sync_mode = ?settings.sync_mode,
            "Viewer stats configured"
        );

        self.registry.reset_flushed();
        state.config = settings;
        state.timeout_ms = timeout_ms;
        state.configured = true;
        state.sweeper = sweeper;
        Ok(())
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.read().configured
    }

    /// Start the periodic sweep. Calling it while running is a no-op.
    ///
    /// Without [`Self::configure`] counts are tracked in memory only.
    pub fn start(&self) -> Result<()> {
        let state = self.state.read();
        if state.config.sweep_period_ms == 0 {
            return Err(Error::InvalidSetting(
                "sweep_period_ms must be greater than zero".to_string(),
            ));
        }
        if !state.configured && !self.scheduler.is_running() {
            warn!("Viewer stats started without a stream store, counts are kept in memory only");
        }

        match self
            .scheduler
            .start(Arc::clone(&state.sweeper), state.config.sweep_period())
        {
            Ok(()) => Ok(()),
            Err(Error::AlreadyRunning) => {
                debug!("Viewer stats already running");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stop the periodic sweep. In-memory counts stay intact and queryable.
    ///
    /// Waits for an in-flight sweep to finish; no sweep runs after this returns.
    pub async fn stop(&self) {
        if !self.scheduler.stop().await {
            debug!("Viewer stats not running");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Record that `session_id` is still watching `stream_id`.
    ///
    /// Never blocks on the store. Returns `true` for a new viewer.
    pub fn register_heartbeat(&self, stream_id: &str, session_id: &str) -> bool {
        self.registry
            .register_heartbeat_at(stream_id, session_id, self.clock.now_millis())
    }

    #[must_use]
    pub fn get_viewer_count(&self, stream_id: &str) -> u64 {
        self.registry.get_viewer_count(stream_id)
    }

    #[must_use]
    pub fn get_pending_counter(&self, stream_id: &str) -> u64 {
        self.registry.get_pending_counter(stream_id)
    }

    #[must_use]
    pub fn get_global_total(&self) -> u64 {
        self.registry.get_global_total()
    }

    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.state.read().timeout_ms
    }

    #[must_use]
    pub fn sweep_period_ms(&self) -> u64 {
        self.state.read().config.sweep_period_ms
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<PresenceRegistry> {
        &self.registry
    }

    /// Run one sweep immediately, outside the schedule.
    pub async fn sweep_now(&self) -> SweepReport {
        let sweeper = Arc::clone(&self.state.read().sweeper);
        sweeper.tick().await
    }
}
