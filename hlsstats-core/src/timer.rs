//! Clock and timer abstractions injected into the sweep scheduler.
//!
//! Both default implementations run on tokio's clock, so tests driven with
//! `#[tokio::test(start_paused = true)]` advance ticks and staleness together
//! without real sleeps.

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Millisecond clock used to stamp heartbeats and judge staleness.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Monotonic clock counting milliseconds since construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Callback invoked on every tick. The next tick waits for it to finish.
pub type TickFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Repeating-task facility.
pub trait Timer: Send + Sync {
    /// Run `tick` every `period`, first one period from now.
    fn schedule(&self, period: Duration, tick: TickFn) -> TimerHandle;
}

/// Cancellable handle to a scheduled task.
#[derive(Debug)]
pub struct TimerHandle {
    cancel_token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    #[must_use]
    pub const fn new(cancel_token: CancellationToken, task: Option<JoinHandle<()>>) -> Self {
        Self { cancel_token, task }
    }

    /// Stop future ticks and wait for an in-flight tick to finish.
    ///
    /// Once this returns no further tick runs.
    pub async fn cancel(mut self) {
        self.cancel_token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!("Timer task panicked: {}", e);
                }
            }
        }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        // A dropped handle must not leave an orphaned ticking task behind.
        self.cancel_token.cancel();
    }
}

/// [`Timer`] backed by `tokio::time::interval`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

impl Timer for TokioTimer {
    fn schedule(&self, period: Duration, tick: TickFn) -> TimerHandle {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let task = tokio::spawn(async move {
            let mut timer = interval_at(Instant::now() + period, period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::debug!("Timer cancelled");
                        return;
                    }
                    _ = timer.tick() => {
                        tick().await;
                    }
                }
            }
        });

        TimerHandle::new(cancel_token, Some(task))
    }
}
