// hlsstats-core - HLS viewer presence tracking
//
// Segmented delivery has no disconnect signal, so viewers are counted from
// periodic heartbeats and evicted after a timeout derived from the segment
// duration. A background sweep reconciles counts with the shared stream store.
//
// - timeout   - staleness timeout policy
// - registry  - concurrent stream -> session presence map and counters
// - sweep     - periodic eviction and reconciliation
// - sync      - store synchronizer
// - store     - stream record store trait and backends
// - service   - `ViewerStats`, the instance applications hold

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod store;
pub mod sweep;
pub mod sync;
pub mod timeout;
pub mod timer;

pub use config::{Config, ViewerStatsConfig};
pub use error::{Error, Result};
pub use registry::PresenceRegistry;
pub use service::ViewerStats;
pub use store::{MemoryStreamStore, RedisStreamStore, StreamRecord, StreamStatus, StreamStore};
pub use sweep::{SweepReport, SweepScheduler, Sweeper};
pub use sync::{FlushOutcome, StoreSynchronizer, SyncMode};
pub use timeout::{compute_timeout_ms, DEFAULT_TIME_PERIOD_FOR_VIEWER_COUNT_MS};
pub use timer::{Clock, MonotonicClock, Timer, TimerHandle, TokioTimer};
