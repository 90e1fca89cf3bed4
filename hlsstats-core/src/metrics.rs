//! Prometheus metrics for viewer tracking
//!
//! Exposed by the server's `/metrics` endpoint.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Sessions evicted by the sweep
pub static VIEWERS_EVICTED_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "hls_viewers_evicted_total",
        "Total number of viewer sessions evicted after the staleness timeout",
        REGISTRY.clone()
    )
    .expect("Failed to register VIEWERS_EVICTED_TOTAL")
});

/// Store flush outcomes
pub static STORE_FLUSHES_TOTAL: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
    register_int_counter_vec_with_registry!(
        "hls_viewer_store_flushes_total",
        "Viewer count flushes to the stream store by outcome",
        &["outcome"],
        REGISTRY.clone()
    )
    .expect("Failed to register STORE_FLUSHES_TOTAL")
});

/// Live viewers across every registry in the process
pub static VIEWERS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "hls_viewers_active",
        "Number of live HLS viewer sessions",
        REGISTRY.clone()
    )
    .expect("Failed to register VIEWERS_ACTIVE")
});

/// Sweep ticks executed
pub static SWEEPS_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "hls_viewer_sweeps_total",
        "Total number of sweep ticks executed",
        REGISTRY.clone()
    )
    .expect("Failed to register SWEEPS_TOTAL")
});

/// Render all metrics in the Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_metrics() {
        SWEEPS_TOTAL.inc();
        STORE_FLUSHES_TOTAL.with_label_values(&["written"]).inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("hls_viewer_sweeps_total"));
        assert!(text.contains("hls_viewer_store_flushes_total"));
    }
}
