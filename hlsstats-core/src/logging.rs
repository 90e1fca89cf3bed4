//! Tracing subscriber setup for the server.
//!
//! Sweeps run inside a `viewer_sweep` span; closing it logs how long each
//! tick took, which is the main signal of slow store I/O.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{
    filter::LevelFilter,
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(level.into()));

    let (writer, ansi) = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {path}"))?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE);
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(layer.json().with_current_span(true))
            .try_init()?;
    } else {
        subscriber.with(layer.compact()).try_init()?;
    }
    Ok(())
}

fn parse_level(level: &str) -> anyhow::Result<LevelFilter> {
    let normalized = level.trim().to_lowercase();
    let normalized = if normalized == "warning" { "warn" } else { normalized.as_str() };
    normalized
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid log level: {level}"))
}
