//! Telemetry: structured logging and decision metrics.
//!
//! - **Logging**: JSON/pretty/compact `tracing` output filtered by `EnvFilter`
//! - **Metrics**: `metrics` counters and histograms for access decisions and errors
//!
//! The engine only emits events; installing a subscriber or a metrics
//! recorder is the embedding process's choice.
//!
//! # Example
//!
//! ```rust,no_run
//! use access_core::telemetry::{init_telemetry, LoggingConfig};
//!
//! init_telemetry(&LoggingConfig::default()).expect("Failed to initialize telemetry");
//! ```

pub mod logging;
pub mod metrics;

pub use self::logging::{init_logging, LogFormat, LoggingConfig};
pub use self::metrics::{register_metrics, DecisionMetrics};

/// Install the logging subscriber and describe every metric.
pub fn init_telemetry(config: &LoggingConfig) -> anyhow::Result<()> {
    init_logging(config)?;
    register_metrics();
    ::tracing::info!(
        level = %config.level,
        format = ?config.format,
        "Telemetry initialized"
    );
    Ok(())
}
