//! # fanout-telemetry
//!
//! Logging and metrics bootstrap shared by every fanout crate.
//!
//! - [`init_telemetry`] installs the global `tracing` subscriber
//! - [`metrics`] installs the Prometheus recorder and names every metric

#![deny(unsafe_code)]

pub mod metrics;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Errors raised while installing the telemetry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by `RUST_LOG` when set.
    pub log_level: Level,
    /// Per-module level overrides (e.g. `"fanout_core" => DEBUG`).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: true,
        }
    }
}

/// Handle returned by [`init_telemetry`].
#[derive(Debug)]
pub struct TelemetryGuard {
    filter: String,
    module_levels: Vec<(String, Level)>,
}

impl TelemetryGuard {
    /// Filter directives the subscriber was built from.
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Per-module log level overrides in effect.
    pub fn module_levels(&self) -> &[(String, Level)] {
        &self.module_levels
    }
}

/// Build the `EnvFilter` directive string for a config.
pub fn filter_directives(config: &TelemetryConfig) -> String {
    let mut filter = config.log_level.to_string().to_lowercase();
    for (module, level) in &config.module_levels {
        filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
    }
    filter
}

/// Initialize the telemetry subsystem. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let filter = filter_directives(config);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TelemetryError::Init(e.to_string()))?;

    Ok(TelemetryGuard {
        filter,
        module_levels: config.module_levels.clone(),
    })
}

/// Parse a level name (`"debug"`, `"WARN"`, ...). Unknown names yield `None`.
pub fn parse_level(name: &str) -> Option<Level> {
    name.trim().parse().ok()
}
