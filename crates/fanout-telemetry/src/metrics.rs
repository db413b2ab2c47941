//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at startup before any metrics are recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

// Metric name constants to avoid typos across crates.

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections removed from the hub (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Clients currently registered with the hub (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast requests processed by the hub (counter).
pub const HUB_BROADCASTS_TOTAL: &str = "hub_broadcasts_total";
/// Clients evicted because their mailbox was full (counter).
pub const WS_BROADCAST_EVICTIONS_TOTAL: &str = "ws_broadcast_evictions_total";
/// Outbound payloads rejected by the envelope encoder (counter).
pub const WS_PAYLOADS_REJECTED_TOTAL: &str = "ws_payloads_rejected_total";
/// Data frames written to clients (counter).
pub const WS_FRAMES_SENT_TOTAL: &str = "ws_frames_sent_total";
/// Payloads delivered by a bus subscription (counter).
pub const BUS_MESSAGES_RECEIVED_TOTAL: &str = "bus_messages_received_total";
/// Failed bus publishes (counter).
pub const BUS_PUBLISH_ERRORS_TOTAL: &str = "bus_publish_errors_total";
