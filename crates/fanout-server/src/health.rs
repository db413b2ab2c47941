//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while the hub is running, `"degraded"` otherwise.
    pub status: String,
    /// Identity stamped onto outbound messages.
    pub server_name: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Registered WebSocket clients.
    pub connections: usize,
}

/// Build a health response. `connections` is `None` when the hub did not answer.
pub fn health_check(start_time: Instant, server_name: &str, connections: Option<usize>) -> HealthResponse {
    HealthResponse {
        status: if connections.is_some() { "ok" } else { "degraded" }.into(),
        server_name: server_name.to_string(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: connections.unwrap_or(0),
    }
}
