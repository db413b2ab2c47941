//! `POST /ping`: publish a timestamped message onto the bus topic.
//!
//! Any relay subscribed to the topic fans the message out to its clients,
//! so hitting this endpoint on one server reaches clients on all of them.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use bytes::Bytes;
use chrono::{DateTime, Local};
use fanout_telemetry::metrics::BUS_PUBLISH_ERRORS_TOTAL;
use metrics::counter;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::server::AppState;

/// `ctime`-style layout, e.g. `Mon Jan  2 15:04:05 2006`.
const SEND_TIME_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Message published by `POST /ping`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingMessage {
    /// Local wall-clock time of the request.
    pub send_time: String,
}

impl PingMessage {
    /// Message stamped with `now`.
    pub fn at(now: DateTime<Local>) -> Self {
        Self {
            send_time: now.format(SEND_TIME_FORMAT).to_string(),
        }
    }
}

/// POST /ping
pub async fn ping_handler(State(state): State<AppState>) -> Response {
    let message = PingMessage::at(Local::now());
    let payload = match serde_json::to_vec(&message) {
        Ok(payload) => Bytes::from(payload),
        Err(error) => {
            warn!(error = %error, "failed to encode ping message");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match state.bus.publish(&state.topic, payload).await {
        Ok(()) => {
            debug!(topic = %state.topic, send_time = %message.send_time, "ping published");
            Json(json!({ "message": "pong" })).into_response()
        }
        Err(error) => {
            warn!(topic = %state.topic, error = %error, "ping publish failed");
            counter!(BUS_PUBLISH_ERRORS_TOTAL).increment(1);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response()
        }
    }
}
