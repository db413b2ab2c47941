//! `RelayServer`: Axum HTTP + WebSocket server around the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use fanout_bus::{Bus, Subscription};
use fanout_core::{accept_connection, BusBinding, Hub, HubHandle, PumpConfig};
use fanout_settings::{FanoutSettings, SubscriptionScope};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::error::ServerError;
use crate::health::{self, HealthResponse};
use crate::publish::ping_handler;
use crate::shutdown::{ShutdownCoordinator, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::ws::split_socket;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Request side of the hub.
    pub hub: HubHandle,
    /// Message bus.
    pub bus: Arc<dyn Bus>,
    /// Bus topic relayed to clients.
    pub topic: Arc<str>,
    /// Who owns the bus subscription.
    pub scope: SubscriptionScope,
    /// Per-connection limits.
    pub pump: PumpConfig,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// Pump limits taken from settings.
pub fn pump_config(settings: &FanoutSettings) -> PumpConfig {
    let conn = &settings.connection;
    PumpConfig {
        write_wait: conn.write_wait(),
        pong_wait: conn.pong_wait(),
        ping_period: conn.ping_period(),
        max_message_size: conn.max_message_size,
        mailbox_capacity: conn.mailbox_capacity,
    }
}

/// The relay server.
pub struct RelayServer {
    settings: FanoutSettings,
    state: AppState,
    cors: CorsLayer,
    hub_task: JoinHandle<()>,
    shared_subscription: Option<Subscription>,
}

impl RelayServer {
    /// Start the hub and, for [`SubscriptionScope::Shared`], the bus
    /// subscription. Call [`listen`](Self::listen) to accept connections.
    pub async fn start(
        settings: FanoutSettings,
        bus: Arc<dyn Bus>,
        metrics: Option<PrometheusHandle>,
    ) -> Result<Self, ServerError> {
        let cors = cors_layer(&settings.server.allowed_origins)?;

        let (hub, handle) = Hub::new(
            settings.server.server_name.as_str(),
            settings.hub.request_buffer,
        );
        let hub_task = tokio::spawn(hub.run());

        let shared_subscription = match settings.bus.subscription {
            SubscriptionScope::Shared => {
                let subscription = bus
                    .subscribe(&settings.bus.topic, Arc::new(handle.clone()))
                    .await?;
                info!(topic = %settings.bus.topic, bus = bus.name(), "shared bus subscription open");
                Some(subscription)
            }
            SubscriptionScope::PerConnection => None,
        };

        let state = AppState {
            hub: handle,
            bus,
            topic: settings.bus.topic.as_str().into(),
            scope: settings.bus.subscription,
            pump: pump_config(&settings),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        };

        Ok(Self {
            settings,
            state,
            cors,
            hub_task,
            shared_subscription,
        })
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler));
        if self.settings.server.publisher {
            router = router.route("/ping", post(ping_handler));
        }
        router
            .with_state(self.state.clone())
            .layer(self.cors.clone())
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown.
    pub async fn listen(&self) -> Result<ServerHandle, ServerError> {
        let addr = self.settings.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let router = self.router();
        let token = self.state.shutdown.token();
        let task = tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, router)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(error = %error, "server stopped with error");
            }
        });

        info!(
            addr = %local_addr,
            server_name = %self.settings.server.server_name,
            topic = %self.settings.bus.topic,
            "relay listening"
        );
        Ok(ServerHandle {
            addr: local_addr,
            task,
        })
    }

    /// Request side of the hub.
    pub fn hub(&self) -> &HubHandle {
        &self.state.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Effective settings.
    pub fn settings(&self) -> &FanoutSettings {
        &self.settings
    }

    /// Stop accepting, close every connection and wait for the hub to stop.
    pub async fn stop(self, handle: ServerHandle, timeout: Option<Duration>) {
        let Self {
            state,
            hub_task,
            shared_subscription,
            ..
        } = self;

        state
            .shutdown
            .graceful_shutdown(vec![handle.task], timeout)
            .await;
        if let Some(subscription) = shared_subscription {
            subscription.close_and_wait().await;
        }
        drop(state);

        let wait = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        if tokio::time::timeout(wait, hub_task).await.is_err() {
            warn!("hub still running after shutdown timeout");
        }
        info!("relay stopped");
    }
}

/// A listening server.
#[derive(Debug)]
pub struct ServerHandle {
    /// Bound address.
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// Bound port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ServerError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(Any));
    }
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ServerError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.shutdown.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    ws.max_message_size(state.pump.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (reader, writer) = split_socket(socket);
    let binding = match state.scope {
        SubscriptionScope::PerConnection => BusBinding::PerConnection {
            bus: state.bus.as_ref(),
            topic: &state.topic,
        },
        SubscriptionScope::Shared => BusBinding::Shared,
    };
    match accept_connection(
        &state.hub,
        binding,
        reader,
        writer,
        state.pump.clone(),
        state.shutdown.connection_token(),
    )
    .await
    {
        Ok(connection) => debug!(client_id = %connection.id, "pumps started"),
        Err(error) => warn!(error = %error, "connection rejected"),
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.hub.stats().await.ok().map(|stats| stats.clients);
    Json(health::health_check(
        state.start_time,
        state.hub.server_name(),
        connections,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
