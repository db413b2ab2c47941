//! # fanout-server
//!
//! Axum HTTP + WebSocket surface of the relay.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /ws` | WebSocket upgrade; the connection joins the hub |
//! | `POST /ping` | Publish a timestamped message onto the bus topic |
//! | `GET /health` | Liveness and registry size |
//! | `GET /metrics` | Prometheus exposition |

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod publish;
pub mod server;
pub mod shutdown;
pub mod ws;

pub use error::ServerError;
pub use server::{AppState, RelayServer, ServerHandle};
pub use shutdown::ShutdownCoordinator;
