//! # fanout-core
//!
//! Connection registry, broadcast fan-out and the per-connection read/write
//! discipline of the relay.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `hub` | Actor owning the client registry; serial register/unregister/broadcast |
//! | `client` | Per-connection state and the accept-connection glue |
//! | `pump` | Read pump (sole reader) and write pump (sole writer) of one connection |
//! | `normalize` | Inbound payload line-terminator normalisation |
//! | `envelope` | Outbound `"from"` re-encoding |
//! | `frame` | Transport-neutral frame and transport error types |
//!
//! ## Data Flow
//!
//! bus / read pump → [`HubHandle::broadcast`] → hub → client mailboxes →
//! write pump → connection.

#![deny(unsafe_code)]

pub mod client;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod hub;
pub mod normalize;
pub mod pump;

pub use client::{accept_connection, BusBinding, Client, ClientId, ConnectionHandle};
pub use error::{AcceptError, EnvelopeError, HubClosed, TransportError};
pub use frame::Frame;
pub use hub::{Hub, HubHandle, HubStats, Registration};
pub use pump::{PumpConfig, ReadOutcome, WriteOutcome};
