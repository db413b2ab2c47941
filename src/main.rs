//! # fanout
//!
//! Relay binary: loads settings, installs telemetry, connects the bus and
//! serves WebSocket clients until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fanout_bus::{Bus, InProcessBus};
use fanout_server::RelayServer;
use fanout_settings::{BusKind, FanoutSettings, SubscriptionScope};
use fanout_telemetry::{init_telemetry, parse_level, TelemetryConfig};

/// Real-time WebSocket fan-out relay.
#[derive(Parser, Debug)]
#[command(name = "fanout", about = "Real-time WebSocket fan-out relay")]
struct Cli {
    /// JSON settings file, merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address, `host:port` or `:port`.
    #[arg(long)]
    addr: Option<String>,

    /// Identity stamped onto every outbound message.
    #[arg(long)]
    server_name: Option<String>,

    /// Bus implementation (`inprocess` or `nats`).
    #[arg(long)]
    bus: Option<BusKind>,

    /// NATS server URL.
    #[arg(long)]
    nats_url: Option<String>,

    /// Bus topic relayed to clients.
    #[arg(long)]
    topic: Option<String>,

    /// Open one bus subscription for the whole hub instead of one per connection.
    #[arg(long)]
    shared_subscription: bool,

    /// Disable the `POST /ping` publisher.
    #[arg(long)]
    no_publisher: bool,

    /// Log level (`trace` .. `error`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Layer command-line flags over loaded settings.
    fn apply(&self, settings: &mut FanoutSettings) -> Result<()> {
        if let Some(addr) = &self.addr {
            settings
                .server
                .set_addr(addr)
                .with_context(|| format!("Invalid --addr {addr:?}"))?;
        }
        if let Some(name) = &self.server_name {
            settings.server.server_name.clone_from(name);
        }
        if let Some(kind) = self.bus {
            settings.bus.kind = kind;
        }
        if let Some(url) = &self.nats_url {
            settings.bus.url.clone_from(url);
        }
        if let Some(topic) = &self.topic {
            settings.bus.topic.clone_from(topic);
        }
        if self.shared_subscription {
            settings.bus.subscription = SubscriptionScope::Shared;
        }
        if self.no_publisher {
            settings.server.publisher = false;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        settings.validate();
        Ok(())
    }
}

async fn connect_bus(settings: &FanoutSettings) -> Result<Arc<dyn Bus>> {
    match settings.bus.kind {
        BusKind::InProcess => Ok(Arc::new(InProcessBus::new())),
        #[cfg(feature = "nats")]
        BusKind::Nats => {
            let bus = fanout_bus::NatsBus::connect(&settings.bus.url)
                .await
                .with_context(|| format!("Failed to connect to NATS at {}", settings.bus.url))?;
            Ok(Arc::new(bus))
        }
        #[cfg(not(feature = "nats"))]
        BusKind::Nats => anyhow::bail!("built without the `nats` feature"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings =
        fanout_settings::load_settings(cli.config.as_deref()).context("Failed to load settings")?;
    cli.apply(&mut settings)?;

    let log_level = parse_level(&settings.logging.level).unwrap_or(tracing::Level::INFO);
    let _telemetry = init_telemetry(&TelemetryConfig {
        log_level,
        module_levels: Vec::new(),
        json: settings.logging.json,
    })
    .context("Failed to initialize telemetry")?;

    let metrics = match fanout_telemetry::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            tracing::warn!(error = %error, "metrics recorder unavailable, /metrics disabled");
            None
        }
    };

    let bus = connect_bus(&settings).await?;
    tracing::info!(bus = bus.name(), topic = %settings.bus.topic, "bus connected");

    let server = RelayServer::start(settings, bus, metrics)
        .await
        .context("Failed to start relay")?;
    let handle = server.listen().await.context("Failed to bind listener")?;
    tracing::info!(port = handle.port(), "fanout relay ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    server.stop(handle, None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(args: &[&str]) -> FanoutSettings {
        let cli = Cli::parse_from(std::iter::once("fanout").chain(args.iter().copied()));
        let mut settings = FanoutSettings::default();
        cli.apply(&mut settings).unwrap();
        settings
    }

    #[test]
    fn no_flags_keeps_defaults() {
        let settings = apply(&[]);
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.server.server_name, "server 1");
        assert!(settings.server.publisher);
        assert_eq!(settings.bus.subscription, SubscriptionScope::PerConnection);
    }

    #[test]
    fn flags_override_settings() {
        let settings = apply(&[
            "--addr",
            ":3001",
            "--server-name",
            "server 2",
            "--bus",
            "nats",
            "--nats-url",
            "nats://bus:4222",
            "--topic",
            "updates",
            "--shared-subscription",
            "--no-publisher",
            "--log-level",
            "debug",
        ]);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.server_name, "server 2");
        assert_eq!(settings.bus.kind, BusKind::Nats);
        assert_eq!(settings.bus.url, "nats://bus:4222");
        assert_eq!(settings.bus.topic, "updates");
        assert_eq!(settings.bus.subscription, SubscriptionScope::Shared);
        assert!(!settings.server.publisher);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn invalid_addr_is_an_error() {
        let cli = Cli::parse_from(["fanout", "--addr", "nonsense"]);
        let mut settings = FanoutSettings::default();
        assert!(cli.apply(&mut settings).is_err());
    }

    #[test]
    fn unknown_bus_kind_rejected_by_parser() {
        assert!(Cli::try_parse_from(["fanout", "--bus", "kafka"]).is_err());
    }

    #[tokio::test]
    async fn in_process_bus_needs_no_connection() {
        let bus = connect_bus(&FanoutSettings::default()).await.unwrap();
        assert_eq!(bus.name(), "in-process");
    }
}
