//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`FanoutSettings::default()`]
//! 2. If a settings file is given and exists, deep-merge it over defaults
//! 3. Apply `FANOUT_*` environment variable overrides
//! 4. [`FanoutSettings::validate`]

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::FanoutSettings;

/// Load settings from an optional file with env var overrides.
pub fn load_settings(path: Option<&Path>) -> Result<FanoutSettings> {
    match path {
        Some(path) => load_settings_from_path(path),
        None => {
            let mut settings = FanoutSettings::default();
            apply_env_overrides(&mut settings);
            settings.validate();
            Ok(settings)
        }
    }
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<FanoutSettings> {
    let defaults = serde_json::to_value(FanoutSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: FanoutSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut FanoutSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup (the environment in production).
pub fn apply_overrides(settings: &mut FanoutSettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read("FANOUT_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("FANOUT_PORT") {
        match parse_u16_range(&v, 0, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("FANOUT_PORT", &v),
        }
    }
    if let Some(v) = read("FANOUT_SERVER_NAME") {
        settings.server.server_name = v;
    }
    if let Some(v) = read("FANOUT_PUBLISHER") {
        match parse_bool(&v) {
            Some(b) => settings.server.publisher = b,
            None => warn_invalid("FANOUT_PUBLISHER", &v),
        }
    }
    if let Some(v) = read("FANOUT_BUS_KIND") {
        match v.parse() {
            Ok(kind) => settings.bus.kind = kind,
            Err(_) => warn_invalid("FANOUT_BUS_KIND", &v),
        }
    }
    if let Some(v) = read("FANOUT_BUS_URL") {
        settings.bus.url = v;
    }
    if let Some(v) = read("FANOUT_BUS_TOPIC") {
        settings.bus.topic = v;
    }
    if let Some(v) = read("FANOUT_MAILBOX_CAPACITY") {
        match parse_usize_range(&v, 1, 1_000_000) {
            Some(n) => settings.connection.mailbox_capacity = n,
            None => warn_invalid("FANOUT_MAILBOX_CAPACITY", &v),
        }
    }
    if let Some(v) = read("FANOUT_MAX_MESSAGE_SIZE") {
        match parse_usize_range(&v, 1, 64 * 1024 * 1024) {
            Some(n) => settings.connection.max_message_size = n,
            None => warn_invalid("FANOUT_MAX_MESSAGE_SIZE", &v),
        }
    }
    if let Some(v) = read("FANOUT_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn warn_invalid(key: &str, value: &str) {
    tracing::warn!(key, value, "invalid env var, ignoring");
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
