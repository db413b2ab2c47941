//! # fanout-settings
//!
//! Configuration for the fanout relay, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults** ([`FanoutSettings::default()`])
//! 2. **Settings file** (JSON, deep-merged over defaults)
//! 3. **Environment variables** (`FANOUT_*` overrides, highest priority)
//!
//! Command-line flags are applied by the binary on top of the loaded value.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path};
pub use types::*;
