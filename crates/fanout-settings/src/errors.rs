//! Settings error types.

use thiserror::Error;

/// Errors raised while loading settings or applying overrides.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for [`crate::FanoutSettings`].
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A listen address without a `:port` part.
    #[error("listen address {0:?} must be host:port or :port")]
    ListenAddr(String),
    /// A listen address whose port is not a `u16`.
    #[error("listen address {0:?} has an invalid port")]
    ListenPort(String),
    /// A bus kind other than `in-process` or `nats`.
    #[error("unknown bus kind {0:?} (expected in-process or nats)")]
    UnknownBus(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_keeps_os_message() {
        let err = SettingsError::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such file",
        ));
        assert_eq!(err.to_string(), "failed to read settings file: no such file");
    }

    #[test]
    fn malformed_json_converts() {
        let json_err = serde_json::from_str::<crate::FanoutSettings>("{\"hub\":").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn listen_errors_name_the_address() {
        assert_eq!(
            SettingsError::ListenAddr("8080".into()).to_string(),
            "listen address \"8080\" must be host:port or :port"
        );
        assert_eq!(
            SettingsError::ListenPort(":http".into()).to_string(),
            "listen address \":http\" has an invalid port"
        );
    }

    #[test]
    fn unknown_bus_lists_choices() {
        let err = SettingsError::UnknownBus("kafka".into());
        assert!(err.to_string().contains("in-process or nats"));
    }
}
