//! TOML configuration file for the relay.
//!
//! Every key is optional; anything left out keeps the value it already had
//! in [`RelayConfig`] (the built-in default, unless something earlier set it).
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 5100
//! relay_port = 5101          # omit for single-port mode
//! ping_interval_secs = 25
//! idle_timeout_secs = 60
//! shutdown_grace_secs = 5
//!
//! [tls]
//! cert_dir = "certs"
//!
//! [injection]
//! mode = "always"            # always | fallback | off
//! timeout_ms = 2000
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Why `Option` everywhere? (for beginners)
//!
//! With `#[serde(default)]` on a struct of `Option` fields, a missing key
//! becomes `None`.  [`FileConfig::apply_to`] then copies only the `Some`
//! values, so the file can override one setting without restating the rest.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{InjectPolicy, RelayConfig};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The TOML parsed but a value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub tls: TlsSection,
    pub injection: InjectionSection,
    pub logging: LoggingSection,
}

/// `[server]`: bindings and connection timing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    /// Setting this enables dual-port mode.
    pub relay_port: Option<u16>,
    pub ping_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
}

/// `[tls]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TlsSection {
    pub cert_dir: Option<PathBuf>,
}

/// `[injection]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InjectionSection {
    pub mode: Option<InjectPolicy>,
    pub timeout_ms: Option<u64>,
}

/// `[logging]`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub level: Option<String>,
}

impl FileConfig {
    /// Parses TOML text and checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys, and
    /// [`ConfigError::Invalid`] for zero durations or a zero port.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let server = &self.server;
        if server.port == Some(0) || server.relay_port == Some(0) {
            return Err(ConfigError::Invalid("ports must be non-zero".to_string()));
        }
        if let (Some(port), Some(relay_port)) = (server.port, server.relay_port) {
            if port == relay_port {
                return Err(ConfigError::Invalid(format!(
                    "relay_port must differ from port (both {port})"
                )));
            }
        }
        let durations = [
            ("server.ping_interval_secs", server.ping_interval_secs),
            ("server.idle_timeout_secs", server.idle_timeout_secs),
            ("injection.timeout_ms", self.injection.timeout_ms),
        ];
        for (key, value) in durations {
            if value == Some(0) {
                return Err(ConfigError::Invalid(format!("{key} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Overlays every value present in the file onto `config`.
    pub fn apply_to(&self, config: &mut RelayConfig) {
        let server = &self.server;
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(relay_port) = server.relay_port {
            config.relay_port = Some(relay_port);
        }
        if let Some(secs) = server.ping_interval_secs {
            config.ping_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = server.idle_timeout_secs {
            config.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = server.shutdown_grace_secs {
            config.shutdown_grace = Duration::from_secs(secs);
        }
        if let Some(cert_dir) = &self.tls.cert_dir {
            config.cert_dir = cert_dir.clone();
        }
        if let Some(mode) = self.injection.mode {
            config.inject = mode;
        }
        if let Some(ms) = self.injection.timeout_ms {
            config.inject_timeout = Duration::from_millis(ms);
        }
        if let Some(level) = &self.logging.level {
            config.log_level = level.clone();
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads the configuration file at `path`.
///
/// The file was named explicitly, so a missing file is an error rather than
/// an empty configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read, and
/// [`ConfigError::Parse`] or [`ConfigError::Invalid`] for bad content.
pub fn load_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_changes_nothing() {
        // Arrange
        let file = FileConfig::from_toml("").unwrap();
        let mut cfg = RelayConfig::default();

        // Act
        file.apply_to(&mut cfg);

        // Assert
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_full_file_overrides_every_setting() {
        // Arrange
        let text = r#"
            [server]
            host = "127.0.0.1"
            port = 8443
            relay_port = 8444
            ping_interval_secs = 10
            idle_timeout_secs = 30
            shutdown_grace_secs = 1

            [tls]
            cert_dir = "/var/lib/barcode/certs"

            [injection]
            mode = "fallback"
            timeout_ms = 500

            [logging]
            level = "debug"
        "#;
        let mut cfg = RelayConfig::default();

        // Act
        FileConfig::from_toml(text).unwrap().apply_to(&mut cfg);

        // Assert
        assert_eq!(cfg.primary_addr().to_string(), "127.0.0.1:8443");
        assert_eq!(cfg.relay_port, Some(8444));
        assert_eq!(cfg.ping_interval, Duration::from_secs(10));
        assert_eq!(cfg.idle_timeout, Duration::from_secs(30));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(1));
        assert_eq!(cfg.cert_dir, PathBuf::from("/var/lib/barcode/certs"));
        assert_eq!(cfg.inject, InjectPolicy::Fallback);
        assert_eq!(cfg.inject_timeout, Duration::from_millis(500));
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let mut cfg = RelayConfig::default();
        FileConfig::from_toml("[server]\nport = 6000\n")
            .unwrap()
            .apply_to(&mut cfg);
        assert_eq!(cfg.port, 6000);
        assert!(!cfg.is_dual_port());
        assert_eq!(cfg.inject, InjectPolicy::Always);
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = FileConfig::from_toml("[server]\nprot = 6000\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_inject_mode_is_parse_error() {
        let err = FileConfig::from_toml("[injection]\nmode = \"sometimes\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_port_is_invalid() {
        let err = FileConfig::from_toml("[server]\nport = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_same_primary_and_relay_port_is_invalid() {
        let err = FileConfig::from_toml("[server]\nport = 5100\nrelay_port = 5100\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_idle_timeout_is_invalid() {
        let err = FileConfig::from_toml("[server]\nidle_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_config_reads_file_from_disk() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        // Act
        let file = load_config(&path).unwrap();

        // Assert
        assert_eq!(file.logging.level.as_deref(), Some("warn"));
    }

    #[test]
    fn test_load_config_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
