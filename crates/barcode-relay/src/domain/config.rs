//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! `main.rs` builds it from defaults, the optional TOML file, environment
//! variables, and CLI flags, in that order; nothing below the binary reads
//! the environment.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// When the relay types an accepted scan into the focused application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectPolicy {
    /// Inject every accepted scan, whether or not consumers are registered.
    #[default]
    Always,
    /// Inject only when no consumer is registered at processing time.
    Fallback,
    /// Never inject.
    Off,
}

/// An `inject` setting that is not `always`, `fallback`, or `off`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid inject policy {0:?} (expected always, fallback, or off)")]
pub struct InvalidInjectPolicy(pub String);

impl FromStr for InjectPolicy {
    type Err = InvalidInjectPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(InjectPolicy::Always),
            "fallback" => Ok(InjectPolicy::Fallback),
            "off" | "none" => Ok(InjectPolicy::Off),
            _ => Err(InvalidInjectPolicy(s.to_string())),
        }
    }
}

impl fmt::Display for InjectPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InjectPolicy::Always => "always",
            InjectPolicy::Fallback => "fallback",
            InjectPolicy::Off => "off",
        })
    }
}

/// All runtime configuration for the relay.
///
/// Build this once at startup and share it behind an `Arc`.
///
/// # Example
///
/// ```rust
/// use barcode_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.primary_addr().port(), 5100);
/// assert!(!cfg.is_dual_port());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Interface to bind.  `0.0.0.0` accepts phones on the LAN.
    pub host: IpAddr,
    /// Primary port.  Serves the status routes, and `/ws` in single-port mode.
    pub port: u16,
    /// Secondary port for `/ws`.  `Some` switches to dual-port mode.
    pub relay_port: Option<u16>,
    /// Directory holding `server.crt` and `server.key`.
    pub cert_dir: PathBuf,
    pub inject: InjectPolicy,
    /// Longest the relay waits for one injection before moving on.
    pub inject_timeout: Duration,
    /// Interval between WebSocket pings.
    pub ping_interval: Duration,
    /// A connection silent for longer than this is closed.
    pub idle_timeout: Duration,
    /// How long shutdown waits for sessions to close before clearing the registry.
    pub shutdown_grace: Duration,
    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl RelayConfig {
    /// Address of the primary listener.
    pub fn primary_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Address of the secondary WebSocket listener, in dual-port mode.
    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.relay_port.map(|port| SocketAddr::new(self.host, port))
    }

    pub fn is_dual_port(&self) -> bool {
        self.relay_port.is_some()
    }
}

impl Default for RelayConfig {
    /// | Field           | Default     |
    /// |-----------------|-------------|
    /// | host            | `0.0.0.0`   |
    /// | port            | `5100`      |
    /// | relay_port      | none        |
    /// | cert_dir        | `certs`     |
    /// | inject          | `always`    |
    /// | inject_timeout  | 2 seconds   |
    /// | ping_interval   | 25 seconds  |
    /// | idle_timeout    | 60 seconds  |
    /// | shutdown_grace  | 5 seconds   |
    /// | log_level       | `info`      |
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5100,
            relay_port: None,
            cert_dir: PathBuf::from("certs"),
            inject: InjectPolicy::Always,
            inject_timeout: Duration::from_secs(2),
            ping_interval: Duration::from_secs(25),
            idle_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
