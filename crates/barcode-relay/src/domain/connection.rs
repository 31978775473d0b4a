//! Connection identity, per-connection metadata, and the scan value object.

use std::fmt;
use std::net::SocketAddr;

use barcode_core::protocol::{ScanReport, PROTOCOL_VERSION};
use barcode_core::{ConsumerSummary, Role};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Opaque identifier assigned when the transport accepts a connection.
///
/// Random v4 UUIDs are never reused while the process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Everything the relay knows about one live connection.
///
/// Transport fields are filled at accept time.  The declared fields stay
/// `None` until a `declare` frame classifies the connection, and the role
/// never changes after that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub id: ConnectionId,
    pub role: Role,
    /// Peer address, when the transport knows it.
    pub remote_addr: Option<SocketAddr>,
    pub connected_at: DateTime<Utc>,
    /// Protocol version greeted with.
    pub protocol_version: u8,
    pub declared_platform: Option<String>,
    pub declared_version: Option<String>,
}

impl ConnectionMeta {
    /// Metadata for a freshly accepted, still unclassified connection.
    pub fn accepted(id: ConnectionId, remote_addr: Option<SocketAddr>) -> Self {
        Self {
            id,
            role: Role::Unclassified,
            remote_addr,
            connected_at: Utc::now(),
            protocol_version: PROTOCOL_VERSION,
            declared_platform: None,
            declared_version: None,
        }
    }

    /// Platform label for logs and broadcasts; `"unknown"` until declared.
    pub fn platform(&self) -> &str {
        self.declared_platform.as_deref().unwrap_or("unknown")
    }

    /// Roster row for `statusReply`.
    pub fn summary(&self) -> ConsumerSummary {
        ConsumerSummary {
            platform: self.platform().to_string(),
            version: self
                .declared_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            connected_at: self.connected_at,
        }
    }
}

/// One accepted scan, built on receipt and consumed by injection and fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEvent {
    /// Non-empty barcode text.
    pub payload: String,
    pub source: ConnectionId,
    /// Sender's timestamp, or the receive time when absent or unparseable.
    pub reported_at: DateTime<Utc>,
    pub format: Option<String>,
}

impl ScanEvent {
    /// Builds a scan from a report, returning `None` for an empty payload.
    pub fn from_report(
        source: ConnectionId,
        report: ScanReport,
        received_at: DateTime<Utc>,
    ) -> Option<Self> {
        if report.payload.is_empty() {
            return None;
        }
        let reported_at = report
            .timestamp
            .as_ref()
            .and_then(|ts| ts.to_utc())
            .unwrap_or(received_at);
        Some(Self {
            payload: report.payload,
            source,
            reported_at,
            format: report.format,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
