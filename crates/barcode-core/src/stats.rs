//! Server statistics and the consumer roster.
//!
//! These are derived values: the relay computes them on demand from its
//! registry and scan counter.  Nothing here is stored between requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of the relay's connection counts and scan counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    /// Connections classified as scanners.
    pub scanner_count: usize,
    /// Connections classified as consumers.
    pub consumer_count: usize,
    /// Connections that have not sent a valid `declare` yet.
    pub unclassified_count: usize,
    /// All live connections, classified or not.
    pub total_connections: usize,
    /// Accepted scan reports since the process started.  Never decreases.
    pub scan_count: u64,
    /// When the relay started.
    pub started_at: DateTime<Utc>,
    /// Whole seconds elapsed since `started_at`.
    pub uptime_secs: u64,
}

impl ServerStats {
    /// Builds a snapshot, deriving `total_connections` and `uptime_secs`.
    pub fn new(
        scanner_count: usize,
        consumer_count: usize,
        unclassified_count: usize,
        scan_count: u64,
        started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let uptime_secs = (now - started_at).num_seconds().max(0) as u64;
        Self {
            scanner_count,
            consumer_count,
            unclassified_count,
            total_connections: scanner_count + consumer_count + unclassified_count,
            scan_count,
            started_at,
            uptime_secs,
        }
    }
}

/// One registered consumer, as shown in `statusReply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerSummary {
    /// Platform string from the consumer's `declare` frame.
    pub platform: String,
    /// Client version string from the consumer's `declare` frame.
    pub version: String,
    /// When the transport accepted the connection.
    pub connected_at: DateTime<Utc>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────
