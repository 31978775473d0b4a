//! All relay protocol event types.
//!
//! # JSON shape
//!
//! Every frame is an adjacently tagged object: the event name goes in
//! `"event"` and the body in `"data"`.  Body-less events omit `"data"`.
//!
//! ```json
//! {"event":"declare","data":{"type":"scanner","platform":"iOS","version":"2.1"}}
//! {"event":"scanReport","data":{"payload":"ABC-999","timestamp":1718000000000}}
//! {"event":"heartbeat"}
//! ```
//!
//! Adjacent tagging is used instead of an internal `"type"` tag because the
//! `declare` body itself has a field called `type`.
//!
//! # Why separate client→server and server→client enums?
//!
//! The two directions carry different events.  Two distinct enums make it a
//! compile-time error to send a client-only event from the relay, and vice
//! versa.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::Role;
use crate::stats::{ConsumerSummary, ServerStats};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current relay protocol version, reported in the `connected` greeting.
pub const PROTOCOL_VERSION: u8 = 1;

// ── Client → Server events ────────────────────────────────────────────────────

/// Every event a scanner page or desktop consumer can send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    /// Classifies the connection.  Must be the first event a client sends.
    Declare(Declaration),
    /// Reports one scanned code.  Only accepted from scanner connections.
    ScanReport(ScanReport),
    /// Liveness check; answered with `heartbeatAck`.
    Heartbeat,
    /// Asks for a `statusReply` with server statistics and the consumer roster.
    StatusQuery,
}

/// Body of a `declare` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Client type string, mapped through [`crate::role::DECLARATION_TABLE`].
    /// Missing means empty, which the relay rejects as an unknown type.
    #[serde(rename = "type", default)]
    pub client_type: String,
    /// Free-form platform label (e.g. `"Windows"`, `"iOS Safari"`).
    #[serde(default = "unknown")]
    pub platform: String,
    /// Client build version.
    #[serde(default = "unknown")]
    pub version: String,
}

/// Body of a `scanReport` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// The decoded barcode text.  Older pages send it as `barcode`.
    #[serde(default, alias = "barcode")]
    pub payload: String,
    /// When the phone captured the code, if it says so.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<ClientTimestamp>,
    /// Symbology reported by the page scanner, e.g. `"QR_CODE"` or `"EAN_13"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// A timestamp as sent by a client.
///
/// Browser pages send `Date.now()` (epoch milliseconds); other clients send
/// RFC 3339 text.  Any other JSON value is kept as [`ClientTimestamp::Other`]
/// so a bad timestamp never costs the scan it came with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientTimestamp {
    /// Milliseconds since the Unix epoch.
    EpochMillis(i64),
    /// An RFC 3339 date-time string.
    Text(String),
    /// Anything else (fractional numbers, booleans, objects).  Never converts.
    Other(serde_json::Value),
}

impl ClientTimestamp {
    /// Converts to UTC, or `None` if the value is out of range or unparseable.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            ClientTimestamp::EpochMillis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            ClientTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            ClientTimestamp::Other(_) => None,
        }
    }
}

fn unknown() -> String {
    "unknown".to_string()
}

// ── Server → Client events ────────────────────────────────────────────────────

/// Every event the relay sends to a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Greeting sent once, right after the connection is accepted.
    Connected(Connected),
    /// Answer to `declare`.
    DeclareAck(DeclareAck),
    /// Answer to `scanReport`, sent to the reporting scanner.
    ScanAck(ScanAck),
    /// A scan result pushed to every registered consumer.
    ScanBroadcast(ScanBroadcast),
    /// Answer to `heartbeat`.
    HeartbeatAck(HeartbeatAck),
    /// Answer to `statusQuery`.
    StatusReply(StatusReply),
    /// An inbound frame could not be decoded.
    Error(ErrorBody),
}

/// Outcome flag carried by acknowledgments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Ok,
    Error,
}

/// Body of the `connected` greeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    /// Relay-assigned identifier for this connection.
    pub connection_id: Uuid,
    pub server_time: DateTime<Utc>,
    pub protocol_version: u8,
}

/// Body of `declareAck`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclareAck {
    pub status: AckStatus,
    /// The connection's role after the declaration was processed.
    pub role: Role,
    /// Registered consumers.  Sent to new consumers and to new scanners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_count: Option<usize>,
    /// Registered scanners.  Sent to new consumers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scanner_count: Option<usize>,
    /// Human-readable reason when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `scanAck`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanAck {
    pub status: AckStatus,
    /// Echo of the reported payload.
    pub payload: String,
    /// Consumers whose queue accepted the broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumers_reached: Option<usize>,
    /// Human-readable reason when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Body of `scanBroadcast`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanBroadcast {
    pub payload: String,
    /// When the scan was reported; receive time if the scanner sent none.
    pub timestamp: DateTime<Utc>,
    /// Platform string the scanner declared.
    pub source_platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

/// Body of `heartbeatAck`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatAck {
    pub server_time: DateTime<Utc>,
}

/// Body of `statusReply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReply {
    #[serde(flatten)]
    pub stats: ServerStats,
    pub consumers: Vec<ConsumerSummary>,
}

/// Body of `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl ServerEvent {
    /// Short event name for log lines, without any field values.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::DeclareAck(_) => "declareAck",
            ServerEvent::ScanAck(_) => "scanAck",
            ServerEvent::ScanBroadcast(_) => "scanBroadcast",
            ServerEvent::HeartbeatAck(_) => "heartbeatAck",
            ServerEvent::StatusReply(_) => "statusReply",
            ServerEvent::Error(_) => "error",
        }
    }
}

impl ClientEvent {
    /// Short event name for log lines, without any field values.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Declare(_) => "declare",
            ClientEvent::ScanReport(_) => "scanReport",
            ClientEvent::Heartbeat => "heartbeat",
            ClientEvent::StatusQuery => "statusQuery",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
