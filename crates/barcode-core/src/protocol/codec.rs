//! JSON codec for relay protocol frames.
//!
//! Wire format: one WebSocket **text** frame carries exactly one UTF-8 JSON
//! object of the form
//! ```text
//! {"event": "<camelCase name>", "data": { ...event body... }}
//! ```
//! Binary frames are not part of the protocol and are rejected by the
//! transport before they reach this module.

use thiserror::Error;

use crate::protocol::events::{ClientEvent, ServerEvent};

/// Largest inbound frame the relay will attempt to parse, in bytes.
///
/// A barcode payload is at most a few kilobytes (QR codes top out near 3 KB),
/// so anything larger is treated as hostile or broken.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The text is not valid JSON, names an unknown event, or carries a body
    /// whose fields do not match the event.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame exceeds [`MAX_FRAME_BYTES`].
    #[error("frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge { size: usize, limit: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Decodes one client→server frame.
///
/// # Errors
///
/// Returns [`ProtocolError::FrameTooLarge`] before parsing if the text is
/// longer than [`MAX_FRAME_BYTES`], and [`ProtocolError::Malformed`] for
/// anything that does not deserialize into a [`ClientEvent`].
///
/// # Examples
///
/// ```rust
/// use barcode_core::protocol::{decode_client_frame, ClientEvent};
///
/// let event = decode_client_frame(r#"{"event":"heartbeat"}"#).unwrap();
/// assert_eq!(event, ClientEvent::Heartbeat);
/// assert!(decode_client_frame("not json").is_err());
/// ```
pub fn decode_client_frame(text: &str) -> Result<ClientEvent, ProtocolError> {
    check_size(text)?;
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encodes one server→client frame as JSON text.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails, which only
/// happens if a type's `Serialize` impl itself reports an error.
pub fn encode_server_frame(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Encodes one client→server frame.  Used by native consumers and tests.
///
/// # Errors
///
/// Returns [`ProtocolError::Malformed`] if serialization fails.
pub fn encode_client_frame(event: &ClientEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Decodes one server→client frame.  Used by native consumers and tests.
///
/// # Errors
///
/// Same conditions as [`decode_client_frame`].
pub fn decode_server_frame(text: &str) -> Result<ServerEvent, ProtocolError> {
    check_size(text)?;
    serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

fn check_size(text: &str) -> Result<(), ProtocolError> {
    if text.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            limit: MAX_FRAME_BYTES,
        });
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
