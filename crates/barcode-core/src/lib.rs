//! # barcode-core
//!
//! Shared library for the H5 barcode relay containing the JSON wire protocol,
//! the connection role enumeration, and the statistics types reported by the
//! relay.
//!
//! This crate is used by the relay server and by any native desktop consumer.
//! It has zero dependencies on OS APIs, async runtimes, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! A phone opens a web page, scans a barcode with its camera, and sends the
//! result over a WebSocket to the relay running on a desktop machine.  The
//! relay forwards the result to every registered desktop "consumer" and can
//! also type it straight into the focused application.
//!
//! This crate (`barcode-core`) is the shared vocabulary.  It defines:
//!
//! - **`protocol`** – How frames travel over the WebSocket.  Every frame is a
//!   JSON object `{"event": "...", "data": {...}}` decoded into typed Rust
//!   enums on the other end.
//!
//! - **`role`** – The closed set of connection roles (scanner vs. consumer)
//!   and the versioned table that maps declaration strings sent by clients to
//!   those roles.
//!
//! - **`stats`** – The server statistics snapshot and consumer roster that
//!   the relay reports on request.

pub mod protocol;
pub mod role;
pub mod stats;

// Re-export the most-used types at the crate root so callers can write
// `barcode_core::ClientEvent` instead of `barcode_core::protocol::events::ClientEvent`.
pub use protocol::codec::{decode_client_frame, encode_server_frame, ProtocolError};
pub use protocol::events::{ClientEvent, ServerEvent};
pub use role::{Role, UnknownRole};
pub use stats::{ConsumerSummary, ServerStats};
