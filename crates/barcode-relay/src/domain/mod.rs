//! Domain layer for barcode-relay.
//!
//! Pure value types with no dependencies on I/O, sockets, or the async
//! runtime.  The infrastructure layer fills them in (from CLI flags, TOML,
//! or accepted sockets) and the application layer consumes them.

pub mod config;
pub mod connection;

pub use config::{InjectPolicy, RelayConfig};
pub use connection::{ConnectionId, ConnectionMeta, ScanEvent};
