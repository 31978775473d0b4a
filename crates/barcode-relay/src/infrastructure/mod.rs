//! Infrastructure layer for barcode-relay.
//!
//! The infrastructure layer handles all I/O: terminating TLS, serving the
//! HTTP and WebSocket routes, reading the configuration file, and emitting
//! keystrokes into the host's focused window.
//!
//! # Responsibilities
//!
//! - Loading or generating the self-signed TLS certificate
//! - Binding the listener(s) and running the TLS accept loop
//! - Performing the WebSocket upgrade and pumping frames for each session
//! - Serving `/api/status` and `/health`
//! - Reading the optional TOML configuration file
//! - Platform keystroke injection backends
//!
//! # What does NOT belong here?
//!
//! - Role classification and scan fan-out (that is the application layer)
//! - Wire message definitions (that is `barcode-core`)
//! - Command-line parsing (that is done in `main.rs`)

pub mod input_injection;
pub mod storage;
pub mod tls;
pub mod transport;

// Re-export the primary entry points so `main.rs` can call them concisely.
pub use input_injection::build_injector;
pub use tls::CertProvisioner;
pub use transport::RelayServer;
