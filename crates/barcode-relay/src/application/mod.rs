//! Application layer for barcode-relay.
//!
//! The application layer knows *what* happens to a frame; the infrastructure
//! layer knows *how* bytes reach it.
//!
//! # Responsibilities
//!
//! - Tracking live connections and their roles (`session_registry`)
//! - Running the per-connection protocol state machine (`event_relay`)
//! - Defining the keystroke-injection contract (`inject_input`)
//!
//! # What does NOT belong here?
//!
//! - Sockets, TLS, or WebSocket framing (infrastructure)
//! - OS input APIs (infrastructure/input_injection)

pub mod event_relay;
pub mod inject_input;
pub mod session_registry;

pub use event_relay::{EventRelay, RelayError};
pub use inject_input::{InjectionError, InjectionLane, InputInjector};
pub use session_registry::{
    Outbound, RegistryError, RoleCounts, SessionRegistry, OUTBOUND_QUEUE_CAPACITY,
};
