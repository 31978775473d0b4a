//! TLS transport: listeners, HTTP routes, and WebSocket sessions.
//!
//! ```text
//!   TcpListener ──accept──► TLS handshake ──► hyper connection ──► axum Router
//!                                                                   │
//!                             /api/status, /health ◄────────────────┤
//!                                                                   │
//!                             /ws ──upgrade──► session task ◄── outbound queue
//!                                                 │                    ▲
//!                                                 ▼                    │
//!                                            EventRelay ───────────────┘
//! ```
//!
//! - [`listener`] binds the port(s), runs the accept loops, and drives
//!   graceful shutdown.
//! - [`routes`] builds the axum router for each port.
//! - [`lan_address`] finds the LAN address phones should connect to.
//! - [`session`] pumps one WebSocket: inbound frames into the relay, the
//!   connection's outbound queue back onto the socket, and keepalive pings.
//!
//! # Why serve hyper directly? (for beginners)
//!
//! `axum::serve` only accepts plain TCP listeners.  To put TLS in front of the
//! router we accept sockets ourselves, wrap them with `tokio-rustls`, and hand
//! each stream to hyper's connection builder with the router as the service.
//! `serve_connection_with_upgrades` keeps the HTTP upgrade machinery working,
//! which is what lets `/ws` switch protocols on the same port.

pub mod lan_address;
pub mod listener;
pub mod routes;
pub mod session;

pub use lan_address::advertised_ip;
pub use listener::RelayServer;
pub use routes::{build_router, AppState, BindInfo, RouteSet, SessionTiming, StatusBody};
