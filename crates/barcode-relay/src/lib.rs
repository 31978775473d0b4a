//! barcode-relay library crate.
//!
//! This crate turns a desktop machine into the receiving end of a phone
//! barcode scanner.  Phones connect over TLS WebSockets, declare themselves
//! scanners, and report scanned codes; the relay forwards every code to the
//! registered desktop consumers and can also type it into the focused
//! application.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Phone page / desktop consumer  (JSON over TLS WebSocket)
//!         ↕
//! [barcode-relay]
//!   ├── domain/           Pure types: RelayConfig, connection metadata, ScanEvent
//!   ├── application/      Session registry, event relay state machine,
//!   │                     input-injector contract
//!   └── infrastructure/
//!         ├── tls/             Certificate provisioning (rcgen / openssl)
//!         ├── input_injection/ SendInput, CoreGraphics, XTest
//!         ├── transport/       TLS accept loop, axum routes, WebSocket sessions
//!         └── storage/         Optional TOML configuration file
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `barcode-core`; it talks to the
//!   outside world only through the `InputInjector` trait and per-connection
//!   outbound queues, so it can be tested with fake connections.
//! - `infrastructure` depends on all other layers plus `tokio`, `axum`, and
//!   `rustls`.

/// Domain layer: configuration and connection value types (no I/O).
pub mod domain;

/// Application layer: registry, relay state machine, injection contract.
pub mod application;

/// Infrastructure layer: TLS, OS input injection, network transport, config file.
pub mod infrastructure;
