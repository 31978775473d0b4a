//! Storage infrastructure: the optional configuration file.
//!
//! The relay runs with no file at all.  When `--config <path>` (or
//! `BARCODE_CONFIG`) names one, the `config` sub-module reads it and overlays
//! its values on the built-in defaults; command-line flags are applied last.

pub mod config;

pub use config::{load_config, ConfigError, FileConfig};
