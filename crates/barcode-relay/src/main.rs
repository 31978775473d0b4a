//! Barcode relay entry point.
//!
//! This binary turns the desktop into the receiving end of a phone barcode
//! scanner.  Phones open the scanner page, connect over a TLS WebSocket, and
//! report every code they read; the relay forwards each code to registered
//! desktop consumers and types it into the focused application.
//!
//! # Usage
//!
//! ```text
//! barcode-relay [OPTIONS]
//!
//! Options:
//!   --host <IP>                Interface to bind [default: 0.0.0.0]
//!   --port <PORT>              Primary HTTPS/WSS port [default: 5100]
//!   --ws-port <PORT>           Separate WebSocket port (enables dual-port mode)
//!   --cert-dir <DIR>           Directory for server.crt / server.key [default: certs]
//!   --inject <MODE>            always | fallback | off [default: always]
//!   --inject-timeout-ms <MS>   Longest wait for one injection [default: 2000]
//!   --config <FILE>            Optional TOML configuration file
//!   --log-level <FILTER>       Log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Where settings come from
//!
//! Later sources win:
//!
//! 1. Built-in defaults (`RelayConfig::default()`)
//! 2. The TOML file named by `--config` / `BARCODE_CONFIG`
//! 3. Environment variables
//! 4. Command-line flags
//!
//! | Variable           | Flag           |
//! |--------------------|----------------|
//! | `BARCODE_HOST`     | `--host`       |
//! | `BARCODE_PORT`     | `--port`       |
//! | `BARCODE_WS_PORT`  | `--ws-port`    |
//! | `BARCODE_CERT_DIR` | `--cert-dir`   |
//! | `BARCODE_INJECT`   | `--inject`     |
//! | `BARCODE_CONFIG`   | `--config`     |
//!
//! # Startup
//!
//! A TLS certificate is mandatory: phones refuse camera access on plain
//! HTTP.  If none exists and none can be generated, the process exits with a
//! non-zero status.  A missing keystroke backend is not fatal; scans are
//! still relayed to consumers.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use barcode_relay::application::{EventRelay, SessionRegistry};
use barcode_relay::domain::{InjectPolicy, RelayConfig};
use barcode_relay::infrastructure::storage::load_config;
use barcode_relay::infrastructure::{build_injector, CertProvisioner, RelayServer};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// TLS WebSocket relay for phone barcode scanners.
///
/// Every option is optional; anything not given keeps the value from the
/// config file, or the built-in default.
#[derive(Debug, Parser)]
#[command(
    name = "barcode-relay",
    about = "Relay phone barcode scans to desktop consumers and the focused window",
    version
)]
struct Cli {
    /// Interface to bind.  `0.0.0.0` lets phones on the LAN connect.
    #[arg(long, env = "BARCODE_HOST")]
    host: Option<IpAddr>,

    /// Primary port (HTTPS routes, and `/ws` in single-port mode).
    #[arg(long, env = "BARCODE_PORT")]
    port: Option<u16>,

    /// Separate port for `/ws`.  Setting it enables dual-port mode.
    #[arg(long, env = "BARCODE_WS_PORT")]
    ws_port: Option<u16>,

    /// Directory holding `server.crt` and `server.key`; created if missing.
    #[arg(long, env = "BARCODE_CERT_DIR")]
    cert_dir: Option<PathBuf>,

    /// When to type scans into the focused window: always, fallback, or off.
    #[arg(long, env = "BARCODE_INJECT")]
    inject: Option<InjectPolicy>,

    /// Longest wait for one keystroke injection, in milliseconds.
    #[arg(long)]
    inject_timeout_ms: Option<u64>,

    /// TOML configuration file.  Must exist when given.
    #[arg(long, env = "BARCODE_CONFIG")]
    config: Option<PathBuf>,

    /// `tracing` filter used when `RUST_LOG` is unset (e.g. `debug`).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Builds the effective [`RelayConfig`] from defaults, the config file,
    /// and the parsed arguments.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, or the final
    /// configuration uses the same port twice or a zero timeout.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = RelayConfig::default();

        if let Some(path) = &self.config {
            load_config(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?
                .apply_to(&mut config);
        }

        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ws_port) = self.ws_port {
            config.relay_port = Some(ws_port);
        }
        if let Some(cert_dir) = self.cert_dir {
            config.cert_dir = cert_dir;
        }
        if let Some(inject) = self.inject {
            config.inject = inject;
        }
        if let Some(ms) = self.inject_timeout_ms {
            config.inject_timeout = Duration::from_millis(ms);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        if config.relay_port == Some(config.port) {
            anyhow::bail!(
                "--ws-port must differ from --port (both {}); omit it for single-port mode",
                config.port
            );
        }
        if config.inject_timeout.is_zero() {
            anyhow::bail!("--inject-timeout-ms must be greater than zero");
        }
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments (and `BARCODE_*` variables) are parsed and merged with
///    the optional config file into a [`RelayConfig`].
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over the
///    configured level.
/// 3. The TLS certificate is loaded or generated.  Failure exits here.
/// 4. The keystroke injector is chosen for the configured policy.
/// 5. The listener(s) are bound, and a Ctrl+C / SIGTERM handler is spawned
///    that cancels the shared [`CancellationToken`].
/// 6. [`RelayServer::run`] serves until that token fires, then drains.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_relay_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        addr = %config.primary_addr(),
        relay_port = ?config.relay_port,
        inject = %config.inject,
        "barcode relay starting"
    );

    // ── TLS certificate ───────────────────────────────────────────────────────
    let provisioner = CertProvisioner::new(&config.cert_dir);
    let tls = provisioner
        .ensure_certificate()
        .context("cannot start without a TLS certificate")?;
    let cert = provisioner.certificate_info();
    info!(
        cert = %cert.cert_path.display(),
        key = %cert.key_path.display(),
        generated = cert.generated(),
        "TLS certificate ready"
    );

    // ── Relay core ────────────────────────────────────────────────────────────
    let injector = build_injector(config.inject);
    let relay = Arc::new(EventRelay::new(
        Arc::new(SessionRegistry::new()),
        injector,
        config.inject,
        config.inject_timeout,
    ));

    let generated = cert.generated();
    let server = RelayServer::bind(config, relay, tls).await?;
    let url = format!(
        "https://{}:{}",
        server.advertised_ip(),
        server.local_addr().context("reading listener address")?.port()
    );
    info!(%url, "open this address on the phone");
    if generated {
        warn!("new self-signed certificate: open {url}/health on each phone once and accept the browser warning");
    }

    // ── Graceful shutdown ─────────────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        trigger.cancel();
    });

    server.run(shutdown).await?;
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
