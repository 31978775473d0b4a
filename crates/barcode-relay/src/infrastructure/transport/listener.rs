//! Listener: binds the port(s), terminates TLS, and serves the router.
//!
//! # Shutdown sequence
//!
//! When the [`CancellationToken`] passed to [`RelayServer::run`] fires:
//!
//! 1. The accept loops stop taking new sockets.
//! 2. Every session sees the same token, sends a Close frame, and
//!    deregisters; idle HTTP connections finish their current request.
//! 3. `run` waits for all of those tasks, at most `shutdown_grace`.
//! 4. Whatever is still in the registry is cleared.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::ConnectInfo;
use axum::Router;
use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower::Service;
use tracing::{debug, info, warn};

use crate::application::EventRelay;
use crate::domain::RelayConfig;
use crate::infrastructure::transport::lan_address::advertised_ip;
use crate::infrastructure::transport::routes::{build_router, AppState, BindInfo, RouteSet, SessionTiming};

/// A client that has not finished the TLS handshake by then is dropped.
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The bound listeners plus everything needed to serve them.
pub struct RelayServer {
    config: RelayConfig,
    relay: Arc<EventRelay>,
    acceptor: TlsAcceptor,
    primary: TcpListener,
    secondary: Option<TcpListener>,
    advertised_ip: IpAddr,
}

impl RelayServer {
    /// Binds the primary port and, in dual-port mode, the relay port.
    ///
    /// Binding happens here rather than in [`RelayServer::run`] so a port
    /// conflict is reported before the process announces it is ready.
    ///
    /// # Errors
    ///
    /// Returns an error if either listener cannot be bound.
    pub async fn bind(
        config: RelayConfig,
        relay: Arc<EventRelay>,
        tls: Arc<ServerConfig>,
    ) -> anyhow::Result<Self> {
        let primary_addr = config.primary_addr();
        let primary = TcpListener::bind(primary_addr)
            .await
            .with_context(|| format!("failed to bind listener on {primary_addr}"))?;

        let secondary = match config.relay_addr() {
            Some(relay_addr) => Some(
                TcpListener::bind(relay_addr)
                    .await
                    .with_context(|| format!("failed to bind relay listener on {relay_addr}"))?,
            ),
            None => None,
        };

        // WebSocket upgrades need HTTP/1.1; offering only that keeps browsers
        // from negotiating h2.
        let mut tls = ServerConfig::clone(&tls);
        tls.alpn_protocols = vec![b"http/1.1".to_vec()];

        let advertised_ip = advertised_ip(config.host).await;

        Ok(Self {
            config,
            relay,
            acceptor: TlsAcceptor::from(Arc::new(tls)),
            primary,
            secondary,
            advertised_ip,
        })
    }

    /// Address of the primary listener.  Useful when bound to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.primary.local_addr()
    }

    /// Address phones should connect to.  For a wildcard bind this is the
    /// LAN interface address, or `127.0.0.1` when none can be found.
    pub fn advertised_ip(&self) -> IpAddr {
        self.advertised_ip
    }

    /// Address of the `/ws` listener: the relay port in dual-port mode,
    /// otherwise the primary port.
    pub fn relay_addr(&self) -> std::io::Result<SocketAddr> {
        match &self.secondary {
            Some(listener) => listener.local_addr(),
            None => self.primary.local_addr(),
        }
    }

    /// Serves until `shutdown` is cancelled, then drains sessions.
    ///
    /// # Errors
    ///
    /// Returns an error only if the bound addresses cannot be read back.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let primary_addr = self.local_addr().context("reading primary listener address")?;
        let relay_port = match &self.secondary {
            Some(listener) => Some(
                listener
                    .local_addr()
                    .context("reading relay listener address")?
                    .port(),
            ),
            None => None,
        };
        let RelayServer {
            config,
            relay,
            acceptor,
            primary,
            secondary,
            advertised_ip,
        } = self;

        let tracker = TaskTracker::new();
        let state = AppState {
            relay: Arc::clone(&relay),
            bind: BindInfo {
                host: config.host,
                advertised_ip,
                port: primary_addr.port(),
                relay_port,
            },
            timing: SessionTiming {
                ping_interval: config.ping_interval,
                idle_timeout: config.idle_timeout,
            },
            shutdown: shutdown.clone(),
            tracker: tracker.clone(),
        };

        let primary_routes = match relay_port {
            Some(port) => {
                info!(%primary_addr, %advertised_ip, relay_port = port, "relay listening (dual-port)");
                RouteSet::Http
            }
            None => {
                info!(%primary_addr, %advertised_ip, "relay listening");
                RouteSet::All
            }
        };

        let primary_loop = accept_loop(
            primary,
            acceptor.clone(),
            build_router(state.clone(), primary_routes),
            tracker.clone(),
            shutdown.clone(),
        );
        let secondary_loop = async {
            if let Some(listener) = secondary {
                accept_loop(
                    listener,
                    acceptor.clone(),
                    build_router(state.clone(), RouteSet::WebSocket),
                    tracker.clone(),
                    shutdown.clone(),
                )
                .await;
            }
        };
        tokio::join!(primary_loop, secondary_loop);

        info!(tasks = tracker.len(), "listeners stopped; draining connections");
        tracker.close();
        if timeout(config.shutdown_grace, tracker.wait()).await.is_err() {
            warn!(
                remaining = tracker.len(),
                grace = ?config.shutdown_grace,
                "connections still open after grace period"
            );
        }
        let cleared = relay.registry().clear().await;
        info!(cleared, "relay stopped");
        Ok(())
    }
}

// ── Accept loop ───────────────────────────────────────────────────────────────

async fn accept_loop(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    tracker: TaskTracker,
    shutdown: CancellationToken,
) {
    loop {
        let (tcp, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };
        debug!(%peer, "tcp connection accepted");
        tracker.spawn(serve_connection(
            tcp,
            peer,
            acceptor.clone(),
            router.clone(),
            shutdown.clone(),
        ));
    }
}

/// Completes the TLS handshake and serves HTTP (and upgrades) on one socket.
async fn serve_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    router: Router,
    shutdown: CancellationToken,
) {
    let tls = match timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            // Phones that have not trusted the certificate yet abort here.
            debug!(%peer, "TLS handshake failed: {e}");
            return;
        }
        Err(_) => {
            debug!(%peer, "TLS handshake timed out");
            return;
        }
    };

    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().call(request)
    });

    let builder = Builder::new(TokioExecutor::new());
    let connection = builder.serve_connection_with_upgrades(TokioIo::new(tls), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };
    if let Err(e) = result {
        debug!(%peer, "connection ended with error: {e}");
    }
}
