//! HTTP routes and the WebSocket upgrade handler.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use barcode_core::protocol::MAX_FRAME_BYTES;
use barcode_core::ServerStats;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::application::EventRelay;
use crate::infrastructure::transport::session::run_session;

/// Which routes a listener serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteSet {
    /// Single-port mode: status routes and `/ws` on one port.
    All,
    /// Dual-port mode, primary port: status routes only.
    Http,
    /// Dual-port mode, secondary port: `/ws` only.
    WebSocket,
}

impl RouteSet {
    fn serves_http(self) -> bool {
        matches!(self, RouteSet::All | RouteSet::Http)
    }

    fn serves_websocket(self) -> bool {
        matches!(self, RouteSet::All | RouteSet::WebSocket)
    }
}

/// Addresses actually bound, as reported by `/api/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
    pub host: IpAddr,
    /// Address phones should connect to (the LAN address for a wildcard bind).
    pub advertised_ip: IpAddr,
    pub port: u16,
    pub relay_port: Option<u16>,
}

/// Keepalive settings for WebSocket sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

/// State shared by every route handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<EventRelay>,
    pub bind: BindInfo,
    pub timing: SessionTiming,
    /// Cancelled when the relay begins shutting down.
    pub shutdown: CancellationToken,
    /// Tracks session tasks so shutdown can wait for them.
    pub tracker: TaskTracker,
}

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    #[serde(flatten)]
    pub stats: ServerStats,
    /// Address phones should open, e.g. `192.168.1.20`.
    pub ip: String,
    pub host: String,
    pub port: u16,
    pub relay_port: Option<u16>,
    pub running: bool,
}

/// Builds the router for one listener.
pub fn build_router(state: AppState, routes: RouteSet) -> Router {
    let mut router = Router::new();
    if routes.serves_http() {
        router = router
            .route("/api/status", get(status_handler))
            .route("/health", get(health_handler));
    }
    if routes.serves_websocket() {
        router = router.route("/ws", get(ws_handler));
    }
    router.with_state(state)
}

async fn status_handler(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        stats: state.relay.stats().await,
        ip: state.bind.advertised_ip.to_string(),
        host: state.bind.host.to_string(),
        port: state.bind.port,
        relay_port: state.bind.relay_port,
        running: !state.shutdown.is_cancelled(),
    })
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Counted from here: the upgrade completes after this handler returns,
    // and shutdown must already be waiting for the session by then.
    let token = state.tracker.token();
    ws.max_message_size(MAX_FRAME_BYTES).on_upgrade(move |socket| async move {
        run_session(socket, peer, state).await;
        drop(token);
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::application::SessionRegistry;
    use crate::domain::InjectPolicy;
    use crate::infrastructure::input_injection::RecordingInjector;

    fn state() -> AppState {
        let relay = EventRelay::new(
            Arc::new(SessionRegistry::new()),
            Arc::new(RecordingInjector::new()),
            InjectPolicy::Off,
            Duration::from_secs(1),
        );
        AppState {
            relay: Arc::new(relay),
            bind: BindInfo {
                host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                advertised_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)),
                port: 5100,
                relay_port: None,
            },
            timing: SessionTiming {
                ping_interval: Duration::from_secs(25),
                idle_timeout: Duration::from_secs(60),
            },
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    async fn get_path(router: Router, path: &str) -> (StatusCode, Vec<u8>) {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (status, body) = get_path(build_router(state(), RouteSet::All), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_status_reports_stats_and_bindings() {
        // Arrange
        let router = build_router(state(), RouteSet::All);

        // Act
        let (status, body) = get_path(router, "/api/status").await;

        // Assert
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["scanCount"], 0);
        assert_eq!(json["totalConnections"], 0);
        assert_eq!(json["ip"], "192.168.1.20");
        assert_eq!(json["host"], "0.0.0.0");
        assert_eq!(json["port"], 5100);
        assert_eq!(json["relayPort"], serde_json::Value::Null);
        assert_eq!(json["running"], true);
    }

    #[tokio::test]
    async fn test_status_reports_not_running_after_shutdown() {
        let state = state();
        state.shutdown.cancel();
        let (_, body) = get_path(build_router(state, RouteSet::Http), "/api/status").await;
        let parsed: StatusBody = serde_json::from_slice(&body).unwrap();
        assert!(!parsed.running);
    }

    #[tokio::test]
    async fn test_websocket_only_router_has_no_status_routes() {
        let (status, _) = get_path(build_router(state(), RouteSet::WebSocket), "/health").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_only_router_has_no_websocket_route() {
        let (status, _) = get_path(build_router(state(), RouteSet::Http), "/ws").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_ws_route_rejects_plain_get() {
        // A GET without upgrade headers cannot become a WebSocket.
        let (status, _) = get_path(build_router(state(), RouteSet::All), "/ws").await;
        assert!(status.is_client_error());
    }
}
