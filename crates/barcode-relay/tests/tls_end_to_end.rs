//! Real sockets: TLS handshake, HTTP routes, WebSocket sessions, shutdown.
//!
//! The relay certificate is self-signed, so the test client accepts any
//! certificate.  Listeners bind to port 0 on loopback.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use barcode_core::protocol::{
    decode_server_frame, encode_client_frame, AckStatus, ClientEvent, Declaration, ScanReport,
    ServerEvent,
};
use barcode_relay::application::{EventRelay, SessionRegistry};
use barcode_relay::domain::{InjectPolicy, RelayConfig};
use barcode_relay::infrastructure::input_injection::RecordingInjector;
use barcode_relay::infrastructure::{CertProvisioner, RelayServer};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    aws_lc_rs, verify_tls12_signature, verify_tls13_signature, CryptoProvider,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{client_async, WebSocketStream};
use tokio_util::sync::CancellationToken;

const STEP_TIMEOUT: Duration = Duration::from_secs(10);

type Ws = WebSocketStream<TlsStream<TcpStream>>;

// ── TLS client ────────────────────────────────────────────────────────────────

/// Accepts the relay's self-signed certificate while still checking that
/// the handshake signatures are valid.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

fn connector() -> TlsConnector {
    let provider = Arc::new(aws_lc_rs::default_provider());
    let config = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

async fn tls_connect(addr: SocketAddr) -> TlsStream<TcpStream> {
    let tcp = TcpStream::connect(addr).await.unwrap();
    let name = ServerName::try_from("localhost").unwrap();
    connector().connect(name, tcp).await.unwrap()
}

// ── Relay fixture ─────────────────────────────────────────────────────────────

struct RunningRelay {
    addr: SocketAddr,
    ws_addr: SocketAddr,
    relay: Arc<EventRelay>,
    injector: Arc<RecordingInjector>,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_relay(cert_dir: &Path, dual_port: bool) -> RunningRelay {
    start_relay_with(cert_dir, dual_port, RecordingInjector::new()).await
}

async fn start_relay_with(cert_dir: &Path, dual_port: bool, injector: RecordingInjector) -> RunningRelay {
    let tls = CertProvisioner::new(cert_dir).ensure_certificate().unwrap();
    let config = RelayConfig {
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        relay_port: dual_port.then_some(0),
        shutdown_grace: Duration::from_secs(2),
        ..RelayConfig::default()
    };
    let injector = Arc::new(injector);
    let relay = Arc::new(EventRelay::new(
        Arc::new(SessionRegistry::new()),
        injector.clone(),
        InjectPolicy::Always,
        Duration::from_secs(2),
    ));

    let server = RelayServer::bind(config, relay.clone(), tls).await.unwrap();
    let addr = server.local_addr().unwrap();
    let ws_addr = server.relay_addr().unwrap();
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(server.run(shutdown.clone()));

    RunningRelay {
        addr,
        ws_addr,
        relay,
        injector,
        shutdown,
        handle,
    }
}

// ── Client helpers ────────────────────────────────────────────────────────────

async fn http_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = tls_connect(addr).await;
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    // The server may close without close_notify once the response is sent.
    let _ = tokio::time::timeout(STEP_TIMEOUT, stream.read_to_end(&mut response)).await;
    String::from_utf8_lossy(&response).into_owned()
}

async fn ws_connect(addr: SocketAddr) -> Ws {
    let stream = tls_connect(addr).await;
    let url = format!("wss://localhost:{}/ws", addr.port());
    let (mut ws, _) = client_async(url, stream).await.unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Connected(_)));
    ws
}

async fn send(ws: &mut Ws, event: ClientEvent) {
    let frame = encode_client_frame(&event).unwrap();
    ws.send(Message::Text(frame)).await.unwrap();
}

/// Next relay event, skipping control frames.
async fn next_event(ws: &mut Ws) -> ServerEvent {
    loop {
        let message = tokio::time::timeout(STEP_TIMEOUT, ws.next())
            .await
            .expect("relay answered in time")
            .expect("stream open")
            .expect("valid frame");
        match message {
            Message::Text(text) => return decode_server_frame(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

async fn declare(ws: &mut Ws, client_type: &str) {
    send(
        ws,
        ClientEvent::Declare(Declaration {
            client_type: client_type.to_string(),
            platform: "e2e".to_string(),
            version: "1".to_string(),
        }),
    )
    .await;
    match next_event(ws).await {
        ServerEvent::DeclareAck(ack) => assert_eq!(ack.status, AckStatus::Ok),
        other => panic!("expected declareAck, got {other:?}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_and_status_are_served_over_tls() {
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), false).await;

    let health = http_get(relay.addr, "/health").await;
    let status = http_get(relay.addr, "/api/status").await;

    assert!(health.starts_with("HTTP/1.1 200"), "{health}");
    assert!(health.ends_with("ok"), "{health}");
    assert!(status.contains("\"scanCount\":0"), "{status}");
    assert!(status.contains("\"running\":true"), "{status}");
    assert!(status.contains("\"ip\":\"127.0.0.1\""), "{status}");

    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn scan_travels_from_scanner_to_consumer() {
    // Arrange
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), false).await;
    let mut consumer = ws_connect(relay.ws_addr).await;
    declare(&mut consumer, "pc_client").await;
    let mut scanner = ws_connect(relay.ws_addr).await;
    declare(&mut scanner, "mobile").await;

    // Act
    send(
        &mut scanner,
        ClientEvent::ScanReport(ScanReport {
            payload: "ABC-999".to_string(),
            timestamp: None,
            format: Some("CODE_128".to_string()),
        }),
    )
    .await;

    // Assert
    match next_event(&mut scanner).await {
        ServerEvent::ScanAck(ack) => {
            assert_eq!(ack.status, AckStatus::Ok);
            assert_eq!(ack.consumers_reached, Some(1));
        }
        other => panic!("expected scanAck, got {other:?}"),
    }
    match next_event(&mut consumer).await {
        ServerEvent::ScanBroadcast(broadcast) => {
            assert_eq!(broadcast.payload, "ABC-999");
            assert_eq!(broadcast.format.as_deref(), Some("CODE_128"));
        }
        other => panic!("expected scanBroadcast, got {other:?}"),
    }
    assert_eq!(relay.injector.typed(), vec!["ABC-999"]);

    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn malformed_and_binary_frames_get_error_events() {
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), false).await;
    let mut ws = ws_connect(relay.ws_addr).await;

    ws.send(Message::Text("{oops".to_string())).await.unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Error(_)));
    ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert!(matches!(next_event(&mut ws).await, ServerEvent::Error(_)));

    // Still open afterwards.
    send(&mut ws, ClientEvent::Heartbeat).await;
    assert!(matches!(next_event(&mut ws).await, ServerEvent::HeartbeatAck(_)));

    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_socket_is_deregistered() {
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), false).await;
    let mut consumer = ws_connect(relay.ws_addr).await;
    declare(&mut consumer, "consumer").await;
    assert_eq!(relay.relay.stats().await.consumer_count, 1);

    consumer.close(None).await.unwrap();

    let mut remaining = 1;
    for _ in 0..50 {
        remaining = relay.relay.stats().await.total_connections;
        if remaining == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(remaining, 0);

    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_sessions_and_clears_registry() {
    // Arrange
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), false).await;
    let mut consumer = ws_connect(relay.ws_addr).await;
    declare(&mut consumer, "consumer").await;

    // Act
    relay.shutdown.cancel();

    // Assert: the client sees a Close frame, run() returns, nothing is left
    let close = loop {
        match tokio::time::timeout(STEP_TIMEOUT, consumer.next()).await.unwrap() {
            Some(Ok(Message::Close(frame))) => break frame,
            Some(Ok(_)) => continue,
            other => panic!("expected Close frame, got {other:?}"),
        }
    };
    assert_eq!(close.map(|f| u16::from(f.code)), Some(1001));
    relay.handle.await.unwrap().unwrap();
    assert!(relay.relay.registry().is_empty().await);
}

#[tokio::test]
async fn shutdown_waits_for_session_mid_scan() {
    // Arrange: typing the scan takes ~300 ms, well inside the 2 s grace period
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay_with(
        certs.path(),
        false,
        RecordingInjector::with_key_delay(Duration::from_millis(30)),
    )
    .await;
    let mut scanner = ws_connect(relay.ws_addr).await;
    declare(&mut scanner, "scanner").await;

    // Act: report a scan and shut down while it is still being typed
    send(
        &mut scanner,
        ClientEvent::ScanReport(ScanReport {
            payload: "ABCDEFGHIJ".to_string(),
            timestamp: None,
            format: None,
        }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();

    // Assert: run() returned only after the session finished its scan
    assert_eq!(relay.injector.typed(), vec!["ABCDEFGHIJ"]);
    assert_eq!(relay.relay.scan_count(), 1);
}

#[tokio::test]
async fn dual_port_mode_splits_routes() {
    let certs = tempfile::tempdir().unwrap();
    let relay = start_relay(certs.path(), true).await;
    assert_ne!(relay.addr, relay.ws_addr);

    let ws_on_primary = http_get(relay.addr, "/ws").await;
    let health_on_relay_port = http_get(relay.ws_addr, "/health").await;
    let mut scanner = ws_connect(relay.ws_addr).await;
    declare(&mut scanner, "scanner").await;

    assert!(ws_on_primary.starts_with("HTTP/1.1 404"), "{ws_on_primary}");
    assert!(health_on_relay_port.starts_with("HTTP/1.1 404"), "{health_on_relay_port}");
    let status = http_get(relay.addr, "/api/status").await;
    assert!(status.contains(&format!("\"relayPort\":{}", relay.ws_addr.port())), "{status}");

    relay.shutdown.cancel();
    relay.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn second_start_reuses_certificate_files() {
    // Arrange: first start generates
    let certs = tempfile::tempdir().unwrap();
    let first = CertProvisioner::new(certs.path());
    first.ensure_certificate().unwrap();
    assert!(first.certificate_info().generated());
    let cert_mtime = std::fs::metadata(first.cert_path()).unwrap().modified().unwrap();
    let key_mtime = std::fs::metadata(first.key_path()).unwrap().modified().unwrap();

    // Act: second start finds both files
    let second = CertProvisioner::new(certs.path());
    second.ensure_certificate().unwrap();

    // Assert
    assert!(!second.certificate_info().generated());
    assert_eq!(std::fs::metadata(second.cert_path()).unwrap().modified().unwrap(), cert_mtime);
    assert_eq!(std::fs::metadata(second.key_path()).unwrap().modified().unwrap(), key_mtime);
}
