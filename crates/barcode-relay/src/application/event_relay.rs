//! EventRelay: the per-connection protocol state machine.
//!
//! The transport hands every decoded frame to [`EventRelay::handle_frame`]
//! together with the id of the connection it came from.  The relay answers
//! through that connection's outbound queue and, for scan reports, pushes a
//! `scanBroadcast` into every registered consumer's queue.
//!
//! # Connection states
//!
//! ```text
//! Unclassified ──declare(scanner)──►  Scanner
//!      │
//!      └──────declare(consumer)──►  Consumer
//! ```
//!
//! Both classified states are terminal; the connection leaves the table only
//! when the transport reports it closed.
//!
//! # Scan handling order
//!
//! 1. Validate (sender is a scanner, payload non-empty).
//! 2. Increment the scan counter.
//! 3. Inject keystrokes, bounded by `inject_timeout`, subject to the policy.
//!    Injections from all connections share one [`InjectionLane`], so
//!    concurrent scans are typed one after another.
//! 4. Fan out to the consumer snapshot with non-blocking sends.
//! 5. Acknowledge to the scanner with the number of consumers reached.
//!
//! Fan-out never awaits, so a scan is either fully fanned out or, if the task
//! is dropped before step 4, not fanned out at all.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use barcode_core::protocol::{
    AckStatus, ClientEvent, Connected, DeclareAck, Declaration, ErrorBody, HeartbeatAck,
    ScanAck, ScanBroadcast, ScanReport, ServerEvent, StatusReply, PROTOCOL_VERSION,
};
use barcode_core::{ConsumerSummary, ProtocolError, Role, ServerStats};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::application::inject_input::{InjectionLane, InputInjector};
use crate::application::session_registry::{Outbound, RegistryError, SessionRegistry};
use crate::domain::{ConnectionId, ConnectionMeta, InjectPolicy, ScanEvent};

/// Per-event failures.  None of these is fatal to the relay.
#[derive(Debug, Error, PartialEq)]
pub enum RelayError {
    #[error("barcode empty")]
    EmptyPayload,

    /// Scan reports are only accepted from scanner connections.
    #[error("not a scanner")]
    NotAScanner(Role),

    /// One consumer's queue refused a broadcast.
    #[error("send to consumer {id} failed: {reason}")]
    ConsumerSendFailed { id: ConnectionId, reason: String },
}

/// The relay state machine shared by every connection task.
pub struct EventRelay {
    registry: Arc<SessionRegistry>,
    injection: InjectionLane,
    policy: InjectPolicy,
    inject_timeout: Duration,
    scan_count: AtomicU64,
    started_at: DateTime<Utc>,
}

impl EventRelay {
    pub fn new(
        registry: Arc<SessionRegistry>,
        injector: Arc<dyn InputInjector>,
        policy: InjectPolicy,
        inject_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            injection: InjectionLane::new(injector),
            policy,
            inject_timeout,
            scan_count: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Accepted scans since startup.
    pub fn scan_count(&self) -> u64 {
        self.scan_count.load(Ordering::Relaxed)
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Registers a new connection and queues its `connected` greeting.
    pub async fn connect(&self, remote_addr: Option<SocketAddr>, outbound: Outbound) -> ConnectionId {
        let id = ConnectionId::new();
        let meta = ConnectionMeta::accepted(id, remote_addr);
        let greeting = ServerEvent::Connected(Connected {
            connection_id: id.as_uuid(),
            server_time: Utc::now(),
            protocol_version: PROTOCOL_VERSION,
        });
        self.registry.insert(meta, outbound.clone()).await;
        deliver(id, &outbound, greeting);
        info!(
            connection = %id,
            remote = ?remote_addr,
            "connection accepted"
        );
        id
    }

    /// Removes a closed connection.  Safe to call more than once.
    pub async fn disconnect(&self, id: ConnectionId) {
        if let Some(meta) = self.registry.deregister(id).await {
            info!(
                connection = %id,
                role = %meta.role,
                platform = meta.platform(),
                "connection closed"
            );
        }
    }

    // ── Inbound frames ────────────────────────────────────────────────────────

    /// Processes one decoded frame from connection `id`.
    ///
    /// Frames from the same connection must be handled one at a time; the
    /// transport guarantees this by awaiting each call before reading on.
    pub async fn handle_frame(&self, id: ConnectionId, event: ClientEvent) {
        debug!(connection = %id, event = event.name(), "frame received");
        let reply = match event {
            ClientEvent::Declare(declaration) => self.on_declare(id, &declaration).await,
            ClientEvent::ScanReport(report) => self.on_scan_report(id, report).await,
            ClientEvent::Heartbeat => ServerEvent::HeartbeatAck(HeartbeatAck {
                server_time: Utc::now(),
            }),
            ClientEvent::StatusQuery => ServerEvent::StatusReply(StatusReply {
                stats: self.stats().await,
                consumers: self.consumer_roster().await,
            }),
        };
        self.reply(id, reply).await;
    }

    /// Answers a frame that could not be decoded.  The connection stays open.
    pub async fn handle_malformed(&self, id: ConnectionId, error: &ProtocolError) {
        warn!(connection = %id, "rejected inbound frame: {error}");
        self.reply(
            id,
            ServerEvent::Error(ErrorBody {
                message: error.to_string(),
            }),
        )
        .await;
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Current statistics, derived from the registry and the scan counter.
    pub async fn stats(&self) -> ServerStats {
        let counts = self.registry.counts().await;
        ServerStats::new(
            counts.scanners,
            counts.consumers,
            counts.unclassified,
            self.scan_count(),
            self.started_at,
            Utc::now(),
        )
    }

    pub async fn consumer_roster(&self) -> Vec<ConsumerSummary> {
        self.registry.consumer_roster().await
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    async fn on_declare(&self, id: ConnectionId, declaration: &Declaration) -> ServerEvent {
        match self.registry.register(id, declaration).await {
            Ok(role) => {
                let counts = self.registry.counts().await;
                info!(
                    connection = %id,
                    role = %role,
                    platform = %declaration.platform,
                    version = %declaration.version,
                    consumers = counts.consumers,
                    scanners = counts.scanners,
                    "connection classified"
                );
                ServerEvent::DeclareAck(DeclareAck {
                    status: AckStatus::Ok,
                    role,
                    consumer_count: Some(counts.consumers),
                    scanner_count: (role == Role::Consumer).then_some(counts.scanners),
                    message: None,
                })
            }
            Err(error) => {
                warn!(connection = %id, "declaration rejected: {error}");
                let role = match &error {
                    RegistryError::AlreadyClassified(current) => *current,
                    _ => Role::Unclassified,
                };
                ServerEvent::DeclareAck(DeclareAck {
                    status: AckStatus::Error,
                    role,
                    consumer_count: None,
                    scanner_count: None,
                    message: Some(error.to_string()),
                })
            }
        }
    }

    async fn on_scan_report(&self, id: ConnectionId, report: ScanReport) -> ServerEvent {
        let payload = report.payload.clone();
        match self.accept_scan(id, report).await {
            Ok(reached) => ServerEvent::ScanAck(ScanAck {
                status: AckStatus::Ok,
                payload,
                consumers_reached: Some(reached),
                message: None,
            }),
            Err(error) => {
                warn!(connection = %id, "scan rejected: {error}");
                ServerEvent::ScanAck(ScanAck {
                    status: AckStatus::Error,
                    payload,
                    consumers_reached: None,
                    message: Some(error.to_string()),
                })
            }
        }
    }

    /// Validates, counts, injects, and fans out one scan report.
    ///
    /// Returns the number of consumers whose queue accepted the broadcast.
    async fn accept_scan(&self, id: ConnectionId, report: ScanReport) -> Result<usize, RelayError> {
        let meta = self
            .registry
            .meta(id)
            .await
            .ok_or(RelayError::NotAScanner(Role::Unclassified))?;
        if meta.role != Role::Scanner {
            return Err(RelayError::NotAScanner(meta.role));
        }
        let scan = ScanEvent::from_report(id, report, Utc::now()).ok_or(RelayError::EmptyPayload)?;

        let total = self.scan_count.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            connection = %id,
            platform = meta.platform(),
            payload = %scan.payload,
            total,
            "scan received"
        );

        let consumers = self.registry.consumers().await;
        if self.should_inject(consumers.len()) {
            match self
                .injection
                .inject_with_timeout(scan.payload.clone(), self.inject_timeout)
                .await
            {
                Ok(()) => debug!(connection = %id, "scan typed into focused window"),
                Err(error) => warn!(connection = %id, "input injection skipped: {error}"),
            }
        }

        let broadcast = ServerEvent::ScanBroadcast(ScanBroadcast {
            payload: scan.payload,
            timestamp: scan.reported_at,
            source_platform: meta.platform().to_string(),
            format: scan.format,
        });
        Ok(fan_out(&consumers, &broadcast))
    }

    fn should_inject(&self, consumer_count: usize) -> bool {
        match self.policy {
            InjectPolicy::Always => true,
            InjectPolicy::Fallback => consumer_count == 0,
            InjectPolicy::Off => false,
        }
    }

    async fn reply(&self, id: ConnectionId, event: ServerEvent) {
        match self.registry.outbound(id).await {
            Some(outbound) => deliver(id, &outbound, event),
            None => debug!(connection = %id, event = event.name(), "reply dropped; connection gone"),
        }
    }
}

/// Enqueues `event` on every consumer in the snapshot.
///
/// Returns how many queues accepted it.  Failures are logged and skipped.
fn fan_out(consumers: &[(ConnectionId, Outbound)], event: &ServerEvent) -> usize {
    let mut reached = 0;
    for (id, outbound) in consumers {
        match try_enqueue(*id, outbound, event.clone()) {
            Ok(()) => reached += 1,
            Err(error) => warn!("{error}"),
        }
    }
    debug!(reached, total = consumers.len(), "broadcast fanned out");
    reached
}

fn try_enqueue(id: ConnectionId, outbound: &Outbound, event: ServerEvent) -> Result<(), RelayError> {
    outbound.try_send(event).map_err(|error| RelayError::ConsumerSendFailed {
        id,
        reason: match error {
            TrySendError::Full(_) => "outbound queue full".to_string(),
            TrySendError::Closed(_) => "connection closed".to_string(),
        },
    })
}

fn deliver(id: ConnectionId, outbound: &Outbound, event: ServerEvent) {
    let name = event.name();
    if let Err(error) = try_enqueue(id, outbound, event) {
        warn!(event = name, "{error}");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
