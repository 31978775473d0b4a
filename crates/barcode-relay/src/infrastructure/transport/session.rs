//! One WebSocket session from upgrade to deregistration.
//!
//! The session task owns the socket.  It waits on four things at once:
//!
//! | Source            | Action                                              |
//! |-------------------|-----------------------------------------------------|
//! | shutdown token    | send Close (1001 "going away") and stop             |
//! | outbound queue    | encode the event and send it as a text frame        |
//! | socket            | decode text frames and hand them to the relay       |
//! | ping timer        | close if idle too long, otherwise send a Ping       |
//!
//! Whatever ends the loop, the connection is removed from the registry
//! before the task returns.  A broken connection is never retried; the page
//! reconnects on its own.

use std::net::SocketAddr;

use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use barcode_core::{decode_client_frame, encode_server_frame, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::application::OUTBOUND_QUEUE_CAPACITY;
use crate::infrastructure::transport::routes::AppState;

/// Runs the session for an upgraded socket until either side closes it.
pub async fn run_session(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let AppState {
        relay,
        timing,
        shutdown,
        ..
    } = state;

    let (outbound, mut queued) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let id = relay.connect(Some(peer), outbound).await;
    let (mut sink, mut stream) = socket.split();

    let mut ping = interval(timing.ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ping.tick().await;
    let mut last_seen = Instant::now();

    let reason = loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = sink.send(close_message(close_code::AWAY, "server shutting down")).await;
                break "server shutting down";
            }

            event = queued.recv() => {
                let Some(event) = event else {
                    break "removed from registry";
                };
                let frame = match encode_server_frame(&event) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!(connection = %id, event = event.name(), "encode failed: {e}");
                        continue;
                    }
                };
                if sink.send(Message::Text(frame.into())).await.is_err() {
                    break "send failed";
                }
            }

            inbound = stream.next() => {
                let message = match inbound {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        debug!(connection = %id, "WebSocket read error: {e}");
                        break "read failed";
                    }
                    None => break "peer closed",
                };
                last_seen = Instant::now();

                match message {
                    Message::Text(text) => match decode_client_frame(text.as_str()) {
                        Ok(event) => relay.handle_frame(id, event).await,
                        Err(e) => relay.handle_malformed(id, &e).await,
                    },
                    Message::Binary(_) => {
                        let e = ProtocolError::Malformed("binary frames are not supported".to_string());
                        relay.handle_malformed(id, &e).await;
                    }
                    // Pongs to client pings are queued by the socket itself.
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => break "peer closed",
                }
            }

            _ = ping.tick() => {
                if last_seen.elapsed() > timing.idle_timeout {
                    let _ = sink.send(close_message(close_code::POLICY, "idle timeout")).await;
                    break "idle timeout";
                }
                if sink.send(Message::Ping(Default::default())).await.is_err() {
                    break "send failed";
                }
            }
        }
    };

    relay.disconnect(id).await;
    info!(connection = %id, %peer, reason, "session ended");
}

fn close_message(code: u16, reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }))
}
