//! Websocket transport: connect, pump JSON frames, reconnect with backoff.
//!
//! The session never sees the socket. It sees `TransportEvent`s and writes
//! `ClientMessage`s into a channel; this task owns the actual connection
//! and retries it for as long as it is alive. Dropped connections surface
//! upstream only as a Down event.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use crate::config::CollabConfig;
use crate::protocol::{ClientMessage, ServerMessage};

const INITIAL_BACKOFF: Duration = Duration::from_millis(250);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// What the transport reports upward
#[derive(Debug)]
pub enum TransportEvent {
    /// Socket established; a Welcome follows on the message stream
    Up,
    Message(ServerMessage),
    /// Socket lost; reconnection is already underway
    Down,
}

/// The session side of a running transport
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::UnboundedSender<ClientMessage>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Spawn the transport task for a room
pub fn spawn(config: CollabConfig) -> (TransportLink, JoinHandle<()>) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(config, outbound_rx, inbound_tx));
    (
        TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        },
        task,
    )
}

async fn run(
    config: CollabConfig,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    let url = config.ws_url();
    let mut backoff = INITIAL_BACKOFF;
    loop {
        match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((socket, _)) => {
                backoff = INITIAL_BACKOFF;
                if inbound.send(TransportEvent::Up).is_err() {
                    return;
                }
                let (mut sink, mut source) = socket.split();
                loop {
                    tokio::select! {
                        msg = outbound.recv() => match msg {
                            Some(msg) => {
                                let text = match serde_json::to_string(&msg) {
                                    Ok(text) => text,
                                    Err(e) => {
                                        tracing::error!(error = %e, "failed to encode message");
                                        continue;
                                    }
                                };
                                if sink.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            // Session gone: close politely and stop retrying
                            None => {
                                let _ = sink.send(Message::Close(None)).await;
                                return;
                            }
                        },
                        frame = source.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        if inbound.send(TransportEvent::Message(msg)).is_err() {
                                            return;
                                        }
                                    }
                                    Err(e) => {
                                        tracing::warn!(error = %e, "unparseable server frame")
                                    }
                                }
                            }
                            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                            Some(Ok(_)) => {} // ping/pong/binary
                        },
                    }
                }
                if inbound.send(TransportEvent::Down).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, url = %url, "connect attempt failed");
                if inbound.send(TransportEvent::Down).is_err() {
                    return;
                }
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
