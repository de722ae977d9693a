use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::agent::AgentRegistry;
use crate::session::{DisconnectReason, Session};
use crate::tool::ToolDispatcher;
use crate::upstream::UpstreamClient;

use super::compose::{handle_client_frame, handle_upstream_frame};

/// More than this many consecutive unparseable client frames ends the
/// session with an internal error rather than looping forever.
const MAX_CONSECUTIVE_PARSE_FAILURES: u32 = 3;

/// Relays frames between one browser client and one upstream connection for
/// the lifetime of a session, applying the interceptions documented for
/// each direction. Two cooperative tasks own the client-read half and the
/// upstream-read half respectively; both sides of `upstream` are shared
/// behind a mutex since either task may need to write to it (the client
/// task to forward a frame, the upstream task to send a tool result).
/// `broadcast_rx` carries frames queued by `SessionManager::broadcast_to_subject`
/// for delivery to this client.
pub async fn run(
    client_ws: WebSocket,
    upstream: UpstreamClient,
    session: Arc<Mutex<Session>>,
    registry: Arc<AgentRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    broadcast_rx: UnboundedReceiver<Value>,
) -> DisconnectReason {
    let (client_tx, client_rx) = client_ws.split();
    let upstream = Arc::new(Mutex::new(upstream));

    let mut client_to_upstream = tokio::spawn(run_client_to_upstream(
        client_rx,
        upstream.clone(),
        session.clone(),
        registry,
    ));
    let mut upstream_to_client = tokio::spawn(run_upstream_to_client(
        client_tx,
        upstream,
        session,
        dispatcher,
        broadcast_rx,
    ));

    let reason = tokio::select! {
        r = &mut client_to_upstream => { upstream_to_client.abort(); r.unwrap_or(DisconnectReason::InternalError) },
        r = &mut upstream_to_client => { client_to_upstream.abort(); r.unwrap_or(DisconnectReason::InternalError) },
    };
    reason
}

async fn run_client_to_upstream(
    mut client_rx: futures::stream::SplitStream<WebSocket>,
    upstream: Arc<Mutex<UpstreamClient>>,
    session: Arc<Mutex<Session>>,
    registry: Arc<AgentRegistry>,
) -> DisconnectReason {
    let mut consecutive_failures = 0u32;
    loop {
        match client_rx.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str(&text) {
                Ok(frame) => {
                    consecutive_failures = 0;
                    let out = {
                        let mut guard = session.lock().await;
                        handle_client_frame(frame, &mut guard, &registry)
                    };
                    if upstream.lock().await.send(&out).await.is_err() {
                        return DisconnectReason::InternalError;
                    }
                },
                Err(e) => {
                    consecutive_failures += 1;
                    let err = crate::error::GatewayError::ProtocolViolation(e.to_string());
                    tracing::warn!(target: "bridge", error = %err, consecutive_failures, "dropping unparseable client frame");
                    if consecutive_failures > MAX_CONSECUTIVE_PARSE_FAILURES {
                        return DisconnectReason::InternalError;
                    }
                },
            },
            Some(Ok(Message::Close(_))) | None => return DisconnectReason::ClientClosed,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                tracing::warn!(target: "bridge", error = %e, "client socket error");
                return DisconnectReason::InternalError;
            },
        }
    }
}

async fn run_upstream_to_client(
    mut client_tx: futures::stream::SplitSink<WebSocket, Message>,
    upstream: Arc<Mutex<UpstreamClient>>,
    session: Arc<Mutex<Session>>,
    dispatcher: Arc<ToolDispatcher>,
    mut broadcast_rx: UnboundedReceiver<Value>,
) -> DisconnectReason {
    loop {
        tokio::select! {
            frame = async { upstream.lock().await.recv().await } => {
                match frame {
                    Ok(Some(value)) => {
                        let outgoing = {
                            let mut guard = session.lock().await;
                            handle_upstream_frame(&value, &mut guard, &dispatcher).await
                        };
                        for out in outgoing {
                            if upstream.lock().await.send(&out).await.is_err() {
                                return DisconnectReason::InternalError;
                            }
                        }
                        let text = value.to_string();
                        if client_tx.send(Message::Text(text.into())).await.is_err() {
                            return DisconnectReason::InternalError;
                        }
                    },
                    Ok(None) => return DisconnectReason::UpstreamClosed,
                    Err(e) => {
                        tracing::warn!(target: "bridge", error = %e, "upstream socket error");
                        return DisconnectReason::InternalError;
                    },
                }
            },
            broadcast = broadcast_rx.recv() => {
                match broadcast {
                    Some(value) => {
                        if client_tx.send(Message::Text(value.to_string().into())).await.is_err() {
                            return DisconnectReason::InternalError;
                        }
                    },
                    None => continue,
                }
            },
        }
    }
}
