use std::sync::Arc;

use axum::Json;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Router, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::agent::AgentRegistry;
use crate::config::GatewayConfig;
use crate::credential::CredentialProvider;
use crate::logger::ConversationLogger;
use crate::manager::SessionManager;
use crate::session::DisconnectReason;
use crate::tool::ToolDispatcher;
use crate::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub registry: Arc<AgentRegistry>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub manager: Arc<SessionManager>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub logger: Arc<ConversationLogger>,
}

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_origins);

    Router::new()
        .route("/realtime", get(realtime_handler))
        .route("/health", get(health_handler))
        .route("/sessions/stats", get(stats_handler))
        .route("/sessions/{subject}/broadcast", post(broadcast_handler))
        .layer(cors)
        .with_state(state)
}

/// Fails closed: with no configured origins, CORS allows nothing rather
/// than defaulting to permissive.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new();
    }
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods([http_method("GET"), http_method("POST")])
}

fn http_method(m: &str) -> axum::http::Method {
    m.parse().expect("static method literal is valid")
}

#[derive(Debug, Deserialize)]
pub struct RealtimeQuery {
    pub customer_id: Option<String>,
}

async fn realtime_handler(
    State(state): State<AppState>,
    Query(query): Query<RealtimeQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.customer_id))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, subject_id: Option<String>) {
    if socket
        .send(Message::Text(json!({"type": "connection.established"}).to_string().into()))
        .await
        .is_err()
    {
        return;
    }

    if let Some(subject_id) = &subject_id {
        let subject_for_log = subject_id.clone();
        state
            .manager
            .ensure_initialized(subject_id, async move {
                tracing::debug!(target: "http", subject_id = %subject_for_log, "initializing subject");
            })
            .await;
    }

    let (session, broadcast_rx) = state.manager.accept(subject_id).await;
    let session_id = session.lock().await.id.clone();

    let upstream = match UpstreamClient::connect(&state.config, state.credentials.as_ref()).await {
        Ok(upstream) => upstream,
        Err(e) => {
            tracing::error!(target: "http", error = %e, "upstream handshake failed");
            let _ = state.manager.teardown(&session_id, DisconnectReason::AuthFailed, false).await;
            return;
        },
    };

    let reason = crate::bridge::run(
        socket,
        upstream,
        session.clone(),
        state.registry.clone(),
        state.dispatcher.clone(),
        broadcast_rx,
    )
    .await;
    let graceful = matches!(reason, DisconnectReason::ClientClosed | DisconnectReason::Completed);
    if let Some(final_session) = state.manager.teardown(&session_id, reason, graceful).await {
        state.logger.log(&final_session).await;
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::to_value(state.manager.stats().await).unwrap_or(Value::Null))
}

async fn broadcast_handler(
    State(state): State<AppState>,
    Path(subject): Path<String>,
    Json(message): Json<Value>,
) -> impl IntoResponse {
    let delivered = state.manager.broadcast_to_subject(&subject, message).await;
    (StatusCode::OK, Json(json!({"delivered": delivered})))
}
