//! HTTP chat transport: sessions are created explicitly, messages are answered as an
//! SSE stream of `context`, `token`, then `done` or `error` events.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use docqa_core::{on_message, ChatEvent, SessionRegistry};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 64;
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct AppState {
    registry: Arc<SessionRegistry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionStarted {
    pub session_id: Uuid,
    pub author: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn router(registry: Arc<SessionRegistry>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", delete(end_session))
        .route("/sessions/{id}/messages", post(send_message))
        .with_state(AppState { registry })
}

pub async fn serve(bind: &str, registry: Arc<SessionRegistry>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(address = %listener.local_addr()?, "chat server listening");
    let sweeper = tokio::spawn(sweep_idle_sessions(Arc::clone(&registry)));
    let served = axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served?;
    info!("chat server stopped");
    Ok(())
}

/// Expires sessions whose clients went away without ending them.
async fn sweep_idle_sessions(registry: Arc<SessionRegistry>) {
    let period = (registry.idle_timeout() / 2).max(MIN_SWEEP_INTERVAL);
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticks.tick().await;
        registry.prune_idle().await;
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn start_session(State(state): State<AppState>) -> (StatusCode, Json<SessionStarted>) {
    let session = state.registry.on_chat_start().await;
    (
        StatusCode::CREATED,
        Json(SessionStarted {
            session_id: session.id,
            author: session.author.clone(),
            started_at: session.started_at,
        }),
    )
}

async fn end_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if state.registry.end(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(id))
    }
}

/// Answers one message. Generation runs in its own task and stops once the client
/// disconnects and the channel closes.
async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<MessageRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session = state
        .registry
        .get(&id)
        .await
        .ok_or_else(|| session_not_found(id))?;

    let (tx, rx) = mpsc::channel::<ChatEvent>(EVENT_BUFFER);
    tokio::spawn(async move {
        let mut events = Box::pin(on_message(session, request.content));
        while let Some(event) = events.next().await {
            if tx.send(event).await.is_err() {
                debug!(session = %id, "client disconnected, abandoning generation");
                break;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| Ok(sse_event(&event)));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_event(event: &ChatEvent) -> Event {
    let name = match event {
        ChatEvent::Context { .. } => "context",
        ChatEvent::Token { .. } => "token",
        ChatEvent::Done { .. } => "done",
        ChatEvent::Error { .. } => "error",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|error| error_data(&error));
    Event::default().event(name).data(data)
}

fn error_data(error: &dyn std::fmt::Display) -> String {
    serde_json::json!({ "type": "error", "error": error.to_string() }).to_string()
}

fn session_not_found(id: Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("session not found: {id}"),
        }),
    )
}
