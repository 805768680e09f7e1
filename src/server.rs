//! HTTP server front door.
//!
//! Exposes the orchestration core over REST/SSE so a browser or Studio-
//! style client can drive it without a terminal:
//! - GET  /api/status          - health check
//! - POST /api/sessions        - create a session
//! - GET  /api/messages        - message history for a session
//! - POST /api/turn            - run a turn, stream events over SSE
//!
//! SSE is unidirectional, so the tool-permission handshake the REPL
//! resolves interactively has no counterpart here: turns started through
//! this server always pass `requests: None`, which the Tool Loop treats
//! as "no UI collaborator" and denies anything above `SAFE`.

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use ensemble::model::Session;
use ensemble::persistence::PersistenceStore;
use ensemble::turn::{Event, TurnExecutor};

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<TurnExecutor>,
    pub store: Arc<dyn PersistenceStore>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: Option<String>,
    pub project_root: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub session_id: Uuid,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RetryRequest {
    pub session_id: Uuid,
    pub participant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub session_id: Uuid,
    pub limit: Option<usize>,
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/sessions", post(create_session_handler))
        .route("/api/messages", get(messages_handler))
        .route("/api/turn", post(turn_handler))
        .route("/api/retry", post(retry_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run(port: u16, executor: Arc<TurnExecutor>, store: Arc<dyn PersistenceStore>) -> Result<()> {
    let state = AppState { executor, store };
    let app = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn status_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Session>, (StatusCode, String)> {
    state
        .store
        .create_session(request.name, request.project_root)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn messages_handler(
    State(state): State<AppState>,
    Query(params): Query<MessagesQuery>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let messages = state
        .store
        .load_messages(params.session_id, None, params.limit)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!(messages)))
}

async fn turn_handler(
    State(state): State<AppState>,
    Json(request): Json<TurnRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(100);

    tokio::spawn(async move {
        let executor = state.executor;
        if let Err(e) = executor.run_turn(request.session_id, &request.message, tx.clone(), None).await {
            let _ = tx
                .send(Event::Error {
                    participant: None,
                    kind: ensemble::turn::ErrorKind::Fatal,
                    message: e.to_string(),
                    recoverable: false,
                })
                .await;
        }
    });

    Sse::new(event_stream(rx)).keep_alive(KeepAlive::default())
}

async fn retry_handler(
    State(state): State<AppState>,
    Json(request): Json<RetryRequest>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Event>(100);

    tokio::spawn(async move {
        let executor = state.executor;
        if let Err(e) = executor
            .retry_speaker(request.session_id, &request.participant_id, tx.clone(), None)
            .await
        {
            let _ = tx
                .send(Event::Error {
                    participant: None,
                    kind: ensemble::turn::ErrorKind::Fatal,
                    message: e.to_string(),
                    recoverable: false,
                })
                .await;
        }
    });

    Sse::new(event_stream(rx)).keep_alive(KeepAlive::default())
}

fn event_stream(rx: mpsc::Receiver<Event>) -> impl Stream<Item = Result<SseEvent, Infallible>> {
    async_stream::stream! {
        let mut rx = rx;
        while let Some(event) = rx.recv().await {
            let data = serde_json::to_string(&event).unwrap_or_default();
            yield Ok(SseEvent::default().data(data));
        }
    }
}
