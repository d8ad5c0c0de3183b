//! The HTTP surface of a hub.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use mergehub::api::{CreatedResponse, ErrorBody, HeadsResponse};
use mergehub::core::StoreId;
use mergehub::store::{SnapshotStore, StoreError};
use mergehub::sync::{run_duplex, SyncError, SyncRequest};
use mergehub::{Hub, HubError, SessionTracker, ShutdownSignal};
use tower_http::trace::TraceLayer;

use crate::socket;

/// Shared state of every handler.
pub struct AppState<S> {
    pub hub: Arc<Hub<S>>,
    /// Ends open duplex sessions at shutdown.
    pub shutdown: ShutdownSignal,
    /// Duplex sessions still running; shutdown waits for them.
    pub sessions: SessionTracker,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            hub: Arc::clone(&self.hub),
            shutdown: self.shutdown.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

/// Build the router.
pub fn router<S: SnapshotStore + 'static>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/stores/{store}", post(create_store::<S>))
        .route("/stores/{store}/latest", get(latest::<S>))
        .route("/stores/{store}/heads", get(heads::<S>))
        .route("/stores/{store}/sync", get(sync_stream::<S>).post(sync_round::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Error response of every handler.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Hub(HubError),
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        Self::Hub(err)
    }
}

fn store_error_status(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Hub(err) => match err {
                HubError::NotFound(_) => StatusCode::NOT_FOUND,
                HubError::AlreadyExists(_) => StatusCode::CONFLICT,
                HubError::Replica(_) => StatusCode::BAD_REQUEST,
                HubError::Store(err) => store_error_status(err),
                HubError::Sync(err) if err.is_caller_error() => StatusCode::BAD_REQUEST,
                HubError::Sync(SyncError::NotFound(_)) => StatusCode::NOT_FOUND,
                HubError::Sync(SyncError::Store(err)) => store_error_status(err),
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::BadRequest(msg) => msg.clone(),
            Self::Hub(err) => err.to_string(),
        };
        if status.is_server_error() {
            tracing::error!(%status, error = %error, "request failed");
        } else {
            tracing::debug!(%status, error = %error, "request rejected");
        }
        (status, Json(ErrorBody { error })).into_response()
    }
}

fn parse_store(raw: &str) -> Result<StoreId, AppError> {
    StoreId::new(raw).map_err(|e| AppError::BadRequest(e.to_string()))
}

async fn latest<S: SnapshotStore + 'static>(
    State(state): State<AppState<S>>,
    Path(store): Path<String>,
) -> Result<Response, AppError> {
    let store_id = parse_store(&store)?;
    let content = state.hub.fork(&store_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], content).into_response())
}

async fn heads<S: SnapshotStore + 'static>(
    State(state): State<AppState<S>>,
    Path(store): Path<String>,
) -> Result<Json<HeadsResponse>, AppError> {
    let store_id = parse_store(&store)?;
    let heads = state.hub.heads(&store_id).await?;
    Ok(Json(HeadsResponse {
        store: store_id,
        heads,
    }))
}

async fn create_store<S: SnapshotStore + 'static>(
    State(state): State<AppState<S>>,
    Path(store): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreatedResponse>), AppError> {
    let store_id = parse_store(&store)?;
    let content = (!body.is_empty()).then_some(&body[..]);
    let meta = state.hub.create(store_id, content).await?;
    tracing::info!(store = %meta.store_id, snapshot = %meta.id, size = meta.size, "store created");
    Ok((
        StatusCode::CREATED,
        Json(CreatedResponse {
            store: meta.store_id,
            snapshot: meta.id.as_i64(),
            size: meta.size,
        }),
    ))
}

async fn sync_round<S: SnapshotStore + 'static>(
    State(state): State<AppState<S>>,
    Path(store): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    let store_id = parse_store(&store)?;
    let request: SyncRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed sync request: {e}")))?;
    let response = state.hub.sync_round(&store_id, request).await?;
    Ok(Json(response).into_response())
}

async fn sync_stream<S: SnapshotStore + 'static>(
    State(state): State<AppState<S>>,
    Path(store): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let store_id = parse_store(&store)?;
    let handle = state.hub.get(&store_id).await?;
    let config = state.hub.config().duplex.clone();
    let shutdown = state.shutdown.clone();
    // Taken before the upgrade so a session can never start untracked.
    let guard = state.sessions.enter();

    Ok(upgrade.on_upgrade(move |ws| async move {
        let _guard = guard;
        tracing::info!(store = %store_id, "duplex session opened");
        let (mut sender, mut receiver) = socket::split(ws);
        match run_duplex(&handle, &mut sender, &mut receiver, &config, &shutdown).await {
            Ok(report) => tracing::info!(
                store = %store_id,
                sent = report.sent,
                received = report.received,
                end = ?report.end,
                "duplex session closed"
            ),
            Err(err) => tracing::warn!(store = %store_id, error = %err, "duplex session failed"),
        }
    }))
}
