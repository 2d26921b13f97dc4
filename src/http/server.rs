//! axum binding for the state endpoints and the listener loop.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::info;

use super::{ErrorResponse, GetStateResponse, SaveResponse, SnapshotListResponse, StateQuery};
use crate::config::Config;
use crate::errors::StoreError;
use crate::storage::SnapshotStore;

pub type SharedStore = Arc<SnapshotStore>;

/// Build the router over a shared store.
pub fn router(store: SharedStore, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state/:user", get(get_state).post(post_state))
        .route("/state/:user/snapshots", get(list_snapshots))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(store)
}

/// Open the store, bind the listener and serve until Ctrl-C.
pub async fn serve(config: &Config) -> Result<()> {
    let mut config = config.clone();
    config.reconcile();
    let store = SnapshotStore::new(config.storage.clone())
        .await
        .map_err(|e| anyhow!("Failed to open data directory {}: {}", config.storage.data_dir.display(), e))?;
    let app = router(Arc::new(store), config.server.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| anyhow!("Failed to bind {}: {}", config.server.bind, e))?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}

/// Write-path storage failure rendered as `{ok:false, error}`: `413` for a
/// snapshot over the size limit, `500` for everything else.
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            StoreError::SnapshotTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = ErrorResponse { ok: false, error: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn get_state(
    State(store): State<SharedStore>,
    Path(user): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<GetStateResponse> {
    let query = StateQuery::from_params(&params);
    Json(super::get_state(&store, &user, query).await)
}

async fn list_snapshots(
    State(store): State<SharedStore>,
    Path(user): Path<String>,
) -> Json<SnapshotListResponse> {
    Json(super::list_snapshots(&store, &user).await)
}

async fn post_state(
    State(store): State<SharedStore>,
    Path(user): Path<String>,
    body: Bytes,
) -> Result<Json<SaveResponse>, ApiError> {
    Ok(Json(super::post_state(&store, &user, &body).await?))
}
