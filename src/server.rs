use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::header::RANGE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::catalog::Catalog;
use crate::config::ProxyConfig;
use crate::error::{ProxyError, UpstreamError};
use crate::negotiate::{negotiate, Envelope};
use crate::range::RangeRequest;
use crate::stream::ProxyStream;
use crate::upstream::{FileDescriptor, ObjectStore};

/// Shared, read-only handles. Nothing here is mutated by a request.
#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn ObjectStore>,
    catalog: Catalog,
    config: ProxyConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn ObjectStore>, catalog: Catalog, config: ProxyConfig) -> Self {
        AppState { store, catalog, config }
    }

    async fn metadata(&self, file_id: &str) -> Result<FileDescriptor, ProxyError> {
        let timeout = self.config.metadata_timeout;
        match tokio::time::timeout(timeout, self.store.metadata(file_id)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProxyError::MetadataTimeout(timeout)),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/files/{file_id}", get(get_file).head(head_file))
        .route("/api/file/{file_id}", get(get_file).head(head_file))
        .route("/api/media", get(list_media))
        .with_state(state)
}

/// [`router`] plus static assets and request tracing.
pub fn app(state: AppState, static_dir: Option<&Path>) -> Router {
    let router = router(state);
    let router = match static_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };
    router.layer(TraceLayer::new_for_http())
}

/// Metadata only. HEAD never opens a stream and never answers 206.
async fn head_file(State(state): State<AppState>, UrlPath(file_id): UrlPath<String>) -> Response {
    match state.metadata(&file_id).await {
        Ok(file) => Envelope::full(&file).into_response(Body::empty()),
        Err(err) => {
            log_failure(&file_id, &err);
            err.into_head_response()
        }
    }
}

async fn get_file(
    State(state): State<AppState>,
    UrlPath(file_id): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    match stream_file(&state, &file_id, &headers).await {
        Ok(response) => response,
        Err(err) => {
            log_failure(&file_id, &err);
            err.into_response()
        }
    }
}

async fn stream_file(state: &AppState, file_id: &str, headers: &HeaderMap) -> Result<Response, ProxyError> {
    let range_header = headers.get(RANGE);
    tracing::info!(file_id, range = ?range_header, "stream request");

    let file = state.metadata(file_id).await?;

    // unparseable and unsatisfiable ranges both answer 416 without a body fetch
    let requested = range_header
        .map(|value| {
            RangeRequest::from_header(value)
                .ok()
                .and_then(|request| request.resolve(file.size).ok())
                .ok_or(ProxyError::MalformedRange { size: file.size })
        })
        .transpose()?;

    let delivery = state.store.open(file_id, requested).await?;
    let envelope = negotiate(requested, &file, &delivery.delivered, delivery.content_length)?;

    tracing::debug!(
        file_id,
        status = %envelope.status,
        content_length = ?envelope.content_length,
        "sending headers"
    );

    let body = ProxyStream::new(file_id, delivery.body, envelope.content_length);
    Ok(envelope.into_response(Body::new(body)))
}

fn log_failure(file_id: &str, err: &ProxyError) {
    match err {
        ProxyError::MalformedRange { .. } | ProxyError::Upstream(UpstreamError::NotFound(_)) => {
            tracing::info!(file_id, error = %err, "request rejected");
        }
        _ => tracing::error!(file_id, error = %err, "error fetching file content"),
    }
}

async fn list_media(State(state): State<AppState>) -> Response {
    tracing::info!(folders = ?state.catalog.folders(), "fetching media");
    match state.catalog.list().await {
        Ok(items) => Json(items).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "fatal error listing media");
            let body = Json(json!({ "error": "Failed to fetch media." }));
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
    }
}
