use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::range::RangeNotSatisfiable;

/// Failures reported by an [`ObjectStore`](crate::upstream::ObjectStore)
/// before any body bytes have been produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("file {0} not found upstream")]
    NotFound(String),
    #[error("upstream capability lacks read access to {0}")]
    Unauthorized(String),
    /// Network failures, rate limits and upstream 5xx. Retrying is left to
    /// the caller.
    #[error("upstream request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transient(err.to_string())
    }
}

/// Errors raised while negotiating a response, i.e. before headers are
/// committed. Everything here still becomes a clean HTTP error response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("range not satisfiable for a {size} byte file")]
    MalformedRange { size: u64 },
    #[error("metadata fetch timed out after {0:?}")]
    MetadataTimeout(Duration),
    #[error("upstream sent partial content without a usable Content-Range")]
    MissingContentRange,
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(UpstreamError::NotFound(_)) => StatusCode::NOT_FOUND,
            ProxyError::Upstream(UpstreamError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            ProxyError::MalformedRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            ProxyError::Upstream(UpstreamError::Transient(_))
            | ProxyError::MetadataTimeout(_)
            | ProxyError::MissingContentRange => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Status-only rendering used for HEAD, which never carries a body.
    pub fn into_head_response(self) -> Response {
        match self {
            ProxyError::MalformedRange { size } => RangeNotSatisfiable::for_size(size).into_response(),
            err => err.status_code().into_response(),
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            ProxyError::MalformedRange { size } => RangeNotSatisfiable::for_size(size).into_response(),
            ProxyError::Upstream(UpstreamError::NotFound(_)) => (status, "File not found").into_response(),
            ProxyError::Upstream(UpstreamError::Unauthorized(_)) => (status, "Access denied").into_response(),
            _ => (status, "Error fetching file").into_response(),
        }
    }
}
