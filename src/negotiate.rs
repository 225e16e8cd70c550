//! Decides the client-facing status and headers from the client's range,
//! the file size and what upstream actually delivered.

use axum::body::Body;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum_extra::headers::{AcceptRanges, ContentLength, ContentRange, HeaderMapExt};

use crate::error::ProxyError;
use crate::range::ByteRange;
use crate::upstream::{Delivered, FileDescriptor};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Status and headers of an outbound response. The body is attached
/// separately by [`Envelope::into_response`].
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub status: StatusCode,
    pub content_type: String,
    pub content_length: Option<u64>,
    pub content_range: Option<ContentRange>,
}

impl Envelope {
    /// `200` over the whole file. Also the answer to every HEAD request.
    pub fn full(file: &FileDescriptor) -> Self {
        Envelope {
            status: StatusCode::OK,
            content_type: file.mime_type.clone(),
            content_length: Some(file.size),
            content_range: None,
        }
    }

    fn partial(file: &FileDescriptor, range: ByteRange) -> Self {
        Envelope {
            status: StatusCode::PARTIAL_CONTENT,
            content_type: file.mime_type.clone(),
            content_length: Some(range.len()),
            content_range: Some(range.content_range(file.size)),
        }
    }

    /// Build the response. Headers are final from here on.
    pub fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        headers.typed_insert(AcceptRanges::bytes());
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_CONTENT_TYPE));
        headers.insert(CONTENT_TYPE, content_type);
        if let Some(length) = self.content_length {
            headers.typed_insert(ContentLength(length));
        }
        if let Some(content_range) = self.content_range {
            headers.typed_insert(content_range);
        }

        response
    }
}

/// Compute the envelope for a GET.
///
/// `requested` must already be resolved against `file.size`; unsatisfiable
/// ranges never reach this point.
pub fn negotiate(
    requested: Option<ByteRange>,
    file: &FileDescriptor,
    delivered: &Delivered,
    upstream_length: Option<u64>,
) -> Result<Envelope, ProxyError> {
    match (requested, delivered) {
        (None, Delivered::Full) => Ok(Envelope::full(file)),

        (Some(requested), Delivered::Partial { .. }) => {
            let actual = delivered.delivered_range().ok_or(ProxyError::MissingContentRange)?;
            if actual != requested {
                tracing::warn!(
                    file_id = %file.id,
                    %requested,
                    %actual,
                    "upstream delivered a different span than requested"
                );
            }
            if actual.end >= file.size {
                return Err(ProxyError::MissingContentRange);
            }
            Ok(Envelope::partial(file, actual))
        }

        // Upstream ignored the range and sent everything. A request from
        // byte 0 can be acknowledged as a 206 spanning the whole file.
        (Some(requested), Delivered::Full) if requested.start == 0 => match ByteRange::whole(file.size) {
            Some(whole) => {
                tracing::debug!(file_id = %file.id, %requested, "synthesizing 206 over full upstream body");
                Ok(Envelope::partial(file, whole))
            }
            None => Ok(Envelope::full(file)),
        },

        // Upstream cannot seek. Skipping ahead would mean buffering or a
        // second fetch, so the client gets the whole file from offset 0.
        (Some(requested), Delivered::Full) => {
            tracing::info!(
                file_id = %file.id,
                %requested,
                "upstream ignored non-zero range, sending full body"
            );
            Ok(Envelope::full(file))
        }

        (None, Delivered::Partial { content_range }) => {
            tracing::warn!(file_id = %file.id, "upstream sent partial content to an unranged request");
            let content_length = upstream_length.or_else(|| delivered.delivered_range().map(|r| r.len()));
            Ok(Envelope {
                status: StatusCode::PARTIAL_CONTENT,
                content_type: file.mime_type.clone(),
                content_length,
                content_range: Some(content_range.clone()),
            })
        }
    }
}
