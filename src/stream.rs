use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use pin_project::{pin_project, pinned_drop};

use crate::upstream::ByteStream;

/// Response body piping an upstream byte stream to the client. Implements
/// [`Stream`], [`Body`], and [`IntoResponse`].
///
/// Hyper only polls a body when the connection can accept more data, and
/// each poll pulls at most one chunk from upstream, so memory stays bounded
/// by the upstream chunk size whatever the file size.
///
/// Once headers are out the declared length cannot change: surplus upstream
/// bytes are cut, and an upstream failure or early EOF becomes a body error,
/// which makes hyper abort the connection instead of finishing it cleanly.
/// Dropping the body drops the upstream stream and releases its connection.
#[pin_project(PinnedDrop)]
pub struct ProxyStream {
    file_id: String,
    upstream: ByteStream,
    /// Bytes still owed to the client, `None` when no length was committed.
    remaining: Option<u64>,
    sent: u64,
    state: StreamState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Finished,
    Failed,
}

impl ProxyStream {
    pub fn new(file_id: impl Into<String>, upstream: ByteStream, length: Option<u64>) -> Self {
        ProxyStream {
            file_id: file_id.into(),
            upstream,
            remaining: length,
            sent: 0,
            state: StreamState::Streaming,
        }
    }

    /// Bytes handed to hyper so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent
    }
}

impl IntoResponse for ProxyStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for ProxyStream {
    type Data = Bytes;
    type Error = io::Error;

    fn is_end_stream(&self) -> bool {
        self.state != StreamState::Streaming || self.remaining == Some(0)
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(remaining) => SizeHint::with_exact(remaining),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for ProxyStream {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.project();

        if *this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        if *this.remaining == Some(0) {
            *this.state = StreamState::Finished;
            return Poll::Ready(None);
        }

        loop {
            match this.upstream.as_mut().poll_next(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(chunk))) if chunk.is_empty() => continue,
                Poll::Ready(Some(Ok(mut chunk))) => {
                    if let Some(remaining) = this.remaining.as_mut() {
                        // the committed Content-Length is the hard limit
                        let len = chunk.len() as u64;
                        if len > *remaining {
                            tracing::warn!(
                                file_id = %this.file_id,
                                surplus = len - *remaining,
                                "upstream sent more than the declared length, truncating"
                            );
                            chunk.truncate(*remaining as usize);
                        }
                        *remaining -= chunk.len() as u64;
                    }
                    *this.sent += chunk.len() as u64;
                    return Poll::Ready(Some(Ok(chunk)));
                }
                Poll::Ready(Some(Err(err))) => {
                    tracing::error!(
                        file_id = %this.file_id,
                        sent = *this.sent,
                        error = %err,
                        "upstream failed mid-stream, aborting client connection"
                    );
                    *this.state = StreamState::Failed;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    return match *this.remaining {
                        Some(missing) if missing > 0 => {
                            tracing::error!(
                                file_id = %this.file_id,
                                sent = *this.sent,
                                missing,
                                "upstream ended before the declared length"
                            );
                            *this.state = StreamState::Failed;
                            Poll::Ready(Some(Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!("upstream ended {missing} bytes short"),
                            ))))
                        }
                        _ => {
                            *this.state = StreamState::Finished;
                            Poll::Ready(None)
                        }
                    };
                }
            }
        }
    }
}

#[pinned_drop]
impl PinnedDrop for ProxyStream {
    fn drop(self: Pin<&mut Self>) {
        if self.state == StreamState::Streaming && self.remaining != Some(0) {
            tracing::debug!(
                file_id = %self.file_id,
                sent = self.sent,
                "client went away, cancelling upstream read"
            );
        }
    }
}
