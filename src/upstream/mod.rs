//! Contract between the proxy and the remote object store.
//!
//! The store is never trusted to honor a requested range. Whatever it
//! actually sent is reported through [`Delivered`], and the negotiator only
//! ever branches on that.

mod drive;
mod fs;

use std::io;

use async_trait::async_trait;
use axum_extra::headers::ContentRange;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::UpstreamError;
use crate::range::ByteRange;

pub use drive::{Capability, DriveClient, DEFAULT_DRIVE_URL};
pub use fs::{DirectoryStore, FileStream};

/// Upstream body. An `Err` item is a failure after bytes started flowing.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// Metadata snapshot of a remote file, fetched fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub id: String,
    pub name: Option<String>,
    pub mime_type: String,
    pub size: u64,
}

/// What upstream actually sent, regardless of what it was asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivered {
    /// The whole file, `200 OK`.
    Full,
    /// A partial body, `206 Partial Content`, described by upstream's own
    /// `Content-Range` header.
    Partial { content_range: ContentRange },
}

impl Delivered {
    /// Span upstream claims to have delivered, if it said so.
    pub fn delivered_range(&self) -> Option<ByteRange> {
        match self {
            Delivered::Full => None,
            Delivered::Partial { content_range } => content_range
                .bytes_range()
                .filter(|(start, end)| start <= end)
                .map(|(start, end)| ByteRange::new(start, end)),
        }
    }
}

pub struct UpstreamDelivery {
    pub delivered: Delivered,
    /// Upstream's `Content-Length`, when it sent one.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl std::fmt::Debug for UpstreamDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamDelivery")
            .field("delivered", &self.delivered)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Read access to remote file bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn metadata(&self, file_id: &str) -> Result<FileDescriptor, UpstreamError>;

    /// Open a byte stream, passing `range` on to upstream when present.
    /// Implementations report the delivered span truthfully.
    async fn open(&self, file_id: &str, range: Option<ByteRange>) -> Result<UpstreamDelivery, UpstreamError>;
}

/// A media file as listed in a remote folder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub created_time: Option<String>,
    pub mime_type: String,
    pub thumbnail_link: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_millis: Option<u64>,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// Folder enumeration, consumed by the catalog.
#[async_trait]
pub trait MediaSource: Send + Sync + 'static {
    async fn folder_name(&self, folder_id: &str) -> Result<String, UpstreamError>;

    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<ListPage, UpstreamError>;
}
