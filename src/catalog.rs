//! The media catalog served at `/api/media`: every image and video in the
//! configured folders, tagged with the folder it came from.

use std::sync::Arc;

use async_stream::try_stream;
use futures::{pin_mut, Stream, TryStreamExt};
use serde::Serialize;

use crate::error::UpstreamError;
use crate::upstream::{MediaSource, RemoteEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    pub created_time: Option<String>,
    /// Proxy URL the browser streams from.
    pub url: String,
    pub thumbnail_link: Option<String>,
    pub mime_type: String,
    pub collection: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_millis: Option<u64>,
}

impl MediaItem {
    fn new(entry: RemoteEntry, collection: &str) -> Self {
        MediaItem {
            url: format!("/files/{}", entry.id),
            id: entry.id,
            name: entry.name,
            created_time: entry.created_time,
            thumbnail_link: entry.thumbnail_link,
            mime_type: entry.mime_type,
            collection: collection.to_string(),
            width: entry.width,
            height: entry.height,
            duration_millis: entry.duration_millis,
        }
    }
}

/// Folders to publish and the source to list them from.
#[derive(Clone)]
pub struct Catalog {
    source: Arc<dyn MediaSource>,
    folders: Arc<[String]>,
}

impl Catalog {
    pub fn new(source: Arc<dyn MediaSource>, folders: impl IntoIterator<Item = String>) -> Self {
        Catalog {
            source,
            folders: folders.into_iter().collect(),
        }
    }

    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    /// List every configured folder in order. A folder that cannot be read
    /// is logged and left out rather than failing the whole catalog; only a
    /// rejected capability fails the listing, since no folder can succeed.
    pub async fn list(&self) -> Result<Vec<MediaItem>, UpstreamError> {
        let mut items = Vec::new();
        for folder_id in self.folders.iter() {
            match self.list_folder(folder_id).await {
                Ok(mut folder_items) => {
                    tracing::info!(folder_id = %folder_id, count = folder_items.len(), "listed folder");
                    items.append(&mut folder_items);
                }
                Err(err @ UpstreamError::Unauthorized(_)) => return Err(err),
                Err(err) => {
                    tracing::error!(folder_id = %folder_id, error = %err, "error accessing folder");
                }
            }
        }
        tracing::info!(total = items.len(), "catalog listed");
        Ok(items)
    }

    async fn list_folder(&self, folder_id: &str) -> Result<Vec<MediaItem>, UpstreamError> {
        let collection = self.source.folder_name(folder_id).await?;
        let entries = pages(self.source.as_ref(), folder_id);
        pin_mut!(entries);

        let mut items = Vec::new();
        while let Some(page) = entries.try_next().await? {
            tracing::debug!(folder_id, fetched = page.len(), "fetched page");
            items.extend(page.into_iter().map(|entry| MediaItem::new(entry, &collection)));
        }
        Ok(items)
    }
}

/// Follow page tokens until the folder is exhausted.
fn pages<'a>(
    source: &'a dyn MediaSource,
    folder_id: &'a str,
) -> impl Stream<Item = Result<Vec<RemoteEntry>, UpstreamError>> + 'a {
    try_stream! {
        let mut token: Option<String> = None;
        loop {
            let page = source.list_page(folder_id, token.as_deref()).await?;
            yield page.entries;
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
    }
}
