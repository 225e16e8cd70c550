use std::io;

use async_trait::async_trait;
use axum_extra::headers::{ContentRange, Header};
use futures::StreamExt;
use futures_util::TryStreamExt;
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use super::{Delivered, FileDescriptor, ListPage, MediaSource, ObjectStore, RemoteEntry, UpstreamDelivery};
use crate::error::UpstreamError;
use crate::range::ByteRange;

pub const DEFAULT_DRIVE_URL: &str = "https://www.googleapis.com/drive/v3";

const METADATA_FIELDS: &str = "id,name,mimeType,size";
const LIST_FIELDS: &str = "nextPageToken,files(id,name,createdTime,mimeType,thumbnailLink,\
    imageMediaMetadata(width,height),videoMediaMetadata(width,height,durationMillis))";
const PAGE_SIZE: &str = "100";

/// Pre-authorized read access to the store, shared by every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Capability {
    Bearer(String),
    ApiKey(String),
    Anonymous,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Capability::Bearer(_) => f.write_str("Bearer(..)"),
            Capability::ApiKey(_) => f.write_str("ApiKey(..)"),
            Capability::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl Capability {
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Capability::Bearer(token) => request.bearer_auth(token),
            Capability::ApiKey(key) => request.query(&[("key", key)]),
            Capability::Anonymous => request,
        }
    }
}

/// Google Drive v3 REST client.
#[derive(Debug, Clone)]
pub struct DriveClient {
    http: reqwest::Client,
    base: Url,
    capability: Capability,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    mime_type: Option<String>,
    /// int64 fields come back as JSON strings
    size: Option<String>,
    created_time: Option<String>,
    thumbnail_link: Option<String>,
    image_media_metadata: Option<MediaMetadata>,
    video_media_metadata: Option<MediaMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    width: Option<u32>,
    height: Option<u32>,
    duration_millis: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

impl From<DriveFile> for RemoteEntry {
    fn from(file: DriveFile) -> Self {
        let image = file.image_media_metadata.unwrap_or_default();
        let video = file.video_media_metadata.unwrap_or_default();
        RemoteEntry {
            id: file.id,
            name: file.name,
            created_time: file.created_time,
            mime_type: file.mime_type.unwrap_or_default(),
            thumbnail_link: file.thumbnail_link,
            width: image.width.or(video.width),
            height: image.height.or(video.height),
            duration_millis: video.duration_millis.and_then(|d| d.parse().ok()),
        }
    }
}

impl DriveClient {
    pub fn new(base: Url, capability: Capability) -> Self {
        Self::with_client(reqwest::Client::new(), base, capability)
    }

    pub fn with_client(http: reqwest::Client, base: Url, capability: Capability) -> Self {
        DriveClient { http, base, capability }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, UpstreamError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| UpstreamError::Transient(format!("cannot build request URL from {}", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url) -> RequestBuilder {
        self.capability.authorize(self.http.get(url))
    }

    async fn file(&self, file_id: &str, fields: &str) -> Result<DriveFile, UpstreamError> {
        let url = self.url(&["files", file_id])?;
        let response = self
            .get(url)
            .query(&[("fields", fields), ("supportsAllDrives", "true")])
            .send()
            .await?;
        let response = check_status(file_id, response).await?;
        Ok(response.json().await?)
    }
}

/// Turn an error status into the matching [`UpstreamError`].
async fn check_status(file_id: &str, response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!(file_id, %status, body = %body, "upstream error response");

    Err(match status {
        StatusCode::NOT_FOUND => UpstreamError::NotFound(file_id.to_string()),
        StatusCode::FORBIDDEN if is_rate_limit(&body) => {
            UpstreamError::Transient(format!("rate limited reading {file_id}"))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => UpstreamError::Unauthorized(file_id.to_string()),
        status => UpstreamError::Transient(format!("upstream answered {status} for {file_id}")),
    })
}

fn is_rate_limit(body: &str) -> bool {
    body.to_ascii_lowercase().contains("ratelimitexceeded")
}

/// Quote a value for a Drive `q` expression.
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl ObjectStore for DriveClient {
    async fn metadata(&self, file_id: &str) -> Result<FileDescriptor, UpstreamError> {
        let file = self.file(file_id, METADATA_FIELDS).await?;

        // native documents and folders have no byte content to stream
        let size = file
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| UpstreamError::NotFound(file_id.to_string()))?;

        let mime_type = match file.mime_type.filter(|m| !m.is_empty()) {
            Some(mime_type) => mime_type,
            None => mime_guess::from_path(&file.name).first_or_octet_stream().to_string(),
        };

        Ok(FileDescriptor {
            id: file.id,
            name: Some(file.name).filter(|n| !n.is_empty()),
            mime_type,
            size,
        })
    }

    async fn open(&self, file_id: &str, range: Option<ByteRange>) -> Result<UpstreamDelivery, UpstreamError> {
        let url = self.url(&["files", file_id])?;
        let mut request = self
            .get(url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = check_status(file_id, request.send().await?).await?;
        let delivered = match response.status() {
            StatusCode::OK => Delivered::Full,
            StatusCode::PARTIAL_CONTENT => {
                let content_range = ContentRange::decode(&mut response.headers().get_all(CONTENT_RANGE).iter())
                    .map_err(|_| UpstreamError::Transient(format!("unparseable Content-Range for {file_id}")))?;
                Delivered::Partial { content_range }
            }
            status => {
                return Err(UpstreamError::Transient(format!("unexpected {status} opening {file_id}")));
            }
        };

        tracing::debug!(file_id, ?range, ?delivered, "upstream stream opened");

        Ok(UpstreamDelivery {
            delivered,
            content_length: response.content_length(),
            body: response.bytes_stream().map_err(io::Error::other).boxed(),
        })
    }
}

#[async_trait]
impl MediaSource for DriveClient {
    async fn folder_name(&self, folder_id: &str) -> Result<String, UpstreamError> {
        Ok(self.file(folder_id, "name").await?.name)
    }

    async fn list_page(&self, folder_id: &str, page_token: Option<&str>) -> Result<ListPage, UpstreamError> {
        let q = format!(
            "{} in parents and (mimeType contains 'image/' or mimeType contains 'video/') and trashed = false",
            quote(folder_id)
        );
        let mut request = self.get(self.url(&["files"])?).query(&[
            ("q", q.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", PAGE_SIZE),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = check_status(folder_id, request.send().await?).await?;
        let list: FileList = response.json().await?;

        Ok(ListPage {
            entries: list.files.into_iter().map(RemoteEntry::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let client = DriveClient::new(Url::parse("http://localhost:9000/drive/v3/").unwrap(), Capability::Anonymous);
        let url = client.url(&["files", "a b/c"]).unwrap();
        assert_eq!("http://localhost:9000/drive/v3/files/a%20b%2Fc", url.as_str());
    }

    #[test]
    fn test_query_quoting() {
        assert_eq!("'abc'", quote("abc"));
        assert_eq!(r"'it\'s'", quote("it's"));
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit(r#"{"error":{"errors":[{"reason":"userRateLimitExceeded"}]}}"#));
        assert!(!is_rate_limit(r#"{"error":{"errors":[{"reason":"insufficientFilePermissions"}]}}"#));
    }

    #[test]
    fn test_capability_debug_hides_secrets() {
        assert_eq!("Bearer(..)", format!("{:?}", Capability::Bearer("secret".into())));
    }

    #[test]
    fn test_remote_entry_mapping() {
        let file: DriveFile = serde_json::from_value(serde_json::json!({
            "id": "v1",
            "name": "clip.mp4",
            "mimeType": "video/mp4",
            "createdTime": "2025-01-01T00:00:00.000Z",
            "videoMediaMetadata": { "width": 1920, "height": 1080, "durationMillis": "64000" }
        }))
        .unwrap();
        let entry = RemoteEntry::from(file);
        assert_eq!(Some(1920), entry.width);
        assert_eq!(Some(64_000), entry.duration_millis);
        assert_eq!(None, entry.thumbnail_link);
    }
}
