use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use assert_matches::assert_matches;
use axum::extract::{Path, Query};
use axum::http::header::{AUTHORIZATION, CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bytes::Bytes;
use futures::TryStreamExt;
use media_range_proxy::{
    AppState, ByteRange, Capability, Catalog, Delivered, DriveClient, MediaSource, ObjectStore, ProxyConfig,
    RangeRequest, UpstreamError,
};
use reqwest::Url;
use serde_json::json;

const TOKEN: &str = "test-token";

fn content() -> Vec<u8> {
    (0..1000u32).map(|i| (i % 256) as u8).collect()
}

async fn fake_file(
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    match id.as_str() {
        "honors" | "ignores" => {}
        "folder-1" => return Json(json!({ "name": "Holiday" })).into_response(),
        "doc" => return Json(json!({ "id": "doc", "name": "Notes", "mimeType": "application/vnd.google-apps.document" })).into_response(),
        "limited" => {
            let body = json!({ "error": { "code": 403, "errors": [{ "reason": "userRateLimitExceeded" }] } });
            return (StatusCode::FORBIDDEN, Json(body)).into_response();
        }
        "denied" => {
            let body = json!({ "error": { "code": 403, "errors": [{ "reason": "insufficientFilePermissions" }] } });
            return (StatusCode::FORBIDDEN, Json(body)).into_response();
        }
        "broken" => return StatusCode::BAD_GATEWAY.into_response(),
        _ => return StatusCode::NOT_FOUND.into_response(),
    }

    if query.get("alt").map(String::as_str) != Some("media") {
        let name = format!("{id}.mp4");
        return Json(json!({ "id": id, "name": name, "mimeType": "", "size": "1000" })).into_response();
    }

    let data = content();
    let range = headers
        .get(RANGE)
        .and_then(|v| RangeRequest::from_header(v).ok())
        .and_then(|r| r.resolve(data.len() as u64).ok());
    match (id.as_str(), range) {
        ("honors", Some(range)) => {
            let body = data[range.start as usize..=range.end as usize].to_vec();
            let content_range = format!("bytes {}-{}/{}", range.start, range.end, data.len());
            (StatusCode::PARTIAL_CONTENT, [(CONTENT_RANGE, content_range)], body).into_response()
        }
        _ => (StatusCode::OK, data).into_response(),
    }
}

async fn fake_list(Query(query): Query<HashMap<String, String>>, headers: HeaderMap) -> Response {
    if headers.get(AUTHORIZATION).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if query.get("q").map(String::as_str) != Some(
        "'folder-1' in parents and (mimeType contains 'image/' or mimeType contains 'video/') and trashed = false",
    ) {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let page = match query.get("pageToken").map(String::as_str) {
        None => json!({
            "nextPageToken": "page-2",
            "files": [{
                "id": "img-1",
                "name": "beach.jpg",
                "mimeType": "image/jpeg",
                "createdTime": "2025-06-01T10:00:00.000Z",
                "thumbnailLink": "https://thumbs.example/img-1=s220",
                "imageMediaMetadata": { "width": 4000, "height": 3000 }
            }]
        }),
        Some("page-2") => json!({
            "files": [{
                "id": "vid-1",
                "name": "waves.mp4",
                "mimeType": "video/mp4",
                "videoMediaMetadata": { "width": 1920, "height": 1080, "durationMillis": "12500" }
            }]
        }),
        Some(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    Json(page).into_response()
}

async fn spawn_drive() -> SocketAddr {
    let app = Router::new()
        .route("/drive/v3/files", get(fake_list))
        .route("/drive/v3/files/{id}", get(fake_file));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, capability: Capability) -> DriveClient {
    let base = Url::parse(&format!("http://{addr}/drive/v3")).unwrap();
    DriveClient::new(base, capability)
}

async fn body(delivery: media_range_proxy::UpstreamDelivery) -> Vec<u8> {
    let chunks: Vec<Bytes> = delivery.body.try_collect().await.unwrap();
    chunks.concat()
}

#[tokio::test]
async fn test_metadata() {
    let drive = client(spawn_drive().await, Capability::Bearer(TOKEN.into()));

    let file = drive.metadata("honors").await.unwrap();
    assert_eq!(1000, file.size);
    // empty upstream mime type is guessed from the name
    assert_eq!("video/mp4", file.mime_type);
    assert_eq!(Some("honors.mp4".to_string()), file.name);

    assert_matches!(drive.metadata("doc").await, Err(UpstreamError::NotFound(_)));
    assert_matches!(drive.metadata("nope").await, Err(UpstreamError::NotFound(_)));
}

#[tokio::test]
async fn test_status_mapping() {
    let drive = client(spawn_drive().await, Capability::Bearer(TOKEN.into()));

    assert_matches!(drive.metadata("denied").await, Err(UpstreamError::Unauthorized(_)));
    assert_matches!(drive.metadata("limited").await, Err(UpstreamError::Transient(_)));
    assert_matches!(drive.metadata("broken").await, Err(UpstreamError::Transient(_)));

    let anonymous = client(spawn_drive().await, Capability::Anonymous);
    assert_matches!(anonymous.metadata("honors").await, Err(UpstreamError::Unauthorized(_)));
}

#[tokio::test]
async fn test_unreachable_upstream_is_transient() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let drive = client(addr, Capability::Bearer(TOKEN.into()));
    assert_matches!(drive.metadata("honors").await, Err(UpstreamError::Transient(_)));
}

#[tokio::test]
async fn test_open_reports_what_upstream_did() {
    let drive = client(spawn_drive().await, Capability::Bearer(TOKEN.into()));
    let data = content();

    let delivery = drive.open("honors", Some(ByteRange::new(500, 999))).await.unwrap();
    assert_eq!(Some(ByteRange::new(500, 999)), delivery.delivered.delivered_range());
    assert_eq!(Some(500), delivery.content_length);
    assert_eq!(&data[500..], &body(delivery).await[..]);

    let delivery = drive.open("ignores", Some(ByteRange::new(500, 999))).await.unwrap();
    assert_eq!(Delivered::Full, delivery.delivered);
    assert_eq!(Some(1000), delivery.content_length);
    assert_eq!(data, body(delivery).await);

    let delivery = drive.open("honors", None).await.unwrap();
    assert_eq!(Delivered::Full, delivery.delivered);
}

#[tokio::test]
async fn test_list_follows_pages() {
    let drive = client(spawn_drive().await, Capability::Bearer(TOKEN.into()));

    assert_eq!("Holiday", drive.folder_name("folder-1").await.unwrap());

    let first = drive.list_page("folder-1", None).await.unwrap();
    assert_eq!(Some("page-2".to_string()), first.next_page_token);
    assert_eq!(Some(4000), first.entries[0].width);

    let second = drive.list_page("folder-1", Some("page-2")).await.unwrap();
    assert_eq!(None, second.next_page_token);
    assert_eq!(Some(12_500), second.entries[0].duration_millis);
}

#[tokio::test]
async fn test_end_to_end_through_proxy() {
    let drive = Arc::new(client(spawn_drive().await, Capability::Bearer(TOKEN.into())));
    let catalog = Catalog::new(drive.clone(), vec!["folder-1".to_string(), "missing".to_string()]);
    let app = media_range_proxy::router(AppState::new(drive, catalog, ProxyConfig::default()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let http = reqwest::Client::new();
    let data = content();
    let fetch = |id: &str, range: &str| http.get(format!("http://{addr}/files/{id}")).header(RANGE, range.to_string()).send();

    let response = fetch("honors", "bytes=500-999").await.unwrap();
    assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
    assert_eq!("bytes 500-999/1000", response.headers()[CONTENT_RANGE]);
    assert_eq!(&data[500..], &response.bytes().await.unwrap()[..]);

    let response = fetch("ignores", "bytes=0-").await.unwrap();
    assert_eq!(StatusCode::PARTIAL_CONTENT, response.status());
    assert_eq!("bytes 0-999/1000", response.headers()[CONTENT_RANGE]);
    assert_eq!(data.len(), response.bytes().await.unwrap().len());

    let response = fetch("ignores", "bytes=500-").await.unwrap();
    assert_eq!(StatusCode::OK, response.status());
    assert_eq!(data, response.bytes().await.unwrap().to_vec());

    let response = fetch("honors", "bytes=1000-").await.unwrap();
    assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());

    let response = http.get(format!("http://{addr}/api/media")).send().await.unwrap();
    let items: serde_json::Value = response.json().await.unwrap();
    let ids: Vec<_> = items.as_array().unwrap().iter().map(|i| i["id"].as_str().unwrap().to_string()).collect();
    assert_eq!(vec!["img-1", "vid-1"], ids);
    assert_eq!("/files/vid-1", items[1]["url"]);
}
