//! # media-range-proxy
//!
//! Streams images and videos held in a remote object store to browsers,
//! with the byte-range semantics native `<video>` and `<img>` elements rely
//! on, without handing upstream credentials to the client.
//!
//! The upstream store is only partly trustworthy about ranges: it may honor
//! a `Range` exactly or silently send the whole file. [`ObjectStore::open`]
//! reports what was actually delivered, [`negotiate`] turns that into a
//! protocol-correct status and header set, and [`ProxyStream`] pipes the
//! upstream bytes through under hyper's back-pressure.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use media_range_proxy::{AppState, Catalog, DirectoryStore, ProxyConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(DirectoryStore::new("media"));
//!     let catalog = Catalog::new(Arc::new(NoFolders), Vec::new());
//!     let app = media_range_proxy::router(AppState::new(store, catalog, ProxyConfig::default()));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! # use media_range_proxy::{ListPage, MediaSource, UpstreamError};
//! # struct NoFolders;
//! # #[async_trait::async_trait]
//! # impl MediaSource for NoFolders {
//! #     async fn folder_name(&self, id: &str) -> Result<String, UpstreamError> { Err(UpstreamError::NotFound(id.into())) }
//! #     async fn list_page(&self, _: &str, _: Option<&str>) -> Result<ListPage, UpstreamError> { Ok(ListPage::default()) }
//! # }
//! ```

mod catalog;
mod config;
mod error;
mod negotiate;
mod range;
mod server;
mod stream;
mod upstream;

pub use catalog::{Catalog, MediaItem};
pub use config::{Config, ProxyConfig};
pub use error::{ProxyError, UpstreamError};
pub use negotiate::{negotiate, Envelope};
pub use range::{ByteRange, MalformedRange, RangeNotSatisfiable, RangeRequest};
pub use server::{app, router, AppState};
pub use stream::ProxyStream;
pub use upstream::{
    ByteStream, Capability, Delivered, DirectoryStore, DriveClient, FileDescriptor, FileStream, ListPage,
    MediaSource, ObjectStore, RemoteEntry, UpstreamDelivery, DEFAULT_DRIVE_URL,
};
