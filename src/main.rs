use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use media_range_proxy::{AppState, Catalog, Config, DirectoryStore, DriveClient, MediaSource, ObjectStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let drive = Arc::new(DriveClient::with_client(http, config.upstream_url.clone(), config.capability()));

    let store: Arc<dyn ObjectStore> = match &config.root {
        Some(root) => {
            tracing::info!(root = %root.display(), "serving files from local directory");
            Arc::new(DirectoryStore::new(root))
        }
        None => drive.clone(),
    };
    let source: Arc<dyn MediaSource> = drive;

    if config.folders.is_empty() {
        tracing::warn!("no folders configured, the catalog will be empty");
    }
    let catalog = Catalog::new(source, config.folders.clone());

    let state = AppState::new(store, catalog, config.proxy());
    let app = media_range_proxy::app(state, config.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("server listening at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
