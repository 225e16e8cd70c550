//! Runtime configuration.
//!
//! Everything can be given as a flag or through the matching `GALLERY_*`
//! environment variable.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use reqwest::Url;

use crate::upstream::{Capability, DEFAULT_DRIVE_URL};

/// Tunables used while serving a single request.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Upper bound on the metadata fetch. Streaming itself is unbounded.
    pub metadata_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(name = "media-range-proxy")]
#[command(about = "Streams media from remote storage folders with HTTP range support")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "GALLERY_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Base URL of the Drive v3 REST API
    #[arg(long, env = "GALLERY_UPSTREAM_URL", default_value = DEFAULT_DRIVE_URL)]
    pub upstream_url: Url,

    /// OAuth access token presented as a bearer credential
    #[arg(long, env = "GALLERY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,

    /// API key, for publicly shared folders
    #[arg(long, env = "GALLERY_API_KEY", hide_env_values = true, conflicts_with = "access_token")]
    pub api_key: Option<String>,

    /// Folder ids to publish in the catalog
    #[arg(long = "folder", env = "GALLERY_FOLDERS", value_delimiter = ',')]
    pub folders: Vec<String>,

    /// Serve files from this directory instead of the remote store
    #[arg(long, env = "GALLERY_ROOT")]
    pub root: Option<PathBuf>,

    /// Seconds allowed for the metadata fetch before answering 500
    #[arg(long, env = "GALLERY_METADATA_TIMEOUT_SECS", default_value_t = 10)]
    pub metadata_timeout_secs: u64,

    /// Directory of static assets served at `/`
    #[arg(long, env = "GALLERY_STATIC_DIR")]
    pub static_dir: Option<PathBuf>,
}

impl Config {
    pub fn capability(&self) -> Capability {
        match (&self.access_token, &self.api_key) {
            (Some(token), _) => Capability::Bearer(token.clone()),
            (None, Some(key)) => Capability::ApiKey(key.clone()),
            (None, None) => Capability::Anonymous,
        }
    }

    pub fn proxy(&self) -> ProxyConfig {
        ProxyConfig {
            metadata_timeout: Duration::from_secs(self.metadata_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["media-range-proxy"]).unwrap();
        assert_eq!("127.0.0.1:3000".parse::<SocketAddr>().unwrap(), config.bind);
        assert_eq!(DEFAULT_DRIVE_URL, config.upstream_url.as_str().trim_end_matches('/'));
        assert_eq!(Capability::Anonymous, config.capability());
        assert_eq!(Duration::from_secs(10), config.proxy().metadata_timeout);
        assert!(config.folders.is_empty());
    }

    #[test]
    fn test_folders_and_credentials() {
        let config = Config::try_parse_from([
            "media-range-proxy",
            "--folder",
            "a,b",
            "--folder",
            "c",
            "--access-token",
            "tok",
            "--metadata-timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(vec!["a", "b", "c"], config.folders);
        assert_eq!(Capability::Bearer("tok".into()), config.capability());
        assert_eq!(Duration::from_secs(3), config.proxy().metadata_timeout);
    }

    #[test]
    fn test_token_and_key_conflict() {
        let result = Config::try_parse_from(["media-range-proxy", "--access-token", "t", "--api-key", "k"]);
        assert!(result.is_err());
    }
}
