//! Byte-level download of remote resources to disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

/// Errors from the resource fetcher.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Http { url: String, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: String,
    pub cache_key: String,
}

/// What the fetcher knows about a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Missing,
    Completed { local_path: PathBuf },
}

/// Downloads remote resources into local storage.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Download `request.url` and return where it was stored.
    async fn download(&self, request: DownloadRequest) -> Result<PathBuf, FetchError>;

    async fn status(&self, cache_key: &str) -> Result<FetchStatus, FetchError>;
}

/// Fetcher storing files as `<dir>/<sanitized key>-<key digest><ext>`.
pub struct HttpResourceFetcher {
    client: Client,
    dir: PathBuf,
}

impl HttpResourceFetcher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            client: Client::new(),
            dir: dir.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// File-name-safe form of a cache key.
///
/// Characters outside `[A-Za-z0-9_-]` collapse to `_`, so a digest prefix of
/// the raw key keeps distinct keys on distinct files.
fn sanitize_key(key: &str) -> String {
    let readable: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(key.as_bytes());
    let suffix: String = digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}-{}", readable, suffix)
}

/// Extension of the URL path, including the dot.
fn url_extension(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && !ext.is_empty()
                && ext.len() <= 5
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!(".{}", ext.to_ascii_lowercase())
        }
        _ => String::new(),
    }
}

#[async_trait]
impl ResourceFetcher for HttpResourceFetcher {
    async fn download(&self, request: DownloadRequest) -> Result<PathBuf, FetchError> {
        let response = self.client.get(&request.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: request.url,
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!(
            "{}{}",
            sanitize_key(&request.cache_key),
            url_extension(&request.url)
        );
        let target = self.dir.join(&name);
        let partial = self.dir.join(format!("{}.part", name));

        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &target).await?;

        debug!(url = %request.url, path = %target.display(), bytes = bytes.len(), "Downloaded resource");
        Ok(target)
    }

    async fn status(&self, cache_key: &str) -> Result<FetchStatus, FetchError> {
        let wanted = sanitize_key(cache_key);
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FetchStatus::Missing),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "part") {
                continue;
            }
            if path.file_stem().is_some_and(|s| s.to_string_lossy() == wanted) {
                return Ok(FetchStatus::Completed { local_path: path });
            }
        }
        Ok(FetchStatus::Missing)
    }
}
