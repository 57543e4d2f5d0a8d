//! Mock resource fetcher for testing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::{DownloadRequest, FetchError, FetchStatus, ResourceFetcher};

/// Mock implementation of the ResourceFetcher trait.
///
/// Downloads write a small placeholder file so that existence checks see
/// a real path. Nothing touches the network.
#[derive(Debug)]
pub struct MockResourceFetcher {
    dir: PathBuf,
    files: Arc<RwLock<HashMap<String, PathBuf>>>,
    downloads: Arc<RwLock<Vec<DownloadRequest>>>,
    fail_downloads: Arc<RwLock<bool>>,
}

impl Default for MockResourceFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResourceFetcher {
    /// Fetcher writing into a fresh directory under the system temp dir.
    pub fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("genloom-mock-{}", uuid::Uuid::new_v4()));
        Self::with_dir(dir)
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            files: Arc::new(RwLock::new(HashMap::new())),
            downloads: Arc::new(RwLock::new(Vec::new())),
            fail_downloads: Arc::new(RwLock::new(false)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Make every download fail until reset.
    pub async fn set_fail_downloads(&self, fail: bool) {
        *self.fail_downloads.write().await = fail;
    }

    pub async fn download_count(&self) -> usize {
        self.downloads.read().await.len()
    }

    pub async fn downloads(&self) -> Vec<DownloadRequest> {
        self.downloads.read().await.clone()
    }
}

#[async_trait]
impl ResourceFetcher for MockResourceFetcher {
    async fn download(&self, request: DownloadRequest) -> Result<PathBuf, FetchError> {
        self.downloads.write().await.push(request.clone());

        if *self.fail_downloads.read().await {
            return Err(FetchError::Http {
                url: request.url,
                status: 503,
            });
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.bin", request.cache_key));
        tokio::fs::write(&path, request.url.as_bytes()).await?;

        self.files
            .write()
            .await
            .insert(request.cache_key, path.clone());
        Ok(path)
    }

    async fn status(&self, cache_key: &str) -> Result<FetchStatus, FetchError> {
        Ok(match self.files.read().await.get(cache_key) {
            Some(path) => FetchStatus::Completed {
                local_path: path.clone(),
            },
            None => FetchStatus::Missing,
        })
    }
}
