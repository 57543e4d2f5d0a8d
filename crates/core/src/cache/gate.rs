//! The artifact cache gate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::metrics;
use crate::usage::{UsageEvent, UsageHandle};

use super::{DownloadRequest, FetchStatus, ResourceFetcher};

/// Prefix marking a reference as already local.
pub const LOCAL_SCHEME: &str = "local-resource://";

pub fn is_local_ref(reference: &str) -> bool {
    reference.starts_with(LOCAL_SCHEME)
}

pub fn to_local_ref(path: &Path) -> String {
    format!(
        "{}{}",
        LOCAL_SCHEME,
        urlencoding::encode(&path.to_string_lossy())
    )
}

/// The filesystem path behind a local reference.
pub fn local_path_of(reference: &str) -> Option<PathBuf> {
    let encoded = reference.strip_prefix(LOCAL_SCHEME)?;
    urlencoding::decode(encoded)
        .ok()
        .map(|p| PathBuf::from(p.into_owned()))
}

/// Idempotent remote-to-local artifact resolver.
///
/// Caching is best effort: any fetch failure yields the remote URL.
#[derive(Clone)]
pub struct ArtifactCache {
    fetcher: Arc<dyn ResourceFetcher>,
    usage: Option<UsageHandle>,
}

impl ArtifactCache {
    pub fn new(fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            fetcher,
            usage: None,
        }
    }

    pub fn with_usage(mut self, usage: UsageHandle) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Resolve `remote_url` to a local reference, downloading at most once per `cache_key`.
    pub async fn ensure_local(&self, remote_url: &str, cache_key: &str) -> String {
        if is_local_ref(remote_url) {
            metrics::ARTIFACT_CACHE.with_label_values(&["local"]).inc();
            return remote_url.to_string();
        }

        match self.fetcher.status(cache_key).await {
            Ok(FetchStatus::Completed { local_path }) if local_path.exists() => {
                debug!(cache_key = %cache_key, path = %local_path.display(), "Artifact already cached");
                metrics::ARTIFACT_CACHE.with_label_values(&["hit"]).inc();
                let local_ref = to_local_ref(&local_path);
                self.report(remote_url, cache_key, &local_ref, false).await;
                return local_ref;
            }
            Ok(FetchStatus::Completed { local_path }) => {
                debug!(
                    cache_key = %cache_key,
                    path = %local_path.display(),
                    "Cached artifact file is gone, downloading again"
                );
            }
            Ok(FetchStatus::Missing) => {}
            Err(e) => {
                warn!(cache_key = %cache_key, error = %e, "Cache status lookup failed");
            }
        }

        let request = DownloadRequest {
            url: remote_url.to_string(),
            cache_key: cache_key.to_string(),
        };
        match self.fetcher.download(request).await {
            Ok(path) => {
                info!(cache_key = %cache_key, path = %path.display(), "Artifact cached");
                metrics::ARTIFACT_CACHE
                    .with_label_values(&["downloaded"])
                    .inc();
                let local_ref = to_local_ref(&path);
                self.report(remote_url, cache_key, &local_ref, true).await;
                local_ref
            }
            Err(e) => {
                warn!(
                    cache_key = %cache_key,
                    url = %remote_url,
                    error = %e,
                    "Artifact download failed, keeping remote URL"
                );
                metrics::ARTIFACT_CACHE.with_label_values(&["fallback"]).inc();
                remote_url.to_string()
            }
        }
    }

    async fn report(&self, remote_url: &str, cache_key: &str, local_ref: &str, downloaded: bool) {
        if let Some(usage) = &self.usage {
            usage
                .emit(UsageEvent::ArtifactCached {
                    cache_key: cache_key.to_string(),
                    remote_url: remote_url.to_string(),
                    local_ref: local_ref.to_string(),
                    downloaded,
                })
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockResourceFetcher;

    #[test]
    fn test_local_ref_round_trip() {
        let path = Path::new("/var/cache/gen loom/task-1.mp4");
        let reference = to_local_ref(path);
        assert!(is_local_ref(&reference));
        assert_eq!(local_path_of(&reference).unwrap(), path);
        assert_eq!(local_path_of("https://x/y.mp4"), None);
    }

    #[tokio::test]
    async fn test_local_input_is_returned_unchanged() {
        let fetcher = Arc::new(MockResourceFetcher::new());
        let cache = ArtifactCache::new(fetcher.clone());

        let reference = "local-resource://%2Ftmp%2Fa.mp4";
        assert_eq!(cache.ensure_local(reference, "t1").await, reference);
        assert_eq!(fetcher.download_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_call_does_not_download_again() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockResourceFetcher::with_dir(dir.path()));
        let cache = ArtifactCache::new(fetcher.clone());

        let first = cache.ensure_local("https://x/y.mp4", "t1").await;
        let second = cache.ensure_local("https://x/y.mp4", "t1").await;

        assert!(is_local_ref(&first));
        assert_eq!(first, second);
        assert_eq!(fetcher.download_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_file_triggers_fresh_download() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(MockResourceFetcher::with_dir(dir.path()));
        let cache = ArtifactCache::new(fetcher.clone());

        let first = cache.ensure_local("https://x/y.mp4", "t1").await;
        std::fs::remove_file(local_path_of(&first).unwrap()).unwrap();

        let second = cache.ensure_local("https://x/y.mp4", "t1").await;
        assert_eq!(first, second);
        assert_eq!(fetcher.download_count().await, 2);
    }

    #[tokio::test]
    async fn test_download_failure_falls_back_to_remote() {
        let fetcher = Arc::new(MockResourceFetcher::new());
        fetcher.set_fail_downloads(true).await;
        let cache = ArtifactCache::new(fetcher.clone());

        assert_eq!(
            cache.ensure_local("https://x/y.mp4", "t1").await,
            "https://x/y.mp4"
        );
    }
}
