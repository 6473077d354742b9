use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::coordinator::AssetCache;
use crate::error::CacheError;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::materialize::Materializer;
use crate::store::CacheStore;
use crate::utils::hash_url;
use crate::Result;

/// Where the very first copy of the asset comes from.
#[derive(Debug, Clone)]
pub enum BaseSource {
    /// Seed by copying a bundled file.
    File(PathBuf),
    /// Seed by writing these default bytes.
    Bytes(Vec<u8>),
}

/// Default cache file name: base-source name plus a stable hash of the
/// remote URL, so two instances pointing at different remotes never collide.
fn default_file_name(base: &BaseSource, url: &str) -> String {
    let hash = hash_url(url);
    match base {
        BaseSource::File(path) => {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("asset");
            match path.extension().and_then(|s| s.to_str()) {
                Some(ext) => format!("{}-{}.{}", stem, hash, ext),
                None => format!("{}-{}", stem, hash),
            }
        }
        BaseSource::Bytes(_) => format!("asset-{}", hash),
    }
}

/// Construction-time configuration for an [`AssetCache`].
///
/// Base source, remote URL and materializer are required; everything else
/// has a default.
pub struct AssetCacheBuilder<A> {
    base: Option<BaseSource>,
    url: Option<String>,
    materializer: Option<Arc<dyn Materializer<A>>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    cache_dir: Option<PathBuf>,
    file_name: Option<String>,
    app_version: Option<String>,
    auto_refresh_interval: Option<Duration>,
    refresh_on_init: bool,
    reuse_derived_at: Option<PathBuf>,
}

impl<A: Send + Sync + 'static> AssetCacheBuilder<A> {
    pub fn new() -> Self {
        Self {
            base: None,
            url: None,
            materializer: None,
            fetcher: None,
            cache_dir: None,
            file_name: None,
            app_version: None,
            auto_refresh_interval: None,
            refresh_on_init: true,
            reuse_derived_at: None,
        }
    }

    /// Seed the cache from a bundled file.
    pub fn base_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.base = Some(BaseSource::File(path.into()));
        self
    }

    /// Seed the cache from default bytes.
    pub fn base_bytes(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.base = Some(BaseSource::Bytes(bytes.into()));
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn materializer(mut self, materializer: impl Materializer<A> + 'static) -> Self {
        self.materializer = Some(Arc::new(materializer));
        self
    }

    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn fetcher_arc(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Version string that invalidates the whole cache when it changes.
    pub fn app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = Some(version.into());
        self
    }

    /// Starts the periodic refresh loop right after construction.
    pub fn auto_refresh_interval(mut self, interval: Duration) -> Self {
        self.auto_refresh_interval = Some(interval);
        self
    }

    /// Whether to fire one background refresh after the initial load.
    pub fn refresh_on_init(mut self, enabled: bool) -> Self {
        self.refresh_on_init = enabled;
        self
    }

    /// Skip the initial materialize when this previously-derived artifact
    /// still exists and the cached bytes are unchanged.
    pub fn reuse_derived_at(mut self, path: impl Into<PathBuf>) -> Self {
        self.reuse_derived_at = Some(path.into());
        self
    }

    pub async fn build(self) -> Result<AssetCache<A>> {
        let base = self
            .base
            .ok_or_else(|| CacheError::Config("no base source configured".into()))?;
        let url = self
            .url
            .ok_or_else(|| CacheError::Config("no remote URL configured".into()))?;
        Url::parse(&url).map_err(|e| CacheError::Config(format!("invalid URL {}: {}", url, e)))?;
        let materializer = self
            .materializer
            .ok_or_else(|| CacheError::Config("no materializer configured".into()))?;

        let app_version = self
            .app_version
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());
        let cache_dir = self
            .cache_dir
            .unwrap_or_else(|| std::env::temp_dir().join("remote-asset-cache"));
        let file_name = self
            .file_name
            .unwrap_or_else(|| default_file_name(&base, &url));
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| Arc::new(HttpFetcher::new()));

        let store = CacheStore::new(cache_dir, &file_name, app_version.clone(), base);
        let cache = AssetCache::initialize(
            url,
            file_name,
            app_version,
            store,
            fetcher,
            materializer,
            self.reuse_derived_at,
        )
        .await?;

        if let Some(interval) = self.auto_refresh_interval {
            cache.start_auto_refresh(interval).await;
        }

        if self.refresh_on_init {
            let background = cache.clone();
            tokio::spawn(async move {
                if let Err(e) = background.refresh().await {
                    warn!("Post-init refresh failed: {}", e);
                }
            });
        }

        Ok(cache)
    }
}

impl<A: Send + Sync + 'static> Default for AssetCacheBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}
