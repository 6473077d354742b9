use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AssetCacheBuilder;
use crate::error::CacheError;
use crate::fetch::{FetchOutcome, Fetcher};
use crate::materialize::Materializer;
use crate::metadata::{AssetMetadata, AssetStatus};
use crate::store::CacheStore;
use crate::utils::content_hash;
use crate::Result;

/// Outcome of a single `refresh()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The remote had new bytes; cache and in-memory asset were replaced.
    Updated,
    /// The remote confirmed the cached bytes are current.
    NotModified,
    /// Another refresh was already running; no network call was made.
    InFlight,
}

/// Coordinates the cached asset: owns the in-memory value, the status
/// snapshot and the refresh state machine. At most one logical refresh runs
/// at a time; overlapping calls observe `InFlight`.
pub struct AssetCache<A> {
    url: String,
    file_name: String,
    app_version: String,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetcher>,
    materializer: Arc<dyn Materializer<A>>,
    state: Arc<RwLock<CacheState<A>>>,
    auto_refresh: Arc<Mutex<Option<AutoRefreshTask>>>,
}

struct CacheState<A> {
    asset: Option<Arc<A>>,
    metadata: AssetMetadata,
    status: AssetStatus,
    refreshing: bool,
}

/// Explicit handle for the periodic refresh loop. Cancellation interrupts
/// the interval sleep; an in-flight refresh completes on its own.
struct AutoRefreshTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AutoRefreshTask {
    fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl<A> Clone for AssetCache<A> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            file_name: self.file_name.clone(),
            app_version: self.app_version.clone(),
            store: self.store.clone(),
            fetcher: self.fetcher.clone(),
            materializer: self.materializer.clone(),
            state: self.state.clone(),
            auto_refresh: self.auto_refresh.clone(),
        }
    }
}

fn project_status(
    url: &str,
    file_name: &str,
    app_version: &str,
    metadata: &AssetMetadata,
) -> AssetStatus {
    AssetStatus {
        url: url.to_string(),
        file_name: file_name.to_string(),
        app_version: app_version.to_string(),
        cache_headers: metadata.cache_headers.clone(),
        last_checked_at: metadata.last_checked_at,
        last_updated_at: metadata.last_updated_at,
        byte_count: metadata.byte_count,
        content_hash: metadata.content_hash.clone(),
    }
}

impl<A: Send + Sync + 'static> AssetCache<A> {
    pub fn builder() -> AssetCacheBuilder<A> {
        AssetCacheBuilder::new()
    }

    /// Bootstrap the store, load the cached bytes, reconcile metadata against
    /// what is actually on disk, and materialize the initial asset. No network
    /// call is made here.
    pub(crate) async fn initialize(
        url: String,
        file_name: String,
        app_version: String,
        store: CacheStore,
        fetcher: Arc<dyn Fetcher>,
        materializer: Arc<dyn Materializer<A>>,
        reuse_derived_at: Option<PathBuf>,
    ) -> Result<Self> {
        store.bootstrap().await?;

        let bytes = store.read_asset().await?;
        let hash = content_hash(&bytes);
        let mut metadata = store.read_metadata().await;

        // 检查磁盘内容是否与元数据漂移
        let hash_recorded = metadata.content_hash.as_deref() == Some(hash.as_str());
        let drifted = !hash_recorded
            || metadata.byte_count != Some(bytes.len() as u64)
            || metadata.last_updated_at.is_none();
        if drifted {
            debug!("Metadata drifted from on-disk asset, reconciling");
            metadata.byte_count = Some(bytes.len() as u64);
            metadata.content_hash = Some(hash.clone());
            metadata.last_updated_at = Some(Utc::now());
            store.write_metadata(&metadata).await;
        }

        // 如果派生产物已经存在且内容未变化，跳过初始转换
        let reuse_derived = hash_recorded
            && reuse_derived_at
                .as_deref()
                .map_or(false, Path::exists);
        let asset = if reuse_derived {
            info!("Derived artifact already current, skipping initial materialize");
            None
        } else {
            let value = materializer
                .materialize(&bytes)
                .map_err(|e| CacheError::MaterializeRejected(e.to_string()))?;
            Some(Arc::new(value))
        };

        let status = project_status(&url, &file_name, &app_version, &metadata);
        info!(
            "Asset cache ready at {:?} ({} bytes)",
            store.asset_path(),
            bytes.len()
        );

        Ok(Self {
            url,
            file_name,
            app_version,
            store: Arc::new(store),
            fetcher,
            materializer,
            state: Arc::new(RwLock::new(CacheState {
                asset,
                metadata,
                status,
                refreshing: false,
            })),
            auto_refresh: Arc::new(Mutex::new(None)),
        })
    }

    /// The currently loaded asset. `None` only when the initial materialize
    /// was skipped in favor of a previously-derived artifact and no refresh
    /// has replaced the asset yet.
    pub async fn asset(&self) -> Option<Arc<A>> {
        self.state.read().await.asset.clone()
    }

    pub async fn status(&self) -> AssetStatus {
        self.state.read().await.status.clone()
    }

    /// Performs one conditional refresh against the remote. Overlapping calls
    /// coalesce: whoever finds a refresh already running returns `InFlight`
    /// without touching the network or any state.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        {
            let mut state = self.state.write().await;
            if state.refreshing {
                debug!("Refresh already in flight for {}", self.url);
                return Ok(RefreshOutcome::InFlight);
            }
            state.refreshing = true;
        }

        let result = self.run_refresh().await;

        // 无论结果如何都要恢复 Idle 状态
        self.state.write().await.refreshing = false;
        result
    }

    async fn run_refresh(&self) -> Result<RefreshOutcome> {
        let headers = self.state.read().await.metadata.cache_headers.clone();

        match self.fetcher.fetch(&self.url, &headers).await? {
            FetchOutcome::Modified { bytes, headers } => {
                debug!("Remote modified, validating {} bytes", bytes.len());
                let value = self.materializer.materialize(&bytes).map_err(|e| {
                    warn!("Rejected fetched payload for {}: {}", self.url, e);
                    CacheError::MaterializeRejected(e.to_string())
                })?;

                self.store.write_asset(&bytes).await?;

                let now = Utc::now();
                let metadata = AssetMetadata {
                    app_version: self.app_version.clone(),
                    cache_headers: headers,
                    last_checked_at: Some(now),
                    last_updated_at: Some(now),
                    byte_count: Some(bytes.len() as u64),
                    content_hash: Some(content_hash(&bytes)),
                };
                self.store.write_metadata(&metadata).await;

                let mut state = self.state.write().await;
                state.asset = Some(Arc::new(value));
                state.status =
                    project_status(&self.url, &self.file_name, &self.app_version, &metadata);
                state.metadata = metadata;
                drop(state);

                info!("Asset updated from {} ({} bytes)", self.url, bytes.len());
                Ok(RefreshOutcome::Updated)
            }
            FetchOutcome::NotModified { headers } => {
                let metadata = {
                    let mut state = self.state.write().await;
                    state.metadata.cache_headers = headers;
                    state.metadata.last_checked_at = Some(Utc::now());
                    state.status = project_status(
                        &self.url,
                        &self.file_name,
                        &self.app_version,
                        &state.metadata,
                    );
                    state.metadata.clone()
                };
                self.store.write_metadata(&metadata).await;

                debug!("Asset unchanged at {}", self.url);
                Ok(RefreshOutcome::NotModified)
            }
        }
    }

    /// Starts the periodic refresh loop, cancelling any previously running
    /// one. Errors from individual refreshes are logged and discarded.
    pub async fn start_auto_refresh(&self, interval: Duration) {
        let (shutdown, mut signal) = watch::channel(false);
        let cache = self.clone();

        let handle = tokio::spawn(async move {
            info!("Auto-refresh loop started, interval {:?}", interval);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = signal.changed() => break,
                }
                if let Err(e) = cache.refresh().await {
                    warn!("Scheduled refresh failed: {}", e);
                }
            }
            info!("Auto-refresh loop stopped");
        });

        let mut slot = self.auto_refresh.lock().await;
        if let Some(previous) = slot.replace(AutoRefreshTask { shutdown, handle }) {
            debug!("Replacing previous auto-refresh loop");
            previous.cancel();
        }
    }

    /// Stops the periodic refresh loop and waits for it to exit. An in-flight
    /// refresh is not interrupted; it completes or fails on its own.
    pub async fn stop_auto_refresh(&self) {
        let task = self.auto_refresh.lock().await.take();
        if let Some(task) = task {
            task.cancel();
            if let Err(e) = task.handle.await {
                warn!("Auto-refresh task failed to shut down cleanly: {}", e);
            }
        }
    }
}
