use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::BaseSource;
use crate::error::CacheError;
use crate::metadata::AssetMetadata;
use crate::Result;

const METADATA_SUFFIX: &str = ".metadata.json";

/// Sole reader and writer of the on-disk asset bytes and their metadata
/// side-file. Never makes network calls and never materializes.
#[derive(Debug)]
pub struct CacheStore {
    cache_dir: PathBuf,
    asset_path: PathBuf,
    metadata_path: PathBuf,
    app_version: String,
    base: BaseSource,
}

impl CacheStore {
    pub fn new(
        cache_dir: PathBuf,
        file_name: &str,
        app_version: String,
        base: BaseSource,
    ) -> Self {
        let asset_path = cache_dir.join(file_name);
        let metadata_path = cache_dir.join(format!("{}{}", file_name, METADATA_SUFFIX));
        Self {
            cache_dir,
            asset_path,
            metadata_path,
            app_version,
            base,
        }
    }

    pub fn asset_path(&self) -> &Path {
        &self.asset_path
    }

    pub fn metadata_path(&self) -> &Path {
        &self.metadata_path
    }

    /// First-time setup: create the cache directory, purge on app-version
    /// change, seed the asset file from the base source, and make sure a
    /// metadata record for the current app version exists.
    pub async fn bootstrap(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir).await?;

        // 检查应用版本
        if let Some(metadata) = self.raw_metadata().await {
            if metadata.app_version != self.app_version {
                info!(
                    "App version changed ({} -> {}), purging cached asset",
                    metadata.app_version, self.app_version
                );
                remove_if_exists(&self.asset_path).await;
                remove_if_exists(&self.metadata_path).await;
            }
        }

        // 初始化资源文件
        if !self.asset_path.exists() {
            let bytes = self.seed_bytes().await?;
            self.write_asset(&bytes).await?;
            info!(
                "Seeded {} bytes from base source at {:?}",
                bytes.len(),
                self.asset_path
            );
        }

        let valid = matches!(
            self.raw_metadata().await,
            Some(metadata) if metadata.app_version == self.app_version
        );
        if !valid {
            debug!("No valid metadata record, writing a fresh one");
            self.write_metadata(&AssetMetadata::new(self.app_version.clone()))
                .await;
        }

        Ok(())
    }

    /// Reads the asset bytes, repairing a corrupt or missing file by
    /// re-seeding from the base source.
    pub async fn read_asset(&self) -> Result<Vec<u8>> {
        match fs::read(&self.asset_path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(
                    "Failed to read cached asset {:?}: {}, re-seeding",
                    self.asset_path, e
                );
                remove_if_exists(&self.asset_path).await;
                let bytes = self.seed_bytes().await?;
                self.write_asset(&bytes).await?;
                Ok(bytes)
            }
        }
    }

    /// Atomic replace: a partially-written file is never observable at the
    /// asset path.
    pub async fn write_asset(&self, bytes: &[u8]) -> Result<()> {
        write_file_atomic(&self.asset_path, bytes).await?;
        debug!("Wrote {} bytes to {:?}", bytes.len(), self.asset_path);
        Ok(())
    }

    /// Returns parsed metadata only if present, parseable and written under
    /// the current app version; anything else reads as a fresh empty record.
    pub async fn read_metadata(&self) -> AssetMetadata {
        match self.raw_metadata().await {
            Some(metadata) if metadata.app_version == self.app_version => metadata,
            _ => AssetMetadata::new(self.app_version.clone()),
        }
    }

    /// Best-effort: metadata is advisory, so write failures are logged and
    /// swallowed rather than propagated.
    pub async fn write_metadata(&self, metadata: &AssetMetadata) {
        let json = match serde_json::to_vec_pretty(metadata) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize metadata: {}", e);
                return;
            }
        };
        if let Err(e) = write_file_atomic(&self.metadata_path, &json).await {
            warn!(
                "Failed to persist metadata {:?}: {}",
                self.metadata_path, e
            );
        }
    }

    async fn raw_metadata(&self) -> Option<AssetMetadata> {
        let contents = fs::read(&self.metadata_path).await.ok()?;
        match serde_json::from_slice(&contents) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Failed to parse metadata {:?}: {}", self.metadata_path, e);
                None
            }
        }
    }

    async fn seed_bytes(&self) -> Result<Vec<u8>> {
        match &self.base {
            BaseSource::File(path) => {
                let file_meta = fs::metadata(path)
                    .await
                    .map_err(|e| CacheError::InvalidBaseSource(format!("{:?}: {}", path, e)))?;
                if !file_meta.is_file() {
                    return Err(CacheError::InvalidBaseSource(format!(
                        "{:?} is not a regular file",
                        path
                    )));
                }
                fs::read(path)
                    .await
                    .map_err(|e| CacheError::InvalidBaseSource(format!("{:?}: {}", path, e)))
            }
            BaseSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

async fn write_file_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {:?}: {}", path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::CacheHeaders;
    use chrono::Utc;

    fn store_at(dir: &Path, app_version: &str, base: BaseSource) -> CacheStore {
        CacheStore::new(
            dir.join("cache"),
            "asset.bin",
            app_version.to_string(),
            base,
        )
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_from_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));

        store.bootstrap().await.unwrap();

        assert_eq!(std::fs::read(store.asset_path()).unwrap(), b"base");
        let metadata = store.read_metadata().await;
        assert_eq!(metadata.app_version, "1.0");
        assert!(metadata.cache_headers.is_empty());
        assert!(metadata.last_updated_at.is_none());
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_from_base_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base_path = temp_dir.path().join("bundled.bin");
        std::fs::write(&base_path, b"bundled contents").unwrap();

        let store = store_at(temp_dir.path(), "1.0", BaseSource::File(base_path));
        store.bootstrap().await.unwrap();

        assert_eq!(
            std::fs::read(store.asset_path()).unwrap(),
            b"bundled contents"
        );
    }

    #[tokio::test]
    async fn test_bootstrap_fails_on_missing_base_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(
            temp_dir.path(),
            "1.0",
            BaseSource::File(temp_dir.path().join("missing.bin")),
        );

        let err = store.bootstrap().await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidBaseSource(_)));
    }

    #[tokio::test]
    async fn test_bootstrap_fails_on_directory_base() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir_base = temp_dir.path().join("subdir");
        std::fs::create_dir(&dir_base).unwrap();

        let store = store_at(temp_dir.path(), "1.0", BaseSource::File(dir_base));
        let err = store.bootstrap().await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidBaseSource(_)));
    }

    #[tokio::test]
    async fn test_version_change_purges_and_reseeds() {
        let temp_dir = tempfile::tempdir().unwrap();

        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();
        store.write_asset(b"downloaded").await.unwrap();
        let metadata = AssetMetadata::new("1.0").with_headers(CacheHeaders {
            etag: Some("\"v1\"".into()),
            last_modified: None,
        });
        store.write_metadata(&metadata).await;

        let store = store_at(temp_dir.path(), "2.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();

        assert_eq!(std::fs::read(store.asset_path()).unwrap(), b"base");
        let metadata = store.read_metadata().await;
        assert_eq!(metadata.app_version, "2.0");
        assert!(metadata.cache_headers.is_empty());
    }

    #[tokio::test]
    async fn test_read_asset_repairs_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();

        std::fs::remove_file(store.asset_path()).unwrap();

        let bytes = store.read_asset().await.unwrap();
        assert_eq!(bytes, b"base");
        assert_eq!(std::fs::read(store.asset_path()).unwrap(), b"base");
    }

    #[tokio::test]
    async fn test_write_asset_leaves_no_temp_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();

        store.write_asset(b"replacement").await.unwrap();

        assert_eq!(std::fs::read(store.asset_path()).unwrap(), b"replacement");
        let leftovers: Vec<_> = std::fs::read_dir(store.asset_path().parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_metadata_reads_as_fresh() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();

        std::fs::write(store.metadata_path(), b"not json").unwrap();

        let metadata = store.read_metadata().await;
        assert_eq!(metadata, AssetMetadata::new("1.0"));
    }

    #[tokio::test]
    async fn test_metadata_round_trip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = store_at(temp_dir.path(), "1.0", BaseSource::Bytes(b"base".to_vec()));
        store.bootstrap().await.unwrap();

        let metadata = AssetMetadata {
            app_version: "1.0".into(),
            cache_headers: CacheHeaders {
                etag: Some("\"v1\"".into()),
                last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
            },
            last_checked_at: Some(Utc::now()),
            last_updated_at: Some(Utc::now()),
            byte_count: Some(10),
            content_hash: Some("cafe".into()),
        };
        store.write_metadata(&metadata).await;

        assert_eq!(store.read_metadata().await, metadata);
    }
}
