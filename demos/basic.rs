use remote_asset_cache::materialize::BoxError;
use remote_asset_cache::prelude::*;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting remote asset cache demo");

    let cache = AssetCache::<String>::builder()
        .base_bytes("<html>placeholder</html>".as_bytes().to_vec())
        .url("https://example.com/")
        .materializer(|bytes: &[u8]| -> Result<String, BoxError> {
            String::from_utf8(bytes.to_vec()).map_err(Into::into)
        })
        .cache_dir("./demo_cache")
        .app_version("demo-1.0")
        .refresh_on_init(false)
        .build()
        .await?;

    let status = cache.status().await;
    info!("Initial status:");
    info!("  - File name: {}", status.file_name);
    info!("  - Byte count: {:?}", status.byte_count);
    info!("  - Content hash: {:?}", status.content_hash);

    match cache.refresh().await {
        Ok(outcome) => info!("Refresh outcome: {:?}", outcome),
        Err(e) => warn!("Refresh failed: {}", e),
    }

    if let Some(asset) = cache.asset().await {
        info!("Loaded asset: {} characters", asset.len());
    }

    let status = cache.status().await;
    info!("Status after refresh:");
    info!("  - ETag: {:?}", status.cache_headers.etag);
    info!("  - Last checked: {:?}", status.last_checked_at);
    info!("  - Last updated: {:?}", status.last_updated_at);

    // A second refresh goes out with the captured validators and should
    // come back 304 if the remote supports conditional requests.
    cache.start_auto_refresh(Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    cache.stop_auto_refresh().await;

    info!("Demo completed");
    Ok(())
}
