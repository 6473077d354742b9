pub mod config;
pub mod coordinator;
pub mod error;
pub mod fetch;
pub mod materialize;
pub mod metadata;
pub mod store;
pub mod utils;

pub use error::CacheError;

pub type Result<T> = std::result::Result<T, CacheError>;

pub mod prelude {
    pub use crate::config::{AssetCacheBuilder, BaseSource};
    pub use crate::coordinator::{AssetCache, RefreshOutcome};
    pub use crate::fetch::{FetchOutcome, Fetcher, HttpFetcher};
    pub use crate::materialize::{BoxError, Materializer};
    pub use crate::metadata::{AssetMetadata, AssetStatus, CacheHeaders};
}
