use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conditional-request tokens captured from the remote. Both values are
/// opaque; equality is byte-exact and no format validation is performed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheHeaders {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl CacheHeaders {
    pub fn is_empty(&self) -> bool {
        self.etag.is_none() && self.last_modified.is_none()
    }

    /// Fills any field the newer capture is missing from the previous value.
    pub fn or_previous(mut self, previous: &CacheHeaders) -> Self {
        if self.etag.is_none() {
            self.etag = previous.etag.clone();
        }
        if self.last_modified.is_none() {
            self.last_modified = previous.last_modified.clone();
        }
        self
    }
}

/// Provenance record persisted as a side-file next to the asset bytes.
/// Only valid for the app version it was written under; anything else is
/// treated as absent by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMetadata {
    pub app_version: String,
    #[serde(default)]
    pub cache_headers: CacheHeaders,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub byte_count: Option<u64>,
    pub content_hash: Option<String>,
}

impl AssetMetadata {
    pub fn new(app_version: impl Into<String>) -> Self {
        Self {
            app_version: app_version.into(),
            cache_headers: CacheHeaders::default(),
            last_checked_at: None,
            last_updated_at: None,
            byte_count: None,
            content_hash: None,
        }
    }

    pub fn with_headers(mut self, headers: CacheHeaders) -> Self {
        self.cache_headers = headers;
        self
    }
}

/// Read-only snapshot exposed to callers. Recomputed after every
/// state-changing operation; never drives behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetStatus {
    pub url: String,
    pub file_name: String,
    pub app_version: String,
    pub cache_headers: CacheHeaders,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub byte_count: Option<u64>,
    pub content_hash: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_or_previous() {
        let previous = CacheHeaders {
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        };

        let merged = CacheHeaders {
            etag: Some("\"v2\"".into()),
            last_modified: None,
        }
        .or_previous(&previous);

        assert_eq!(merged.etag.as_deref(), Some("\"v2\""));
        assert_eq!(
            merged.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );

        let kept = CacheHeaders::default().or_previous(&previous);
        assert_eq!(kept, previous);
    }

    #[test]
    fn test_metadata_round_trip_with_absent_fields() {
        let metadata = AssetMetadata::new("1.0.0");
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: AssetMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
        assert!(parsed.cache_headers.is_empty());
        assert!(parsed.last_updated_at.is_none());
    }

    #[test]
    fn test_metadata_round_trip_with_all_fields() {
        let metadata = AssetMetadata {
            app_version: "2.1.0".into(),
            cache_headers: CacheHeaders {
                etag: Some("\"abc\"".into()),
                last_modified: Some("Thu, 01 Jan 2026 00:00:00 GMT".into()),
            },
            last_checked_at: Some(Utc::now()),
            last_updated_at: Some(Utc::now()),
            byte_count: Some(42),
            content_hash: Some("deadbeef".into()),
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let parsed: AssetMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
