use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use hyper::{Body, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::CacheError;
use crate::metadata::CacheHeaders;
use crate::Result;

/// Result of one conditional exchange with the remote.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// The remote returned a fresh body.
    Modified { bytes: Bytes, headers: CacheHeaders },
    /// The remote confirmed the cached copy is current (HTTP 304).
    NotModified { headers: CacheHeaders },
}

/// Performs one conditional HTTP exchange. Timeouts are this port's
/// responsibility, not the coordinator's.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, headers: &CacheHeaders) -> Result<FetchOutcome>;
}

/// Default fetcher: a conditional GET over hyper with TLS support.
pub struct HttpFetcher {
    client: hyper::Client<HttpsConnector<HttpConnector>>,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let https = HttpsConnector::new();
        let client = hyper::Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build::<_, Body>(https);
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

fn conditional_request(url: &str, headers: &CacheHeaders) -> Result<Request<Body>> {
    let mut builder = Request::get(url);
    if let Some(etag) = &headers.etag {
        builder = builder.header(IF_NONE_MATCH, etag.as_str());
    }
    if let Some(last_modified) = &headers.last_modified {
        builder = builder.header(IF_MODIFIED_SINCE, last_modified.as_str());
    }
    builder
        .body(Body::empty())
        .map_err(|e| CacheError::Network(format!("Invalid request for {}: {}", url, e)))
}

fn captured_headers(response: &Response<Body>, previous: &CacheHeaders) -> CacheHeaders {
    let etag = response
        .headers()
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    let last_modified = response
        .headers()
        .get(LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    CacheHeaders {
        etag,
        last_modified,
    }
    .or_previous(previous)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, headers: &CacheHeaders) -> Result<FetchOutcome> {
        debug!(
            "Fetching {} (etag: {:?}, last-modified: {:?})",
            url, headers.etag, headers.last_modified
        );

        let request = conditional_request(url, headers)?;
        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| CacheError::Network(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            info!("Remote not modified: {}", url);
            return Ok(FetchOutcome::NotModified {
                headers: captured_headers(&response, headers),
            });
        }

        if !status.is_success() {
            warn!("Server returned status {} for {}", status, url);
            return Err(CacheError::Network(format!(
                "Server returned status: {}",
                status
            )));
        }

        let new_headers = captured_headers(&response, headers);
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| CacheError::Network(e.to_string()))?;

        info!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(FetchOutcome::Modified {
            bytes,
            headers: new_headers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conditional_request_sets_headers() {
        let headers = CacheHeaders {
            etag: Some("\"v1\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        };
        let request = conditional_request("http://example.com/asset", &headers).unwrap();
        assert_eq!(request.headers().get(IF_NONE_MATCH).unwrap(), "\"v1\"");
        assert_eq!(
            request.headers().get(IF_MODIFIED_SINCE).unwrap(),
            "Wed, 21 Oct 2015 07:28:00 GMT"
        );
    }

    #[test]
    fn test_conditional_request_omits_absent_headers() {
        let request =
            conditional_request("http://example.com/asset", &CacheHeaders::default()).unwrap();
        assert!(request.headers().get(IF_NONE_MATCH).is_none());
        assert!(request.headers().get(IF_MODIFIED_SINCE).is_none());
    }

    #[test]
    fn test_captured_headers_fall_back_to_previous() {
        let previous = CacheHeaders {
            etag: Some("\"old\"".into()),
            last_modified: Some("Wed, 21 Oct 2015 07:28:00 GMT".into()),
        };
        let response = Response::builder()
            .header(ETAG, "\"new\"")
            .body(Body::empty())
            .unwrap();

        let captured = captured_headers(&response, &previous);
        assert_eq!(captured.etag.as_deref(), Some("\"new\""));
        assert_eq!(
            captured.last_modified.as_deref(),
            Some("Wed, 21 Oct 2015 07:28:00 GMT")
        );
    }
}
