//! HTTP fetch abstraction and the reqwest-backed batch downloader.

use super::{
    sha256_hex, DownloadError, DownloadOutcome, DownloadPayload, DownloadTarget, Downloader,
};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Low-level HTTP operations, abstracted for dependency injection in tests.
pub trait HttpFetch: Send + Sync {
    /// GET `url`, sending `If-None-Match` when an ETag is supplied.
    fn get(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> impl Future<Output = Result<FetchResponse, DownloadError>> + Send;

    /// HEAD `url` and return its ETag header, if any.
    fn head_etag(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<String>, DownloadError>> + Send;
}

/// Response of a single fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn not_modified(&self) -> bool {
        self.status == 304
    }
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestFetch {
    client: reqwest::Client,
}

impl ReqwestFetch {
    /// Create a client with the given timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| DownloadError::Network {
                url: String::new(),
                cause: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(ReqwestFetch { client })
    }
}

impl HttpFetch for ReqwestFetch {
    async fn get(&self, url: &str, etag: Option<&str>) -> Result<FetchResponse, DownloadError> {
        trace!(url = url, conditional = etag.is_some(), "HTTP GET starting");

        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header("If-None-Match", etag);
        }

        let response = request.send().await.map_err(|e| {
            warn!(url = url, error = %e, is_timeout = e.is_timeout(), "HTTP request failed");
            DownloadError::Network {
                url: url.to_string(),
                cause: e.to_string(),
            }
        })?;

        let status = response.status();
        if status.as_u16() == 304 {
            debug!(url = url, "not modified");
            return Ok(FetchResponse {
                status: 304,
                etag: None,
                body: Bytes::new(),
            });
        }
        if !status.is_success() {
            warn!(url = url, status = status.as_u16(), "HTTP error status");
            return Err(DownloadError::Network {
                url: url.to_string(),
                cause: format!("HTTP {}", status),
            });
        }

        let etag = header_string(response.headers(), "etag");
        let body = response.bytes().await.map_err(|e| DownloadError::Network {
            url: url.to_string(),
            cause: format!("failed to read response: {}", e),
        })?;

        trace!(url = url, bytes = body.len(), "HTTP response body read");
        Ok(FetchResponse {
            status: status.as_u16(),
            etag,
            body,
        })
    }

    async fn head_etag(&self, url: &str) -> Result<Option<String>, DownloadError> {
        let response = self
            .client
            .head(url)
            .send()
            .await
            .map_err(|e| DownloadError::Network {
                url: url.to_string(),
                cause: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(DownloadError::Network {
                url: url.to_string(),
                cause: format!("HTTP {}", response.status()),
            });
        }

        Ok(header_string(response.headers(), "etag"))
    }
}

fn header_string(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

/// Batch downloader over any [`HttpFetch`].
///
/// Targets run concurrently on a [`JoinSet`]; results are collected as they
/// complete and returned sorted by target index. Cancellation aborts every
/// in-flight fetch.
pub struct HttpDownloader<F> {
    fetch: Arc<F>,
}

impl<F: HttpFetch + Send + Sync + 'static> HttpDownloader<F> {
    pub fn new(fetch: F) -> Self {
        HttpDownloader {
            fetch: Arc::new(fetch),
        }
    }

    async fn fetch_target(
        fetch: Arc<F>,
        target: DownloadTarget,
        cancel: CancellationToken,
    ) -> Result<DownloadPayload, DownloadError> {
        if target.urls.is_empty() {
            return Err(DownloadError::NoUrl);
        }

        let mut last_error = DownloadError::NoUrl;
        for url in &target.urls {
            let attempt = Self::fetch_url(&fetch, url, &target, &cancel).await;
            match attempt {
                Ok(payload) => return Ok(payload),
                Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
                Err(e) => {
                    debug!(url = url, error = %e, "download attempt failed, trying next url");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn fetch_url(
        fetch: &F,
        url: &str,
        target: &DownloadTarget,
        cancel: &CancellationToken,
    ) -> Result<DownloadPayload, DownloadError> {
        // file:// repositories are read straight off disk; no ETag dance.
        if let Some(path) = url.strip_prefix("file://") {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| DownloadError::LocalFile {
                    path: path.to_string(),
                    cause: e.to_string(),
                })?;
            let sha256 = sha256_hex(&bytes);
            return Ok(DownloadPayload {
                bytes: Bytes::from(bytes),
                etag: None,
                sha256,
                not_modified: false,
            });
        }

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = fetch.get(url, target.etag.as_deref()) => response?,
        };

        if response.not_modified() {
            return Ok(DownloadPayload {
                bytes: Bytes::new(),
                etag: None,
                sha256: sha256_hex(&[]),
                not_modified: true,
            });
        }

        let sha256 = sha256_hex(&response.body);
        if let Some(expected) = &target.expected_sha256 {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return Err(DownloadError::Integrity {
                    url: url.to_string(),
                    expected: expected.clone(),
                    actual: sha256,
                });
            }
        }

        Ok(DownloadPayload {
            bytes: response.body,
            etag: response.etag,
            sha256,
            not_modified: false,
        })
    }
}

impl<F: HttpFetch + Send + Sync + 'static> Downloader for HttpDownloader<F> {
    async fn download_and_wait(
        &self,
        targets: Vec<DownloadTarget>,
        cancel: &CancellationToken,
    ) -> Vec<DownloadOutcome> {
        let mut downloads = JoinSet::new();
        for (index, target) in targets.into_iter().enumerate() {
            let fetch = Arc::clone(&self.fetch);
            let cancel = cancel.clone();
            downloads.spawn(async move {
                let result = Self::fetch_target(fetch, target, cancel).await;
                DownloadOutcome {
                    target: index,
                    result,
                }
            });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = downloads.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(join_err) => {
                    warn!(error = %join_err, "download task panicked");
                }
            }
        }
        outcomes.sort_by_key(|outcome| outcome.target);
        outcomes
    }

    async fn head_etag(&self, url: &str) -> Result<Option<String>, DownloadError> {
        self.fetch.head_etag(url).await
    }
}
