//! Download collaborator: parallel fetches with ETag support.
//!
//! The metadata pipeline hands a batch of [`DownloadTarget`]s to a
//! [`Downloader`] and blocks until every target has completed, failed or
//! been cancelled. Downloads run concurrently; outcome processing happens
//! on the calling task, in target order.

mod http;

pub use http::{FetchResponse, HttpDownloader, HttpFetch, ReqwestFetch};

use bytes::Bytes;
use std::future::Future;
use thiserror::Error;

// Re-exported so front-ends can cancel updates without depending on
// tokio-util themselves.
pub use tokio_util::sync::CancellationToken;

/// One download the pipeline wants performed.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    /// Candidate URLs, tried in order until one succeeds.
    pub urls: Vec<String>,
    /// Expected size, when known, for progress weighting.
    pub size_hint: Option<u64>,
    /// Previously recorded ETag; sent as `If-None-Match`.
    pub etag: Option<String>,
    /// Expected SHA-256 of the body; mismatch is an integrity failure.
    pub expected_sha256: Option<String>,
}

impl DownloadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        DownloadTarget {
            urls: vec![url.into()],
            size_hint: None,
            etag: None,
            expected_sha256: None,
        }
    }

    pub fn with_etag(mut self, etag: Option<String>) -> Self {
        self.etag = etag;
        self
    }

    pub fn primary_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}

/// Completed body of a download.
#[derive(Debug, Clone)]
pub struct DownloadPayload {
    pub bytes: Bytes,
    /// ETag the server reported; `None` when the response carried none or
    /// was a 304.
    pub etag: Option<String>,
    /// Hex SHA-256 of `bytes`.
    pub sha256: String,
    /// Server answered 304 Not Modified; `bytes` is empty.
    pub not_modified: bool,
}

/// Result delivered for one target.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Index into the submitted target batch.
    pub target: usize,
    pub result: Result<DownloadPayload, DownloadError>,
}

/// Transport and verification failures.
#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    #[error("network error fetching {url}: {cause}")]
    Network { url: String, cause: String },

    #[error("download cancelled")]
    Cancelled,

    #[error("integrity failure for {url}: expected sha256 {expected}, got {actual}")]
    Integrity {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("download target has no url")]
    NoUrl,

    #[error("cannot read local file {path}: {cause}")]
    LocalFile { path: String, cause: String },
}

/// Parallel batch downloader.
///
/// Implementations run targets concurrently but must deliver the full
/// outcome vector sorted by target index, so callers can correlate results
/// without bookkeeping.
pub trait Downloader: Send + Sync {
    /// Download every target, resolving when all are done or cancelled.
    fn download_and_wait(
        &self,
        targets: Vec<DownloadTarget>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Vec<DownloadOutcome>> + Send;

    /// Fetch the current ETag of `url` without the body.
    fn head_etag(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Option<String>, DownloadError>> + Send;
}

/// Hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
