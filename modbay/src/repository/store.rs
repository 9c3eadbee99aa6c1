//! The repository metadata manager.
//!
//! Owns the cache directory, the per-repository in-memory indexes and the
//! ETag map, and runs the download/parse/persist/swap pipeline. The
//! in-memory map is replaced per repository with a pointer swap; readers
//! holding an `Arc` to an old index keep seeing consistent data until they
//! drop it.

use super::etag::{EtagStore, ETAGS_FILE_NAME};
use super::events::UpdatePublisher;
use super::types::{IndexParseError, RepoReference, Repository, RepositoryIndex};
use crate::arena::{ArenaId, IdArena};
use crate::download::{DownloadError, DownloadTarget, Downloader};
use crate::game::Game;
use crate::release::Release;
use crate::user::User;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Age after which a cached repository counts as stale.
pub const TIME_TILL_STALE: Duration = Duration::from_secs(3 * 24 * 60 * 60);

/// Age after which the UI should nag hard.
pub const TIME_TILL_VERY_STALE: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Outcome of a successful `update` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// At least one repository changed.
    Updated,
    /// Every repository was already current; nothing was downloaded.
    NoChanges,
    /// Update succeeded, but some repository uses a metadata spec newer
    /// than this client understands.
    OutdatedClient,
}

/// How old the cached metadata is, for UI nagging. The update pipeline
/// itself decides by ETag, not by age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    Fresh,
    Stale,
    VeryStale,
}

/// Why one repository failed to update.
#[derive(Debug, Error)]
pub enum RepoFailureCause {
    #[error(transparent)]
    Download(DownloadError),
    #[error(transparent)]
    Parse(IndexParseError),
}

/// One failed repository with its cause.
#[derive(Debug)]
pub struct RepoFailure {
    pub repository: Repository,
    pub cause: RepoFailureCause,
}

impl fmt::Display for RepoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.repository.name, self.cause)
    }
}

/// Aggregated per-repository failures from one update call.
#[derive(Debug)]
pub struct DownloadErrors {
    pub failures: Vec<RepoFailure>,
}

impl fmt::Display for DownloadErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.failures.iter().map(|f| f.to_string()).collect();
        write!(
            f,
            "failed to update {} repositories: {}",
            self.failures.len(),
            rendered.join("; ")
        )
    }
}

/// Errors from the update pipeline. Any of these means the pending ETag
/// changes were rolled back by re-reading `etags.json` from disk.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to refresh game build list: {0}")]
    GameVersions(String),

    #[error("network error fetching {url}: {cause}")]
    Network {
        url: String,
        #[source]
        cause: DownloadError,
    },

    #[error("{0}")]
    DownloadErrors(DownloadErrors),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Multi-repository metadata store.
pub struct RepoDataManager {
    cache_dir: PathBuf,
    indexes: RwLock<HashMap<String, Arc<RepositoryIndex>>>,
    etags: Mutex<EtagStore>,
    publisher: UpdatePublisher,
    references: Mutex<Vec<RepoReference>>,
    ids: Mutex<IdArena<String>>,
}

impl RepoDataManager {
    /// Open a store over `cache_dir`, reading any existing `etags.json`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        let etags = EtagStore::load(&cache_dir.join(ETAGS_FILE_NAME));
        RepoDataManager {
            cache_dir,
            indexes: RwLock::new(HashMap::new()),
            etags: Mutex::new(etags),
            publisher: UpdatePublisher::new(),
            references: Mutex::new(Vec::new()),
            ids: Mutex::new(IdArena::new()),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Event publisher for `updated` notifications.
    pub fn publisher(&self) -> &UpdatePublisher {
        &self.publisher
    }

    fn cache_path(&self, repo: &Repository) -> PathBuf {
        self.cache_dir.join(repo.cache_file_name())
    }

    /// In-memory index for a repository, if loaded.
    pub fn index_for(&self, repo: &Repository) -> Option<Arc<RepositoryIndex>> {
        self.indexes
            .read()
            .unwrap()
            .get(&repo.cache_key())
            .map(Arc::clone)
    }

    /// Load cached repository files that exist on disk but are not yet in
    /// memory. Progress is a single 0..100 scalar weighted by file size.
    pub fn prepopulate(&self, repos: &[Repository], user: &dyn User) {
        let pending: Vec<(Repository, u64)> = distinct_by_uri(repos)
            .into_iter()
            .filter(|repo| self.index_for(repo).is_none())
            .filter_map(|repo| {
                let size = std::fs::metadata(self.cache_path(&repo)).ok()?.len();
                Some((repo, size))
            })
            .collect();

        let total: u64 = pending.iter().map(|(_, size)| *size).sum::<u64>().max(1);
        let mut done: u64 = 0;

        for (repo, size) in pending {
            match self.load_from_disk(&repo) {
                Ok(index) => {
                    info!(
                        repo = %repo.name,
                        modules = index.catalog().module_count(),
                        "loaded cached repository"
                    );
                }
                Err(e) => {
                    warn!(repo = %repo.name, error = %e, "ignoring unreadable cache file");
                }
            }
            done += size;
            let percent = (done * 100 / total) as u8;
            user.raise_progress(&format!("Loading cached repository {}", repo.name), percent);
        }
    }

    fn load_from_disk(&self, repo: &Repository) -> Result<Arc<RepositoryIndex>, RepoFailureCause> {
        let bytes = std::fs::read(self.cache_path(repo)).map_err(|e| {
            RepoFailureCause::Download(DownloadError::LocalFile {
                path: self.cache_path(repo).display().to_string(),
                cause: e.to_string(),
            })
        })?;
        let index = RepositoryIndex::from_json(&bytes).map_err(RepoFailureCause::Parse)?;
        let arc = Arc::new(index);
        self.indexes
            .write()
            .unwrap()
            .insert(repo.cache_key(), Arc::clone(&arc));
        Ok(arc)
    }

    /// Run the full metadata update pipeline.
    ///
    /// Any failure rolls pending ETag changes back by re-reading
    /// `etags.json`; index swaps that completed before the failure are
    /// deliberately kept. Their ETags are gone from the pending map, so the
    /// next update re-downloads them rather than serving something
    /// inconsistent.
    #[allow(clippy::too_many_arguments)]
    pub async fn update<G: Game, D: Downloader>(
        &self,
        repos: &[Repository],
        game: &G,
        skip_etags: bool,
        downloader: &D,
        cancel: &CancellationToken,
        user: &dyn User,
        user_agent: &str,
    ) -> Result<UpdateResult, UpdateError> {
        game.refresh_versions(user_agent)
            .await
            .map_err(|e| UpdateError::GameVersions(e.to_string()))?;

        let distinct = distinct_by_uri(repos);

        let mut to_update = Vec::new();
        for repo in &distinct {
            if self.needs_update(repo, skip_etags, downloader).await {
                to_update.push(repo.clone());
            }
        }

        if to_update.is_empty() {
            debug!("all repositories current, touching cache files");
            self.touch_cache_files(&distinct);
            user.raise_message("All repositories already up to date.");
            return Ok(UpdateResult::NoChanges);
        }

        info!(count = to_update.len(), "updating repositories");
        user.raise_progress(&format!("Updating {} repositories", to_update.len()), 0);

        let targets: Vec<DownloadTarget> = to_update
            .iter()
            .map(|repo| {
                let etag = if skip_etags {
                    None
                } else {
                    self.etags
                        .lock()
                        .unwrap()
                        .get(&repo.uri)
                        .map(|s| s.to_string())
                };
                DownloadTarget::new(repo.uri.clone()).with_etag(etag)
            })
            .collect();

        let outcomes = downloader.download_and_wait(targets, cancel).await;

        // Completion processing happens here, on the calling task, in
        // target order.
        let mut by_target: HashMap<usize, &crate::download::DownloadOutcome> =
            outcomes.iter().map(|outcome| (outcome.target, outcome)).collect();
        let mut pending: Vec<(String, Option<String>)> = Vec::new();
        let mut changed: Vec<Repository> = Vec::new();
        let total = to_update.len();

        for (position, repo) in to_update.iter().enumerate() {
            let Some(outcome) = by_target.remove(&position) else {
                // A download task died without delivering; treat like a
                // cancellation.
                self.rollback_etags();
                return Err(UpdateError::Network {
                    url: repo.uri.clone(),
                    cause: DownloadError::Cancelled,
                });
            };
            let payload = match &outcome.result {
                Ok(payload) => payload,
                Err(e) => {
                    user.raise_error(&format!("Failed to download {}: {}", repo.name, e));
                    self.rollback_etags();
                    return Err(UpdateError::Network {
                        url: repo.uri.clone(),
                        cause: e.clone(),
                    });
                }
            };

            // Record a fresh ETag, clear on 304/empty responses.
            pending.push((repo.uri.clone(), payload.etag.clone()));

            if payload.not_modified || payload.bytes.is_empty() {
                debug!(repo = %repo.name, "repository content unchanged");
                if self.index_for(repo).is_none() {
                    if let Err(e) = self.load_from_disk(repo) {
                        warn!(repo = %repo.name, error = %e, "no usable cached copy");
                    }
                }
                continue;
            }

            let index = match RepositoryIndex::from_json(&payload.bytes) {
                Ok(index) => index,
                Err(e) => {
                    user.raise_error(&format!("Failed to parse {}: {}", repo.name, e));
                    self.rollback_etags();
                    return Err(UpdateError::DownloadErrors(DownloadErrors {
                        failures: vec![RepoFailure {
                            repository: repo.clone(),
                            cause: RepoFailureCause::Parse(e),
                        }],
                    }));
                }
            };

            // Disk first, then the pointer swap: a reader observing the new
            // index is guaranteed the on-disk copy exists. The raw bytes are
            // persisted so fields we do not model survive on disk.
            if let Err(e) = crate::fsutil::write_atomic(&self.cache_path(repo), &payload.bytes) {
                self.rollback_etags();
                return Err(UpdateError::Io(e));
            }

            self.record_references(repo, &index);
            debug!(
                repo = %repo.name,
                modules = index.catalog().module_count(),
                sha256 = %payload.sha256,
                "repository index swapped"
            );
            self.indexes
                .write()
                .unwrap()
                .insert(repo.cache_key(), Arc::new(index));
            changed.push(repo.clone());

            let percent = ((position + 1) * 100 / total) as u8;
            user.raise_progress(&format!("Updated {}", repo.name), percent);
        }

        {
            let mut etags = self.etags.lock().unwrap();
            for (url, etag) in pending {
                match etag {
                    Some(etag) => etags.set(url, etag),
                    None => etags.clear(&url),
                }
            }
            if let Err(e) = etags.save() {
                etags.reload();
                return Err(UpdateError::Io(e));
            }
        }

        self.publisher.emit_updated(&changed);
        info!(changed = changed.len(), "repository update complete");

        let outdated = distinct
            .iter()
            .filter_map(|repo| self.index_for(repo))
            .any(|index| index.unsupported_spec());
        if outdated {
            user.raise_error(
                "Some repositories use a newer metadata format; please upgrade this client.",
            );
            Ok(UpdateResult::OutdatedClient)
        } else {
            Ok(UpdateResult::Updated)
        }
    }

    async fn needs_update<D: Downloader>(
        &self,
        repo: &Repository,
        skip_etags: bool,
        downloader: &D,
    ) -> bool {
        if repo.uri.is_empty() {
            return true;
        }
        if repo.is_local() || skip_etags {
            return true;
        }
        let recorded = self
            .etags
            .lock()
            .unwrap()
            .get(&repo.uri)
            .map(|s| s.to_string());
        let Some(recorded) = recorded else {
            return true;
        };
        if !self.cache_path(repo).exists() {
            return true;
        }
        match downloader.head_etag(&repo.uri).await {
            Ok(Some(remote)) => remote != recorded,
            Ok(None) => true,
            Err(e) => {
                debug!(repo = %repo.name, error = %e, "HEAD check failed, treating as stale");
                true
            }
        }
    }

    fn rollback_etags(&self) {
        warn!("update failed, rolling back pending etag changes");
        self.etags.lock().unwrap().reload();
    }

    fn record_references(&self, referrer: &Repository, index: &RepositoryIndex) {
        let mut references = self.references.lock().unwrap();
        references.retain(|edge| edge.referrer != *referrer);
        for referenced in index.referenced_repositories() {
            references.push(RepoReference {
                referrer: referrer.clone(),
                referenced: referenced.clone(),
            });
        }
    }

    /// Endorsement edges gathered from repository metadata.
    pub fn repo_references(&self) -> Vec<RepoReference> {
        self.references.lock().unwrap().clone()
    }

    fn touch_cache_files(&self, repos: &[Repository]) {
        for repo in repos {
            let path = self.cache_path(repo);
            if let Ok(file) = std::fs::OpenOptions::new().append(true).open(&path) {
                let now = std::fs::FileTimes::new().set_modified(SystemTime::now());
                let _ = file.set_times(now);
            }
        }
    }

    /// Releases for `identifier` across `repos`, in `(priority asc, name
    /// asc)` repository order, newest release first within a repository.
    pub fn get_available_modules(
        &self,
        repos: &[Repository],
        identifier: &str,
    ) -> Vec<Arc<Release>> {
        let mut out = Vec::new();
        for repo in priority_sorted(repos) {
            if let Some(index) = self.index_for(&repo) {
                out.extend(index.releases_for(identifier).map(Arc::clone));
            }
        }
        out
    }

    /// Every release in every repository, priority order, first occurrence
    /// of an `(identifier, version)` pair winning.
    pub fn all_available(&self, repos: &[Repository]) -> Vec<Arc<Release>> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut out = Vec::new();
        for repo in priority_sorted(repos) {
            if let Some(index) = self.index_for(&repo) {
                for release in index.catalog().all_releases() {
                    let key = (release.identifier.clone(), release.version.to_string());
                    if seen.insert(key) {
                        out.push(Arc::clone(release));
                    }
                }
            }
        }
        out
    }

    /// First non-zero download count in priority order.
    pub fn get_download_count(&self, repos: &[Repository], identifier: &str) -> Option<u64> {
        for repo in priority_sorted(repos) {
            if let Some(index) = self.index_for(&repo) {
                match index.download_count(identifier) {
                    Some(count) if count > 0 => return Some(count),
                    _ => continue,
                }
            }
        }
        None
    }

    /// Minimum age-since-mtime across stale repositories; zero when none
    /// are stale.
    pub fn last_update(&self, repos: &[Repository]) -> Duration {
        distinct_by_uri(repos)
            .iter()
            .filter_map(|repo| self.cache_age(repo))
            .filter(|age| *age > TIME_TILL_STALE)
            .min()
            .unwrap_or(Duration::ZERO)
    }

    /// Freshness classification from cache-file mtimes. A repository with
    /// no cache file at all counts as very stale.
    pub fn staleness(&self, repos: &[Repository]) -> Staleness {
        let mut worst = Duration::ZERO;
        for repo in distinct_by_uri(repos) {
            match self.cache_age(&repo) {
                Some(age) => worst = worst.max(age),
                None => return Staleness::VeryStale,
            }
        }
        if worst > TIME_TILL_VERY_STALE {
            Staleness::VeryStale
        } else if worst > TIME_TILL_STALE {
            Staleness::Stale
        } else {
            Staleness::Fresh
        }
    }

    fn cache_age(&self, repo: &Repository) -> Option<Duration> {
        let mtime = std::fs::metadata(self.cache_path(repo))
            .ok()?
            .modified()
            .ok()?;
        SystemTime::now().duration_since(mtime).ok()
    }

    /// Transient GUI-facing ID for a module identifier.
    pub fn module_id(&self, identifier: &str) -> ArenaId {
        self.ids
            .lock()
            .unwrap()
            .lookup_or_register(identifier.to_string())
    }

    /// Identifier behind a transient ID; stale IDs yield `None`.
    pub fn module_for_id(&self, id: ArenaId) -> Option<String> {
        self.ids.lock().unwrap().get(id).cloned()
    }

    #[cfg(test)]
    pub(crate) fn etag_of(&self, url: &str) -> Option<String> {
        self.etags.lock().unwrap().get(url).map(|s| s.to_string())
    }
}

fn distinct_by_uri(repos: &[Repository]) -> Vec<Repository> {
    let mut seen = HashSet::new();
    repos
        .iter()
        .filter(|repo| seen.insert(repo.uri.clone()))
        .cloned()
        .collect()
}

fn priority_sorted(repos: &[Repository]) -> Vec<Repository> {
    let mut sorted = distinct_by_uri(repos);
    sorted.sort();
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{DownloadOutcome, DownloadPayload};
    use crate::game::StaticGame;
    use crate::user::NullUser;
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    /// Canned downloader: per-URL bodies or failures, plus a request log.
    struct MockDownloader {
        bodies: HashMap<String, Result<(String, Option<String>), DownloadError>>,
        head_etags: HashMap<String, Option<String>>,
        gets: StdMutex<Vec<String>>,
    }

    impl MockDownloader {
        fn new() -> Self {
            MockDownloader {
                bodies: HashMap::new(),
                head_etags: HashMap::new(),
                gets: StdMutex::new(Vec::new()),
            }
        }

        fn body(mut self, url: &str, body: &str, etag: Option<&str>) -> Self {
            self.bodies.insert(
                url.to_string(),
                Ok((body.to_string(), etag.map(|e| e.to_string()))),
            );
            self.head_etags
                .insert(url.to_string(), etag.map(|e| e.to_string()));
            self
        }

        fn failing(mut self, url: &str) -> Self {
            self.bodies.insert(
                url.to_string(),
                Err(DownloadError::Network {
                    url: url.to_string(),
                    cause: "connection refused".to_string(),
                }),
            );
            self
        }

        fn get_count(&self) -> usize {
            self.gets.lock().unwrap().len()
        }
    }

    impl Downloader for MockDownloader {
        async fn download_and_wait(
            &self,
            targets: Vec<DownloadTarget>,
            _cancel: &CancellationToken,
        ) -> Vec<DownloadOutcome> {
            targets
                .into_iter()
                .enumerate()
                .map(|(index, target)| {
                    let url = target.primary_url().unwrap_or("").to_string();
                    self.gets.lock().unwrap().push(url.clone());
                    let result = match self.bodies.get(&url) {
                        Some(Ok((body, etag))) => Ok(DownloadPayload {
                            bytes: Bytes::from(body.clone()),
                            etag: etag.clone(),
                            sha256: crate::download::sha256_hex(body.as_bytes()),
                            not_modified: false,
                        }),
                        Some(Err(e)) => Err(e.clone()),
                        None => Err(DownloadError::Network {
                            url: url.clone(),
                            cause: "no mock response".to_string(),
                        }),
                    };
                    DownloadOutcome {
                        target: index,
                        result,
                    }
                })
                .collect()
        }

        async fn head_etag(&self, url: &str) -> Result<Option<String>, DownloadError> {
            Ok(self.head_etags.get(url).cloned().flatten())
        }
    }

    fn game() -> StaticGame {
        StaticGame::new(
            "KSP",
            "https://meta.example.com/repositories.json",
            "https://meta.example.com/default.json",
            vec!["1.12.5".parse().unwrap()],
        )
    }

    fn repo_json(identifier: &str) -> String {
        format!(
            r#"{{"releases": [{{"identifier": "{}", "version": "1.0"}}]}}"#,
            identifier
        )
    }

    #[tokio::test]
    async fn test_update_downloads_and_persists() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        let downloader = MockDownloader::new().body(
            "https://a.example/repo.json",
            &repo_json("ModuleManager"),
            Some("\"v1\""),
        );

        let result = manager
            .update(
                &[repo.clone()],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();

        assert_eq!(result, UpdateResult::Updated);
        assert!(dir.path().join(repo.cache_file_name()).exists());
        assert_eq!(
            manager.etag_of("https://a.example/repo.json").as_deref(),
            Some("\"v1\"")
        );
        assert_eq!(
            manager
                .get_available_modules(&[repo.clone()], "ModuleManager")
                .len(),
            1
        );

        // On-disk etags.json matches the in-memory map.
        let saved = std::fs::read_to_string(dir.path().join(ETAGS_FILE_NAME)).unwrap();
        assert!(saved.contains("\\\"v1\\\""));
    }

    #[tokio::test]
    async fn test_etag_short_circuit_second_update() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        let downloader = MockDownloader::new().body(
            "https://a.example/repo.json",
            &repo_json("ModuleManager"),
            Some("\"v1\""),
        );

        let first = manager
            .update(
                &[repo.clone()],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();
        assert_eq!(first, UpdateResult::Updated);
        assert_eq!(downloader.get_count(), 1);

        let etags_before = std::fs::read(dir.path().join(ETAGS_FILE_NAME)).unwrap();

        let second = manager
            .update(
                &[repo.clone()],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();
        assert_eq!(second, UpdateResult::NoChanges);
        // No further GET was issued.
        assert_eq!(downloader.get_count(), 1);

        let etags_after = std::fs::read(dir.path().join(ETAGS_FILE_NAME)).unwrap();
        assert_eq!(etags_before, etags_after);
    }

    #[tokio::test]
    async fn test_partial_failure_rolls_back_all_etags() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let good = Repository::new("good", "https://good.example/repo.json", 0);
        let bad = Repository::new("bad", "https://bad.example/repo.json", 1);
        let downloader = MockDownloader::new()
            .body(
                "https://good.example/repo.json",
                &repo_json("ModuleManager"),
                Some("\"g1\""),
            )
            .body("https://bad.example/repo.json", "{not json", Some("\"b1\""));

        let result = manager
            .update(
                &[good.clone(), bad.clone()],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await;

        assert!(matches!(result, Err(UpdateError::DownloadErrors(_))));
        // No ETag was recorded for the repo that succeeded either, so a
        // retry re-downloads it.
        assert_eq!(manager.etag_of("https://good.example/repo.json"), None);
        assert_eq!(manager.etag_of("https://bad.example/repo.json"), None);
        // The swap that completed before the failure is kept.
        assert!(manager.index_for(&good).is_some());
    }

    #[tokio::test]
    async fn test_transport_failure_is_network_error() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let repo = Repository::new("main", "https://down.example/repo.json", 0);
        let downloader = MockDownloader::new().failing("https://down.example/repo.json");

        let result = manager
            .update(
                &[repo],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await;
        assert!(matches!(result, Err(UpdateError::Network { .. })));
    }

    #[tokio::test]
    async fn test_unsupported_spec_reports_outdated_client() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        let body = r#"{"releases": [{"identifier": "X", "version": "1.0", "spec_version": 99}]}"#;
        let downloader =
            MockDownloader::new().body("https://a.example/repo.json", body, Some("\"v1\""));

        let result = manager
            .update(
                &[repo],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::OutdatedClient);
    }

    #[tokio::test]
    async fn test_updated_event_fires_with_changed_repos() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        let downloader = MockDownloader::new().body(
            "https://a.example/repo.json",
            &repo_json("ModuleManager"),
            Some("\"v1\""),
        );

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        manager.publisher().subscribe(move |repos| {
            sink.lock()
                .unwrap()
                .extend(repos.iter().map(|r| r.name.clone()));
        });

        manager
            .update(
                &[repo],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();

        assert_eq!(seen.lock().unwrap().as_slice(), ["main"]);
    }

    #[tokio::test]
    async fn test_prepopulate_loads_from_disk() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        std::fs::write(
            dir.path().join(repo.cache_file_name()),
            repo_json("CachedMod"),
        )
        .unwrap();

        let manager = RepoDataManager::new(dir.path());
        assert!(manager.index_for(&repo).is_none());
        manager.prepopulate(&[repo.clone()], &NullUser);
        assert!(manager.index_for(&repo).is_some());
        assert_eq!(
            manager.get_available_modules(&[repo], "CachedMod").len(),
            1
        );
    }

    #[tokio::test]
    async fn test_priority_ordering_of_queries() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let primary = Repository::new("primary", "https://p.example/repo.json", 0);
        let secondary = Repository::new("secondary", "https://s.example/repo.json", 5);

        let primary_body = r#"{"releases": [{"identifier": "MM", "version": "2.0"}],
                               "download_counts": {"MM": 0}}"#;
        let secondary_body = r#"{"releases": [{"identifier": "MM", "version": "1.0"}],
                                 "download_counts": {"MM": 777}}"#;
        let downloader = MockDownloader::new()
            .body("https://p.example/repo.json", primary_body, Some("\"p\""))
            .body("https://s.example/repo.json", secondary_body, Some("\"s\""));

        manager
            .update(
                &[secondary.clone(), primary.clone()],
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay/0.4",
            )
            .await
            .unwrap();

        let repos = [secondary.clone(), primary.clone()];
        let releases = manager.get_available_modules(&repos, "MM");
        let versions: Vec<String> = releases.iter().map(|r| r.version.to_string()).collect();
        // Priority 0 repo first, then priority 5.
        assert_eq!(versions, ["2.0", "1.0"]);

        // First non-zero count wins, skipping the higher-priority zero.
        assert_eq!(manager.get_download_count(&repos, "MM"), Some(777));
    }

    #[tokio::test]
    async fn test_prepopulate_reports_progress() {
        use crate::user::test_support::RecordingUser;

        let dir = TempDir::new().unwrap();
        let first = Repository::new("first", "https://a.example/repo.json", 0);
        let second = Repository::new("second", "https://b.example/repo.json", 1);
        std::fs::write(dir.path().join(first.cache_file_name()), repo_json("A")).unwrap();
        std::fs::write(dir.path().join(second.cache_file_name()), repo_json("B")).unwrap();

        let manager = RepoDataManager::new(dir.path());
        let user = RecordingUser::default();
        manager.prepopulate(&[first, second], &user);

        let progress = user.progress.lock().unwrap();
        assert_eq!(progress.len(), 2);
        // Progress ends at 100 and never decreases.
        assert_eq!(progress.last().unwrap().1, 100);
        assert!(progress[0].1 <= progress[1].1);
    }

    #[test]
    fn test_module_ids_are_stable() {
        let dir = TempDir::new().unwrap();
        let manager = RepoDataManager::new(dir.path());
        let a = manager.module_id("ModuleManager");
        let b = manager.module_id("ModuleManager");
        assert_eq!(a, b);
        assert_eq!(manager.module_for_id(a).as_deref(), Some("ModuleManager"));
    }

    #[test]
    fn test_last_update_zero_when_fresh() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        std::fs::write(dir.path().join(repo.cache_file_name()), "{}").unwrap();
        let manager = RepoDataManager::new(dir.path());
        assert_eq!(manager.last_update(&[repo]), Duration::ZERO);
    }

    #[test]
    fn test_staleness_missing_file_is_very_stale() {
        let dir = TempDir::new().unwrap();
        let repo = Repository::new("main", "https://a.example/repo.json", 0);
        let manager = RepoDataManager::new(dir.path());
        assert_eq!(manager.staleness(&[repo]), Staleness::VeryStale);
    }
}
