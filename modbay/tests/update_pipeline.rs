//! Integration tests for the metadata update pipeline through the public
//! API, with a scripted downloader standing in for the network.

use modbay::download::{
    sha256_hex, CancellationToken, DownloadError, DownloadOutcome, DownloadPayload,
    DownloadTarget, Downloader,
};
use modbay::game::StaticGame;
use modbay::repository::{RepoDataManager, Repository, UpdateError, UpdateResult};
use modbay::user::NullUser;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use tempfile::TempDir;

/// Scripted downloader: canned body + etag per URL.
#[derive(Default)]
struct ScriptedDownloader {
    responses: Mutex<HashMap<String, (String, Option<String>)>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedDownloader {
    fn serve(self, url: &str, body: &str, etag: Option<&str>) -> Self {
        self.responses.lock().unwrap().insert(
            url.to_string(),
            (body.to_string(), etag.map(|e| e.to_string())),
        );
        self
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Downloader for ScriptedDownloader {
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
                self.requests.lock().unwrap().push(url.clone());
                let result = match self.responses.lock().unwrap().get(&url) {
                    Some((body, etag)) => Ok(DownloadPayload {
                        bytes: Bytes::from(body.clone()),
                        etag: etag.clone(),
                        sha256: sha256_hex(body.as_bytes()),
                        not_modified: false,
                    }),
                    None => Err(DownloadError::Network {
                        url,
                        cause: "unscripted url".to_string(),
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
        Ok(self
            .responses
            .lock()
            .unwrap()
            .get(url)
            .and_then(|(_, etag)| etag.clone()))
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

const CATALOG: &str = r#"{"releases": [
    {"identifier": "ModuleManager", "version": "4.2.2",
     "download": "https://example.com/mm.zip"}
]}"#;

#[tokio::test]
async fn update_then_query_across_restart() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::new("main", "https://mods.example.com/repo.json", 0);
    let downloader = ScriptedDownloader::default().serve(
        "https://mods.example.com/repo.json",
        CATALOG,
        Some("\"r1\""),
    );

    {
        let manager = RepoDataManager::new(dir.path());
        let result = manager
            .update(
                std::slice::from_ref(&repo),
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay-test",
            )
            .await
            .unwrap();
        assert_eq!(result, UpdateResult::Updated);
    }

    // A fresh manager over the same cache dir sees the data after
    // prepopulating, without touching the network.
    let manager = RepoDataManager::new(dir.path());
    manager.prepopulate(std::slice::from_ref(&repo), &NullUser);
    let releases = manager.get_available_modules(std::slice::from_ref(&repo), "ModuleManager");
    assert_eq!(releases.len(), 1);
    assert_eq!(releases[0].version.to_string(), "4.2.2");
}

#[tokio::test]
async fn second_update_is_etag_short_circuited() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::new("main", "https://mods.example.com/repo.json", 0);
    let downloader = ScriptedDownloader::default().serve(
        "https://mods.example.com/repo.json",
        CATALOG,
        Some("\"r1\""),
    );
    let manager = RepoDataManager::new(dir.path());

    let first = manager
        .update(
            std::slice::from_ref(&repo),
            &game(),
            false,
            &downloader,
            &CancellationToken::new(),
            &NullUser,
            "modbay-test",
        )
        .await
        .unwrap();
    assert_eq!(first, UpdateResult::Updated);
    assert_eq!(downloader.request_count(), 1);

    let second = manager
        .update(
            std::slice::from_ref(&repo),
            &game(),
            false,
            &downloader,
            &CancellationToken::new(),
            &NullUser,
            "modbay-test",
        )
        .await
        .unwrap();
    assert_eq!(second, UpdateResult::NoChanges);
    assert_eq!(downloader.request_count(), 1);
}

#[tokio::test]
async fn skip_etags_forces_redownload() {
    let dir = TempDir::new().unwrap();
    let repo = Repository::new("main", "https://mods.example.com/repo.json", 0);
    let downloader = ScriptedDownloader::default().serve(
        "https://mods.example.com/repo.json",
        CATALOG,
        Some("\"r1\""),
    );
    let manager = RepoDataManager::new(dir.path());

    for _ in 0..2 {
        manager
            .update(
                std::slice::from_ref(&repo),
                &game(),
                true,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay-test",
            )
            .await
            .unwrap();
    }
    assert_eq!(downloader.request_count(), 2);
}

#[tokio::test]
async fn malformed_repo_rolls_back_sibling_etag() {
    let dir = TempDir::new().unwrap();
    let good = Repository::new("good", "https://good.example.com/repo.json", 0);
    let bad = Repository::new("bad", "https://bad.example.com/repo.json", 1);
    let downloader = ScriptedDownloader::default()
        .serve("https://good.example.com/repo.json", CATALOG, Some("\"g\""))
        .serve("https://bad.example.com/repo.json", "][ nope", Some("\"b\""));
    let manager = RepoDataManager::new(dir.path());

    let err = manager
        .update(
            &[good.clone(), bad],
            &game(),
            false,
            &downloader,
            &CancellationToken::new(),
            &NullUser,
            "modbay-test",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, UpdateError::DownloadErrors(_)));

    // etags.json reflects the pre-call state: a retry re-downloads the good
    // repo as well.
    let etags_path = dir.path().join("etags.json");
    if etags_path.exists() {
        let content = std::fs::read_to_string(&etags_path).unwrap();
        assert!(!content.contains("good.example.com"));
    }

    manager
        .update(
            std::slice::from_ref(&good),
            &game(),
            false,
            &downloader,
            &CancellationToken::new(),
            &NullUser,
            "modbay-test",
        )
        .await
        .unwrap();
    // 2 from the failed batch + 1 retry.
    assert_eq!(downloader.request_count(), 3);
}

#[tokio::test]
async fn local_file_repo_always_updates() {
    let dir = TempDir::new().unwrap();
    let repo_file = dir.path().join("local-repo.json");
    std::fs::write(&repo_file, CATALOG).unwrap();
    let repo = Repository::new("local", format!("file://{}", repo_file.display()), 0);

    // file:// targets are read by the real downloader machinery, so use it
    // via a scripted HTTP layer that would fail on any network call.
    let downloader = modbay::download::HttpDownloader::new(FailingFetch);

    let cache = TempDir::new().unwrap();
    let manager = RepoDataManager::new(cache.path());
    for _ in 0..2 {
        let result = manager
            .update(
                std::slice::from_ref(&repo),
                &game(),
                false,
                &downloader,
                &CancellationToken::new(),
                &NullUser,
                "modbay-test",
            )
            .await
            .unwrap();
        // Local repositories are re-read every time.
        assert_eq!(result, UpdateResult::Updated);
    }
}

/// HTTP layer that rejects every network call; only file:// may pass.
struct FailingFetch;

impl modbay::download::HttpFetch for FailingFetch {
    async fn get(
        &self,
        url: &str,
        _etag: Option<&str>,
    ) -> Result<modbay::download::FetchResponse, DownloadError> {
        Err(DownloadError::Network {
            url: url.to_string(),
            cause: "network disabled in test".to_string(),
        })
    }

    async fn head_etag(&self, url: &str) -> Result<Option<String>, DownloadError> {
        Err(DownloadError::Network {
            url: url.to_string(),
            cause: "network disabled in test".to_string(),
        })
    }
}
