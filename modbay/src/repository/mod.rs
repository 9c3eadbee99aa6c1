//! Repository metadata: identity, catalogs, ETag cache and the update
//! pipeline.
//!
//! One [`RepoDataManager`] owns the cache directory and all per-repository
//! in-memory indexes. Queries are priority-ordered across repositories;
//! updates are ETag-conditional and crash-safe.

mod etag;
mod events;
mod store;
mod types;

pub use etag::{EtagStore, ETAGS_FILE_NAME};
pub use events::{SubscriptionToken, UpdatePublisher};
pub use store::{
    DownloadErrors, RepoDataManager, RepoFailure, RepoFailureCause, Staleness, UpdateError,
    UpdateResult, TIME_TILL_STALE, TIME_TILL_VERY_STALE,
};
pub use types::{
    IndexParseError, ModuleCatalog, RepoReference, Repository, RepositoryIndex,
    RepositoryListFile,
};

use crate::download::{DownloadTarget, Downloader};
use crate::game::Game;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Fetch and parse the game's canonical repository list.
///
/// Falls back to a single default repository when the list cannot be
/// fetched or parsed, so a broken metadata server never strands the client.
pub async fn fetch_repository_list<G: Game, D: Downloader>(
    game: &G,
    downloader: &D,
) -> Vec<Repository> {
    let cancel = CancellationToken::new();
    let target = DownloadTarget::new(game.repository_list_url());
    let outcomes = downloader.download_and_wait(vec![target], &cancel).await;

    let fallback = || {
        vec![Repository::new(
            "default",
            game.default_repository_url(),
            0,
        )]
    };

    let Some(outcome) = outcomes.into_iter().next() else {
        return fallback();
    };
    let payload = match outcome.result {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "failed to fetch repository list, using default");
            return fallback();
        }
    };
    match serde_json::from_slice::<RepositoryListFile>(&payload.bytes) {
        Ok(list) if !list.repositories.is_empty() => list.repositories,
        Ok(_) => fallback(),
        Err(e) => {
            warn!(error = %e, "unparseable repository list, using default");
            fallback()
        }
    }
}
