//! Game collaborator: where repositories live and what builds exist.
//!
//! The core is game-agnostic; everything game-specific comes through the
//! [`Game`] trait. [`StaticGame`] is the offline implementation used by
//! tests and by front-ends that pin a known build list.

use crate::version::{GameVersion, GameVersionParseError};
use std::future::Future;
use std::sync::RwLock;
use thiserror::Error;

/// Errors from the game collaborator.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("failed to refresh game build list: {0}")]
    RefreshFailed(String),

    #[error(transparent)]
    BadVersion(#[from] GameVersionParseError),
}

/// Game-specific facts and services the core consumes.
pub trait Game: Send + Sync {
    /// Short name used in paths and user agents (e.g. `KSP`).
    fn short_name(&self) -> &str;

    /// URL of the canonical repository list file.
    fn repository_list_url(&self) -> &str;

    /// Fallback repository when the list cannot be fetched.
    fn default_repository_url(&self) -> &str;

    /// Refresh the known build-version map from upstream.
    fn refresh_versions(
        &self,
        user_agent: &str,
    ) -> impl Future<Output = Result<(), GameError>> + Send;

    /// Parse a game version string in this game's convention.
    fn parse_game_version(&self, s: &str) -> Result<GameVersion, GameError> {
        Ok(s.parse::<GameVersion>()?)
    }

    /// Builds currently known to exist.
    fn known_versions(&self) -> Vec<GameVersion>;
}

/// Offline [`Game`] with a fixed build list.
pub struct StaticGame {
    short_name: String,
    repository_list_url: String,
    default_repository_url: String,
    versions: RwLock<Vec<GameVersion>>,
}

impl StaticGame {
    pub fn new(
        short_name: impl Into<String>,
        repository_list_url: impl Into<String>,
        default_repository_url: impl Into<String>,
        versions: Vec<GameVersion>,
    ) -> Self {
        StaticGame {
            short_name: short_name.into(),
            repository_list_url: repository_list_url.into(),
            default_repository_url: default_repository_url.into(),
            versions: RwLock::new(versions),
        }
    }

    pub fn set_versions(&self, versions: Vec<GameVersion>) {
        *self.versions.write().unwrap() = versions;
    }
}

impl Game for StaticGame {
    fn short_name(&self) -> &str {
        &self.short_name
    }

    fn repository_list_url(&self) -> &str {
        &self.repository_list_url
    }

    fn default_repository_url(&self) -> &str {
        &self.default_repository_url
    }

    async fn refresh_versions(&self, _user_agent: &str) -> Result<(), GameError> {
        // Static list, nothing to refresh.
        Ok(())
    }

    fn known_versions(&self) -> Vec<GameVersion> {
        self.versions.read().unwrap().clone()
    }
}
