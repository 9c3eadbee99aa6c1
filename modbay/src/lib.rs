//! modbay - mod package management core
//!
//! This library syncs module metadata from multiple HTTP repositories into
//! a local cache and computes consistent installation plans from inter-mod
//! relationships (depends, conflicts, recommends, suggests, supports,
//! provides, replaced-by).
//!
//! # High-Level Flow
//!
//! ```ignore
//! use modbay::download::{HttpDownloader, ReqwestFetch};
//! use modbay::registry::RegistryView;
//! use modbay::repository::RepoDataManager;
//! use modbay::resolver::{RelationshipResolver, ResolverOptions};
//!
//! let manager = RepoDataManager::new(cache_dir);
//! manager.update(&repos, &game, false, &downloader, &cancel, &user, agent).await?;
//!
//! let view = RegistryView::new(&manager, repos, installed, dlls, dlc);
//! let mut resolver = RelationshipResolver::new(&view, criteria, ResolverOptions::default());
//! resolver.resolve(&requests, &[])?;
//! let plan = resolver.mod_list();
//! ```

pub mod arena;
pub mod config;
pub mod download;
pub mod fsutil;
pub mod game;
pub mod logging;
pub mod registry;
pub mod relationship;
pub mod release;
pub mod repository;
pub mod resolver;
pub mod sanity;
pub mod user;
pub mod version;

/// Version of the modbay library and CLI.
///
/// Synchronized across all workspace members via the root manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// User agent sent with repository and metadata requests.
pub fn user_agent() -> String {
    format!("modbay/{}", VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version() {
        let agent = user_agent();
        assert!(agent.starts_with("modbay/"));
        assert!(agent.contains(VERSION));
    }
}
