//! Read-only querier over repositories plus installed state.
//!
//! A [`RegistryView`] composes the metadata store with the installed
//! releases, the loose DLLs found in the game's plugin folder, and the DLC
//! the user owns. The resolver works exclusively against this façade.

use crate::release::{DlcFact, Release, Stability};
use crate::repository::{RepoDataManager, Repository};
use crate::version::GameVersionCriteria;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One installable candidate for an identifier.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub release: Arc<Release>,
    /// Identifier-exact match, as opposed to a `provides` match.
    pub exact: bool,
    /// Download count, for tie-breaking between equal versions.
    pub downloads: u64,
}

/// Unified read-only view for one resolution session.
pub struct RegistryView<'a> {
    manager: &'a RepoDataManager,
    repos: Vec<Repository>,
    installed: HashMap<String, Arc<Release>>,
    dlls: Vec<String>,
    dlc: Vec<DlcFact>,
}

impl<'a> RegistryView<'a> {
    pub fn new(
        manager: &'a RepoDataManager,
        repos: Vec<Repository>,
        installed: Vec<Arc<Release>>,
        dlls: Vec<String>,
        dlc: Vec<DlcFact>,
    ) -> Self {
        let installed = installed
            .into_iter()
            .map(|release| (release.identifier.clone(), release))
            .collect();
        RegistryView {
            manager,
            repos,
            installed,
            dlls,
            dlc,
        }
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repos
    }

    /// Installed release for `identifier`, if any.
    pub fn installed(&self, identifier: &str) -> Option<&Arc<Release>> {
        self.installed.get(identifier)
    }

    pub fn installed_releases(&self) -> impl Iterator<Item = &Arc<Release>> {
        self.installed.values()
    }

    pub fn dlls(&self) -> &[String] {
        &self.dlls
    }

    pub fn dlc(&self) -> &[DlcFact] {
        &self.dlc
    }

    /// Every available release for `identifier`, priority-ordered across
    /// repositories, newest first within a repository.
    pub fn all_releases(&self, identifier: &str) -> Vec<Arc<Release>> {
        self.manager.get_available_modules(&self.repos, identifier)
    }

    /// Newest release of `identifier` compatible with the criteria and
    /// within the stability tolerance.
    pub fn latest_available(
        &self,
        identifier: &str,
        criteria: &GameVersionCriteria,
        tolerance: Stability,
    ) -> Option<Arc<Release>> {
        self.all_releases(identifier)
            .into_iter()
            .filter(|release| release.compatible_with(criteria))
            .filter(|release| release.within_tolerance(tolerance))
            .max_by(|a, b| a.version.cmp(&b.version))
    }

    /// Releases that `provides` the identifier, across all repositories.
    pub fn provided_by(&self, identifier: &str) -> Vec<Arc<Release>> {
        let mut out = Vec::new();
        let mut sorted = self.repos.clone();
        sorted.sort();
        let mut seen_uris = HashSet::new();
        for repo in sorted {
            if !seen_uris.insert(repo.uri.clone()) {
                continue;
            }
            if let Some(index) = self.manager.index_for(&repo) {
                out.extend(index.provided_by(identifier).iter().map(Arc::clone));
            }
        }
        out
    }

    /// Download count for `identifier`, first non-zero in priority order.
    pub fn downloads(&self, identifier: &str) -> Option<u64> {
        self.manager.get_download_count(&self.repos, identifier)
    }

    /// Every available release across the repositories, deduplicated.
    pub fn all_available(&self) -> Vec<Arc<Release>> {
        self.manager.all_available(&self.repos)
    }

    /// Installable candidates for `identifier`, filtered by game
    /// compatibility and stability, sorted for provider selection:
    /// identifier-exact matches before `provides` matches, newer versions
    /// first, download count breaking version ties.
    pub fn candidates_for(
        &self,
        identifier: &str,
        criteria: &GameVersionCriteria,
        tolerance: Stability,
    ) -> Vec<Candidate> {
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut candidates = Vec::new();

        let exact = self.all_releases(identifier).into_iter().map(|r| (r, true));
        let provided = self
            .provided_by(identifier)
            .into_iter()
            .map(|r| (r, false));

        for (release, exact) in exact.chain(provided) {
            if !release.compatible_with(criteria) || !release.within_tolerance(tolerance) {
                continue;
            }
            let key = (release.identifier.clone(), release.version.to_string());
            if !seen.insert(key) {
                continue;
            }
            let downloads = self.downloads(&release.identifier).unwrap_or(0);
            candidates.push(Candidate {
                release,
                exact,
                downloads,
            });
        }

        candidates.sort_by(|a, b| {
            b.exact
                .cmp(&a.exact)
                .then_with(|| b.release.version.cmp(&a.release.version))
                .then_with(|| b.downloads.cmp(&a.downloads))
                .then_with(|| a.release.identifier.cmp(&b.release.identifier))
        });
        candidates
    }
}
