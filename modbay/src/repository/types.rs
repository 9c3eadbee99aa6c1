//! Repository identity, catalogs and the per-repository index.

use crate::release::Release;
use crate::version::{GameVersion, ModVersion};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A metadata repository the client syncs from.
///
/// Lower `priority` wins; ties break by name ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub uri: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(rename = "x_mirror", default, skip_serializing_if = "std::ops::Not::not")]
    pub mirror: bool,
    #[serde(rename = "x_comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Repository {
    pub fn new(name: impl Into<String>, uri: impl Into<String>, priority: i32) -> Self {
        Repository {
            name: name.into(),
            uri: uri.into(),
            priority,
            mirror: false,
            comment: None,
        }
    }

    /// Stable on-disk key: first 16 hex chars of the URL's SHA-1, then the
    /// repo name. Different URLs under the same name get distinct files.
    pub fn cache_key(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.uri.as_bytes());
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(16);
        for byte in digest.iter().take(8) {
            hex.push_str(&format!("{:02x}", byte));
        }
        format!("{}-{}", hex, self.name)
    }

    /// Cache file name for this repository.
    pub fn cache_file_name(&self) -> String {
        format!("{}.json", self.cache_key())
    }

    /// Whether the repository is served from the local filesystem.
    pub fn is_local(&self) -> bool {
        self.uri.starts_with("file://")
    }
}

impl PartialOrd for Repository {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Repository {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uri)
    }
}

/// Wire shape of the repository list file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryListFile {
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

/// An endorsement edge: `referrer` lists `referenced` in its metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoReference {
    pub referrer: Repository,
    pub referenced: Repository,
}

/// All releases of all modules in one repository, keyed
/// `identifier → version → release`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleCatalog {
    modules: HashMap<String, BTreeMap<ModVersion, Arc<Release>>>,
}

impl ModuleCatalog {
    pub fn insert(&mut self, release: Release) {
        self.modules
            .entry(release.identifier.clone())
            .or_default()
            .insert(release.version.clone(), Arc::new(release));
    }

    /// Releases of one module, newest first.
    pub fn releases_for<'a>(
        &'a self,
        identifier: &str,
    ) -> impl Iterator<Item = &'a Arc<Release>> + 'a {
        self.modules
            .get(identifier)
            .into_iter()
            .flat_map(|versions| versions.values().rev())
    }

    /// Every release in the catalog, identifier-sorted, newest first within
    /// a module.
    pub fn all_releases(&self) -> Vec<&Arc<Release>> {
        let mut identifiers: Vec<&String> = self.modules.keys().collect();
        identifiers.sort();
        identifiers
            .into_iter()
            .flat_map(|id| self.modules[id].values().rev())
            .collect()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &String> {
        self.modules.keys()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

/// Error parsing a repository metadata file.
#[derive(Debug, Error)]
pub enum IndexParseError {
    #[error("invalid repository metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed, queryable contents of one repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepositoryIndex {
    catalog: ModuleCatalog,
    download_counts: HashMap<String, u64>,
    referenced_repositories: Vec<Repository>,
    supported_game_versions: Vec<GameVersion>,
    /// Some release used a metadata spec newer than this client understands.
    unsupported_spec: bool,
    /// Virtual identifier → releases that provide it, rebuilt from the
    /// catalog so it never drifts.
    provides_index: HashMap<String, Vec<Arc<Release>>>,
}

/// On-disk / on-wire shape of a repository metadata file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryIndexWire {
    #[serde(default)]
    releases: Vec<Release>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    download_counts: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    repositories: Vec<Repository>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    supported_game_versions: Vec<GameVersion>,
}

impl RepositoryIndex {
    /// Parse a repository metadata file.
    ///
    /// Records with a newer spec revision are accepted and flag the index;
    /// unknown release kinds are a hard parse error.
    pub fn from_json(bytes: &[u8]) -> Result<Self, IndexParseError> {
        let wire: RepositoryIndexWire = serde_json::from_slice(bytes)?;
        Ok(Self::from_wire(wire))
    }

    /// Serialize back to the wire shape, deterministically ordered.
    pub fn to_json(&self) -> Vec<u8> {
        let wire = self.to_wire();
        // In-memory wire values always serialize.
        serde_json::to_vec_pretty(&wire).expect("repository index serialization cannot fail")
    }

    fn from_wire(wire: RepositoryIndexWire) -> Self {
        let mut catalog = ModuleCatalog::default();
        let mut unsupported_spec = false;
        for release in wire.releases {
            unsupported_spec |= release.needs_newer_client();
            catalog.insert(release);
        }

        let mut provides_index: HashMap<String, Vec<Arc<Release>>> = HashMap::new();
        for release in catalog.all_releases() {
            for provided in &release.provides {
                provides_index
                    .entry(provided.clone())
                    .or_default()
                    .push(Arc::clone(release));
            }
        }

        RepositoryIndex {
            catalog,
            download_counts: wire.download_counts.into_iter().collect(),
            referenced_repositories: wire.repositories,
            supported_game_versions: wire.supported_game_versions,
            unsupported_spec,
            provides_index,
        }
    }

    fn to_wire(&self) -> RepositoryIndexWire {
        RepositoryIndexWire {
            releases: self
                .catalog
                .all_releases()
                .into_iter()
                .map(|release| (**release).clone())
                .collect(),
            download_counts: self
                .download_counts
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            repositories: self.referenced_repositories.clone(),
            supported_game_versions: self.supported_game_versions.clone(),
        }
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn releases_for<'a>(
        &'a self,
        identifier: &str,
    ) -> impl Iterator<Item = &'a Arc<Release>> + 'a {
        self.catalog.releases_for(identifier)
    }

    /// Releases whose `provides` lists `identifier`.
    pub fn provided_by(&self, identifier: &str) -> &[Arc<Release>] {
        self.provides_index
            .get(identifier)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn download_count(&self, identifier: &str) -> Option<u64> {
        self.download_counts.get(identifier).copied()
    }

    pub fn referenced_repositories(&self) -> &[Repository] {
        &self.referenced_repositories
    }

    pub fn supported_game_versions(&self) -> &[GameVersion] {
        &self.supported_game_versions
    }

    pub fn unsupported_spec(&self) -> bool {
        self.unsupported_spec
    }
}
