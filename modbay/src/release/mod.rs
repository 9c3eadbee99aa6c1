//! Release records: the atomic unit of the module catalog.
//!
//! A [`Release`] identifies one installable version of one mod. Releases are
//! created by deserializing repository metadata and are immutable afterwards;
//! the repository index that parsed them owns them and hands out `Arc`
//! handles.

use crate::relationship::RelationshipDescriptor;
use crate::version::{GameVersionCriteria, GameVersionRange, ModVersion};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata spec revision this reader understands.
///
/// Records with a newer `spec_version` are still loaded, but the containing
/// index is flagged so the front-end can nag about a client upgrade.
pub const SUPPORTED_SPEC_VERSION: u32 = 1;

/// What kind of thing a release installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseKind {
    /// A normal installable package.
    Package,
    /// Carries only relationships, no files of its own.
    Metapackage,
    /// First-party paid add-on, not managed by us.
    Dlc,
}

/// Pre-release maturity of a release.
///
/// The user picks a tolerance; releases above it are filtered out of
/// candidate sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    #[default]
    Stable,
    Testing,
    Development,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Stable => write!(f, "stable"),
            Stability::Testing => write!(f, "testing"),
            Stability::Development => write!(f, "development"),
        }
    }
}

/// One installable version of one mod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub identifier: String,
    pub version: ModVersion,

    #[serde(default = "default_spec_version")]
    pub spec_version: u32,

    #[serde(default = "default_kind")]
    pub kind: ReleaseKind,

    /// Explicit stability; when absent it is derived from the version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_status: Option<Stability>,

    /// Compatible game builds. Empty means compatible with anything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub game_versions: Vec<GameVersionRange>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommends: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggests: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<RelationshipDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replaced_by: Vec<RelationshipDescriptor>,

    /// Virtual identifiers this release fulfills.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provides: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_hash_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_size: Option<u64>,

    // Presentation fields: carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "abstract", default, skip_serializing_if = "Option::is_none")]
    pub blurb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub released_at: Option<DateTime<Utc>>,
}

fn default_spec_version() -> u32 {
    1
}

fn default_kind() -> ReleaseKind {
    ReleaseKind::Package
}

impl Release {
    /// Whether this release answers to `identifier`, directly or through
    /// `provides`.
    pub fn answers_to(&self, identifier: &str) -> bool {
        self.identifier == identifier || self.provides.iter().any(|p| p == identifier)
    }

    /// Effective stability: the explicit field wins, otherwise derived from
    /// pre-release markers in the version string.
    pub fn stability(&self) -> Stability {
        if let Some(explicit) = self.release_status {
            return explicit;
        }
        let lowered = self.version.to_string().to_ascii_lowercase();
        if lowered.contains("dev") || lowered.contains("alpha") {
            Stability::Development
        } else if lowered.contains("beta") || lowered.contains("pre") || lowered.contains("rc") {
            Stability::Testing
        } else {
            Stability::Stable
        }
    }

    /// Whether the release may be offered under the given tolerance.
    pub fn within_tolerance(&self, tolerance: Stability) -> bool {
        self.stability() <= tolerance
    }

    /// Whether the release is compatible with the user's game builds.
    pub fn compatible_with(&self, criteria: &GameVersionCriteria) -> bool {
        criteria.is_satisfied_by(&self.game_versions)
    }

    /// Whether this record uses a metadata spec newer than we understand.
    pub fn needs_newer_client(&self) -> bool {
        self.spec_version > SUPPORTED_SPEC_VERSION
    }

    /// Display name, falling back to the identifier.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.identifier)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.identifier, self.version)
    }
}

/// A first-party DLC the user owns, treated as an unmanaged release with a
/// known version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DlcFact {
    pub identifier: String,
    pub version: ModVersion,
}

impl DlcFact {
    pub fn new(identifier: impl Into<String>, version: ModVersion) -> Self {
        DlcFact {
            identifier: identifier.into(),
            version,
        }
    }
}
