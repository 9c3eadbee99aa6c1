//! Game build versions and compatibility criteria.
//!
//! Game versions are plain dotted numeric strings (`1.12.3`). A release
//! declares compatibility as a set of [`GameVersionRange`]s; a
//! [`GameVersionCriteria`] is the set of concrete builds the user is
//! running. The release is compatible iff every criterion lies in at least
//! one of its ranges.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A concrete game build version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GameVersion {
    components: Vec<u32>,
    raw: String,
}

/// Error parsing a game version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid game version '{0}'")]
pub struct GameVersionParseError(pub String);

impl GameVersion {
    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

impl FromStr for GameVersion {
    type Err = GameVersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(GameVersionParseError(s.to_string()));
        }
        let components = s
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| GameVersionParseError(s.to_string()))?;
        Ok(GameVersion {
            components,
            raw: s.to_string(),
        })
    }
}

impl fmt::Display for GameVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Serialize for GameVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for GameVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// An inclusive interval of game versions; either side may be open.
///
/// A bound with fewer components than the version being tested matches by
/// prefix widening: `max = 1.12` admits `1.12.5`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameVersionRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<GameVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<GameVersion>,
}

impl GameVersionRange {
    pub fn any() -> Self {
        GameVersionRange {
            min: None,
            max: None,
        }
    }

    pub fn contains(&self, version: &GameVersion) -> bool {
        if let Some(min) = &self.min {
            if compare_prefix(version, min) == std::cmp::Ordering::Less {
                return false;
            }
        }
        if let Some(max) = &self.max {
            if compare_prefix(version, max) == std::cmp::Ordering::Greater {
                return false;
            }
        }
        true
    }
}

/// Compare a concrete version against a bound, truncating the version to the
/// bound's component count so shorter bounds act as prefixes.
fn compare_prefix(version: &GameVersion, bound: &GameVersion) -> std::cmp::Ordering {
    let n = bound.components.len().min(version.components.len());
    version.components[..n]
        .cmp(&bound.components[..n])
        .then_with(|| {
            if version.components.len() >= bound.components.len() {
                std::cmp::Ordering::Equal
            } else {
                version.components.len().cmp(&bound.components.len())
            }
        })
}

impl fmt::Display for GameVersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "all game versions"),
            (Some(min), None) => write!(f, ">= {}", min),
            (None, Some(max)) => write!(f, "<= {}", max),
            (Some(min), Some(max)) => write!(f, "{} - {}", min, max),
        }
    }
}

/// The set of concrete game builds the user is playing against.
///
/// Multiple entries cover setups where several builds must be supported at
/// once (a shared install used by different branches).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GameVersionCriteria {
    versions: Vec<GameVersion>,
}

impl GameVersionCriteria {
    pub fn new(versions: Vec<GameVersion>) -> Self {
        GameVersionCriteria { versions }
    }

    pub fn single(version: GameVersion) -> Self {
        GameVersionCriteria {
            versions: vec![version],
        }
    }

    pub fn versions(&self) -> &[GameVersion] {
        &self.versions
    }

    /// Whether a release with the given compatibility ranges satisfies every
    /// criterion. An empty range list means "compatible with anything".
    pub fn is_satisfied_by(&self, ranges: &[GameVersionRange]) -> bool {
        if ranges.is_empty() {
            return true;
        }
        self.versions
            .iter()
            .all(|version| ranges.iter().any(|range| range.contains(version)))
    }
}

impl fmt::Display for GameVersionCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.versions.iter().map(|v| v.to_string()).collect();
        write!(f, "[{}]", rendered.join(", "))
    }
}
