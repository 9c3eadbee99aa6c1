//! Module version parsing and ordering.
//!
//! Mod versions follow the `[epoch:]upstream[-release]` shape. Ordering is
//! lexicographic on `(epoch, upstream, release)` where the upstream and
//! release parts use a Debian-style segment comparison: runs of digits
//! compare numerically, runs of non-digits compare by codepoint with `~`
//! sorting before the empty string and the empty string before everything
//! else. A missing release part sorts before any present release.

mod game;
mod range;

pub use game::{GameVersion, GameVersionCriteria, GameVersionParseError, GameVersionRange};
pub use range::{VersionBound, VersionRange};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parsed module version.
///
/// Immutable once constructed. The original string form is preserved for
/// display so `"1.0"` and `"1.00"` stay distinguishable even though they
/// compare equal.
#[derive(Debug, Clone, Eq)]
pub struct ModVersion {
    epoch: u32,
    upstream: String,
    release: Option<String>,
    raw: String,
}

/// Error parsing a version string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionParseError {
    /// Version string is empty
    #[error("empty version string")]
    Empty,
    /// Epoch prefix is not an unsigned integer
    #[error("invalid epoch in version '{0}'")]
    InvalidEpoch(String),
    /// Upstream part is empty after stripping epoch and release
    #[error("missing upstream part in version '{0}'")]
    MissingUpstream(String),
}

impl ModVersion {
    /// Epoch component, `0` when absent from the source string.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Upstream component.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// Release suffix, if present.
    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    /// Whether the version string carries a pre-release marker.
    ///
    /// Used to derive a default stability level when the release record
    /// does not state one explicitly.
    pub fn has_prerelease_marker(&self) -> bool {
        let lowered = self.raw.to_ascii_lowercase();
        ["alpha", "beta", "pre", "rc", "dev"]
            .iter()
            .any(|marker| lowered.contains(marker))
    }
}

impl FromStr for ModVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (epoch, rest) = match s.split_once(':') {
            Some((prefix, rest)) if !prefix.is_empty() => {
                let epoch = prefix
                    .parse::<u32>()
                    .map_err(|_| VersionParseError::InvalidEpoch(s.to_string()))?;
                (epoch, rest)
            }
            _ => (0, s),
        };

        // The release suffix starts at the last hyphen, as in Debian revisions.
        let (upstream, release) = match rest.rsplit_once('-') {
            Some((upstream, release)) if !upstream.is_empty() => {
                (upstream.to_string(), Some(release.to_string()))
            }
            _ => (rest.to_string(), None),
        };

        if upstream.is_empty() {
            return Err(VersionParseError::MissingUpstream(s.to_string()));
        }

        Ok(ModVersion {
            epoch,
            upstream,
            release,
            raw: s.to_string(),
        })
    }
}

impl fmt::Display for ModVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for ModVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl std::hash::Hash for ModVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hash a normalized form so versions that compare equal hash equal.
        self.epoch.hash(state);
        for segment in segments(&self.upstream) {
            segment.hash(state);
        }
        if let Some(release) = &self.release {
            for segment in segments(release) {
                segment.hash(state);
            }
        }
    }
}

impl PartialOrd for ModVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_part(&self.upstream, &other.upstream))
            .then_with(|| match (&self.release, &other.release) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => compare_part(a, b),
            })
    }
}

impl Serialize for ModVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for ModVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// One segment of a version part: a digit run or a non-digit run.
#[derive(Debug, PartialEq, Eq, Hash)]
enum Segment<'a> {
    Number(u64),
    Text(&'a str),
}

fn segments(part: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let bytes = part.as_bytes();
    let mut start = 0;
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        let run = &part[start..end];
        if is_digit {
            // Digit runs longer than a u64 are compared as text; in practice
            // version components stay far below that bound.
            match run.parse::<u64>() {
                Ok(n) => out.push(Segment::Number(n)),
                Err(_) => out.push(Segment::Text(run)),
            }
        } else {
            out.push(Segment::Text(run));
        }
        start = end;
    }
    out
}

/// Compare two version parts with the digit/non-digit segment rules.
fn compare_part(a: &str, b: &str) -> Ordering {
    let sa = segments(a);
    let sb = segments(b);
    let mut ia = sa.iter();
    let mut ib = sb.iter();
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(seg)) => return present_vs_missing(seg).reverse(),
            (Some(seg), None) => return present_vs_missing(seg),
            (Some(x), Some(y)) => {
                let ord = compare_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Ordering of the side holding a present segment against an exhausted side.
///
/// `~` sorts before empty, so `1.0~rc1` precedes `1.0`.
fn present_vs_missing(present: &Segment<'_>) -> Ordering {
    match present {
        Segment::Text(t) if t.starts_with('~') => Ordering::Less,
        _ => Ordering::Greater,
    }
}

fn compare_segment(a: &Segment<'_>, b: &Segment<'_>) -> Ordering {
    match (a, b) {
        (Segment::Number(x), Segment::Number(y)) => x.cmp(y),
        // Mixed case: the digit side has an empty non-digit prefix here, and
        // empty sorts before any text except `~`.
        (Segment::Number(_), Segment::Text(t)) => {
            if t.starts_with('~') {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Segment::Text(t), Segment::Number(_)) => {
            if t.starts_with('~') {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Segment::Text(x), Segment::Text(y)) => compare_text(x, y),
    }
}

/// Codepoint comparison with `~` sorting before everything, including
/// the end of the string.
fn compare_text(a: &str, b: &str) -> Ordering {
    let mut ca = a.chars();
    let mut cb = b.chars();
    loop {
        match (ca.next(), cb.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some('~')) => return Ordering::Greater,
            (None, Some(_)) => return Ordering::Less,
            (Some('~'), None) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some('~'), Some('~')) => continue,
            (Some('~'), Some(_)) => return Ordering::Less,
            (Some(_), Some('~')) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
            }
        }
    }
}
