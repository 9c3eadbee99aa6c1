//! Relationship descriptors and their evaluation.
//!
//! A descriptor is one clause of a `depends` / `conflicts` / `recommends` /
//! `suggests` / `supports` / `replaced_by` list: either a single identifier
//! with a version bound, or an ordered `any_of` alternation. A descriptor
//! matches a release when the release answers to the identifier (directly or
//! via `provides`) and its version lies in the bound.

use crate::release::{DlcFact, Release};
use crate::version::{ModVersion, VersionBound, VersionRange};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// One relationship clause.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "DescriptorWire", into = "DescriptorWire")]
pub enum RelationshipDescriptor {
    Single {
        identifier: String,
        bound: VersionBound,
        /// Hide recommendations/suggestions of releases chosen for this clause.
        suppress_recommendations: bool,
    },
    AnyOf {
        alternatives: Vec<RelationshipDescriptor>,
        suppress_recommendations: bool,
    },
}

impl RelationshipDescriptor {
    /// Unbounded descriptor for an identifier.
    pub fn any_version(identifier: impl Into<String>) -> Self {
        RelationshipDescriptor::Single {
            identifier: identifier.into(),
            bound: VersionBound::Any,
            suppress_recommendations: false,
        }
    }

    /// Exact-version descriptor, as used for user install requests.
    pub fn exact(identifier: impl Into<String>, version: ModVersion) -> Self {
        RelationshipDescriptor::Single {
            identifier: identifier.into(),
            bound: VersionBound::Exact(version),
            suppress_recommendations: false,
        }
    }

    pub fn suppress_recommendations(&self) -> bool {
        match self {
            RelationshipDescriptor::Single {
                suppress_recommendations,
                ..
            }
            | RelationshipDescriptor::AnyOf {
                suppress_recommendations,
                ..
            } => *suppress_recommendations,
        }
    }

    /// Identifiers this descriptor could be satisfied by, in preference order.
    pub fn identifiers(&self) -> Vec<&str> {
        match self {
            RelationshipDescriptor::Single { identifier, .. } => vec![identifier.as_str()],
            RelationshipDescriptor::AnyOf { alternatives, .. } => alternatives
                .iter()
                .flat_map(|alt| alt.identifiers())
                .collect(),
        }
    }

    /// Whether `release` satisfies this descriptor.
    pub fn matches_release(&self, release: &Release) -> bool {
        match self {
            RelationshipDescriptor::Single {
                identifier, bound, ..
            } => release.answers_to(identifier) && bound.contains(&release.version),
            RelationshipDescriptor::AnyOf { alternatives, .. } => {
                alternatives.iter().any(|alt| alt.matches_release(release))
            }
        }
    }

    /// Whether the ambient DLL `name` satisfies this descriptor.
    ///
    /// DLLs are version-opaque, so only unbounded clauses accept them.
    pub fn matches_dll(&self, name: &str) -> bool {
        match self {
            RelationshipDescriptor::Single {
                identifier, bound, ..
            } => bound.is_any() && identifier == name,
            RelationshipDescriptor::AnyOf { alternatives, .. } => {
                alternatives.iter().any(|alt| alt.matches_dll(name))
            }
        }
    }

    /// Whether an owned DLC satisfies this descriptor.
    pub fn matches_dlc(&self, dlc: &DlcFact) -> bool {
        match self {
            RelationshipDescriptor::Single {
                identifier, bound, ..
            } => identifier == &dlc.identifier && bound.contains(&dlc.version),
            RelationshipDescriptor::AnyOf { alternatives, .. } => {
                alternatives.iter().any(|alt| alt.matches_dlc(dlc))
            }
        }
    }

    /// First satisfier among `candidates`, then DLLs, then DLC facts.
    ///
    /// For `any_of` the alternatives are tried in order and the first match
    /// wins, so metadata authors control preference by ordering.
    pub fn match_any(
        &self,
        candidates: &[Arc<Release>],
        dlls: &[String],
        dlc: &[DlcFact],
    ) -> Option<RelationshipMatch> {
        match self {
            RelationshipDescriptor::AnyOf { alternatives, .. } => alternatives
                .iter()
                .find_map(|alt| alt.match_any(candidates, dlls, dlc)),
            RelationshipDescriptor::Single { .. } => {
                if let Some(release) = candidates.iter().find(|r| self.matches_release(r)) {
                    return Some(RelationshipMatch::Release(Arc::clone(release)));
                }
                if let Some(dll) = dlls.iter().find(|name| self.matches_dll(name)) {
                    return Some(RelationshipMatch::Dll(dll.clone()));
                }
                if let Some(fact) = dlc.iter().find(|fact| self.matches_dlc(fact)) {
                    return Some(RelationshipMatch::Dlc(fact.clone()));
                }
                None
            }
        }
    }
}

impl fmt::Display for RelationshipDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipDescriptor::Single {
                identifier, bound, ..
            } => {
                if bound.is_any() {
                    write!(f, "{}", identifier)
                } else {
                    write!(f, "{} ({})", identifier, bound)
                }
            }
            RelationshipDescriptor::AnyOf { alternatives, .. } => {
                let rendered: Vec<String> =
                    alternatives.iter().map(|alt| alt.to_string()).collect();
                write!(f, "any of [{}]", rendered.join(", "))
            }
        }
    }
}

/// What ended up satisfying a descriptor.
#[derive(Debug, Clone)]
pub enum RelationshipMatch {
    Release(Arc<Release>),
    Dll(String),
    Dlc(DlcFact),
}

/// Error converting the wire form into a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    #[error("relationship clause mixes 'version' with 'min_version'/'max_version'")]
    ConflictingBounds,
    #[error("'any_of' clause has no alternatives")]
    EmptyAnyOf,
}

/// JSON wire shape: either `{"any_of": [...]}` or a single-identifier clause
/// with `version` (exact) or `min_version`/`max_version` (range) keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DescriptorWire {
    AnyOf {
        any_of: Vec<RelationshipDescriptor>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        suppress_recommendations: bool,
    },
    Single {
        identifier: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<ModVersion>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_version: Option<ModVersion>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_version: Option<ModVersion>,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        suppress_recommendations: bool,
    },
}

impl TryFrom<DescriptorWire> for RelationshipDescriptor {
    type Error = DescriptorError;

    fn try_from(wire: DescriptorWire) -> Result<Self, Self::Error> {
        match wire {
            DescriptorWire::AnyOf {
                any_of,
                suppress_recommendations,
            } => {
                if any_of.is_empty() {
                    return Err(DescriptorError::EmptyAnyOf);
                }
                Ok(RelationshipDescriptor::AnyOf {
                    alternatives: any_of,
                    suppress_recommendations,
                })
            }
            DescriptorWire::Single {
                identifier,
                version,
                min_version,
                max_version,
                suppress_recommendations,
            } => {
                let bound = match (version, min_version, max_version) {
                    (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                        return Err(DescriptorError::ConflictingBounds)
                    }
                    (Some(exact), None, None) => VersionBound::Exact(exact),
                    (None, None, None) => VersionBound::Any,
                    (None, min, max) => VersionBound::Range(VersionRange::inclusive(min, max)),
                };
                Ok(RelationshipDescriptor::Single {
                    identifier,
                    bound,
                    suppress_recommendations,
                })
            }
        }
    }
}

impl From<RelationshipDescriptor> for DescriptorWire {
    fn from(descriptor: RelationshipDescriptor) -> Self {
        match descriptor {
            RelationshipDescriptor::AnyOf {
                alternatives,
                suppress_recommendations,
            } => DescriptorWire::AnyOf {
                any_of: alternatives,
                suppress_recommendations,
            },
            RelationshipDescriptor::Single {
                identifier,
                bound,
                suppress_recommendations,
            } => {
                let (version, min_version, max_version) = match bound {
                    VersionBound::Any => (None, None, None),
                    VersionBound::Exact(v) => (Some(v), None, None),
                    VersionBound::Range(r) => (None, r.min, r.max),
                };
                DescriptorWire::Single {
                    identifier,
                    version,
                    min_version,
                    max_version,
                    suppress_recommendations,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ModVersion {
        s.parse().unwrap()
    }

    fn release(identifier: &str, version: &str, provides: &[&str]) -> Arc<Release> {
        let mut r: Release = serde_json::from_str(&format!(
            r#"{{"identifier":"{}","version":"{}"}}"#,
            identifier, version
        ))
        .unwrap();
        r.provides = provides.iter().map(|p| p.to_string()).collect();
        Arc::new(r)
    }

    #[test]
    fn test_deserialize_exact_version() {
        let d: RelationshipDescriptor =
            serde_json::from_str(r#"{"identifier":"MM","version":"4.2"}"#).unwrap();
        assert!(d.matches_release(&release("MM", "4.2", &[])));
        assert!(!d.matches_release(&release("MM", "4.3", &[])));
    }

    #[test]
    fn test_deserialize_range() {
        let d: RelationshipDescriptor =
            serde_json::from_str(r#"{"identifier":"MM","min_version":"4.0","max_version":"5.0"}"#)
                .unwrap();
        assert!(d.matches_release(&release("MM", "4.5", &[])));
        assert!(!d.matches_release(&release("MM", "5.1", &[])));
    }

    #[test]
    fn test_mixed_bounds_rejected() {
        let result: Result<RelationshipDescriptor, _> =
            serde_json::from_str(r#"{"identifier":"MM","version":"4.0","min_version":"3.0"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_any_of_rejected() {
        let result: Result<RelationshipDescriptor, _> = serde_json::from_str(r#"{"any_of":[]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_provides_satisfies_with_bound() {
        let d: RelationshipDescriptor =
            serde_json::from_str(r#"{"identifier":"Parachutes","min_version":"1.0"}"#).unwrap();
        let provider = release("RealChutes", "2.0", &["Parachutes"]);
        assert!(d.matches_release(&provider));
    }

    #[test]
    fn test_any_of_first_match_wins() {
        let d: RelationshipDescriptor = serde_json::from_str(
            r#"{"any_of":[{"identifier":"A"},{"identifier":"B"}]}"#,
        )
        .unwrap();
        let b = release("B", "1.0", &[]);
        let a = release("A", "1.0", &[]);
        // Candidate order does not matter; alternative order does.
        let found = d.match_any(&[Arc::clone(&b), Arc::clone(&a)], &[], &[]).unwrap();
        match found {
            RelationshipMatch::Release(r) => assert_eq!(r.identifier, "A"),
            other => panic!("expected release match, got {:?}", other),
        }
    }

    #[test]
    fn test_dll_matches_only_unbounded() {
        let unbounded = RelationshipDescriptor::any_version("FerramDll");
        let bounded: RelationshipDescriptor =
            serde_json::from_str(r#"{"identifier":"FerramDll","min_version":"1.0"}"#).unwrap();
        let dlls = vec!["FerramDll".to_string()];

        assert!(matches!(
            unbounded.match_any(&[], &dlls, &[]),
            Some(RelationshipMatch::Dll(_))
        ));
        assert!(bounded.match_any(&[], &dlls, &[]).is_none());
    }

    #[test]
    fn test_dlc_matches_with_version() {
        let d: RelationshipDescriptor =
            serde_json::from_str(r#"{"identifier":"BreakingGround","min_version":"1.2"}"#).unwrap();
        let owned = vec![DlcFact::new("BreakingGround", v("1.7.1"))];
        assert!(matches!(
            d.match_any(&[], &[], &owned),
            Some(RelationshipMatch::Dlc(_))
        ));

        let too_old = vec![DlcFact::new("BreakingGround", v("1.0"))];
        assert!(d.match_any(&[], &[], &too_old).is_none());
    }

    #[test]
    fn test_releases_checked_before_dlls() {
        let d = RelationshipDescriptor::any_version("Thing");
        let candidates = vec![release("Thing", "1.0", &[])];
        let dlls = vec!["Thing".to_string()];
        assert!(matches!(
            d.match_any(&candidates, &dlls, &[]),
            Some(RelationshipMatch::Release(_))
        ));
    }

    #[test]
    fn test_suppress_flag_roundtrip() {
        let json = r#"{"identifier":"MM","suppress_recommendations":true}"#;
        let d: RelationshipDescriptor = serde_json::from_str(json).unwrap();
        assert!(d.suppress_recommendations());
        let back = serde_json::to_string(&d).unwrap();
        let again: RelationshipDescriptor = serde_json::from_str(&back).unwrap();
        assert_eq!(d, again);
    }

    #[test]
    fn test_display_forms() {
        let d: RelationshipDescriptor =
            serde_json::from_str(r#"{"any_of":[{"identifier":"A"},{"identifier":"B","version":"1.0"}]}"#)
                .unwrap();
        assert_eq!(d.to_string(), "any of [A, B (= 1.0)]");
    }
}
