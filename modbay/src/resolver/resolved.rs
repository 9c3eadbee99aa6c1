//! Resolution nodes: how each relationship ended up satisfied, or why not.

use crate::relationship::RelationshipDescriptor;
use crate::release::Release;
use std::fmt;
use std::sync::Arc;

/// Why a release entered the resolution.
#[derive(Debug, Clone)]
pub enum SelectionReason {
    UserRequested,
    Depends(Arc<Release>),
    Recommendation(Arc<Release>),
    Suggestion(Arc<Release>),
    Replacement(Arc<Release>),
    ProvidedBy(Arc<Release>),
}

impl SelectionReason {
    /// The release that caused this selection, if any.
    pub fn parent(&self) -> Option<&Arc<Release>> {
        match self {
            SelectionReason::UserRequested => None,
            SelectionReason::Depends(parent)
            | SelectionReason::Recommendation(parent)
            | SelectionReason::Suggestion(parent)
            | SelectionReason::Replacement(parent)
            | SelectionReason::ProvidedBy(parent) => Some(parent),
        }
    }

    /// Whether failure of this selection is tolerable.
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            SelectionReason::Recommendation(_) | SelectionReason::Suggestion(_)
        )
    }
}

impl fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionReason::UserRequested => write!(f, "requested by the user"),
            SelectionReason::Depends(parent) => write!(f, "dependency of {}", parent),
            SelectionReason::Recommendation(parent) => write!(f, "recommended by {}", parent),
            SelectionReason::Suggestion(parent) => write!(f, "suggested by {}", parent),
            SelectionReason::Replacement(parent) => write!(f, "replacement for {}", parent),
            SelectionReason::ProvidedBy(parent) => write!(f, "provides a need of {}", parent),
        }
    }
}

/// One provider attempted for a `ByNew` relationship, with the resolutions
/// of its own dependencies.
#[derive(Debug, Clone)]
pub struct ProviderResolution {
    pub provider: Arc<Release>,
    pub resolutions: Vec<ResolvedRelationship>,
    /// Whether this provider's whole subtree resolved.
    pub satisfied: bool,
}

/// How one relationship was resolved.
///
/// `source` is the release whose relationship this is; `None` means it came
/// straight from a user request.
#[derive(Debug, Clone)]
pub enum ResolvedRelationship {
    /// Satisfied by something already installed (including DLC, which is
    /// modeled as an unmanaged installed release).
    ByInstalled {
        source: Option<Arc<Release>>,
        descriptor: RelationshipDescriptor,
        reason: SelectionReason,
        installed: Arc<Release>,
    },
    /// Satisfied by a release already chosen earlier in this resolution.
    ByInstalling {
        source: Option<Arc<Release>>,
        descriptor: RelationshipDescriptor,
        reason: SelectionReason,
        chosen: Arc<Release>,
    },
    /// Satisfied by an ambient DLL.
    ByDll {
        source: Option<Arc<Release>>,
        descriptor: RelationshipDescriptor,
        reason: SelectionReason,
        dll: String,
    },
    /// Needs something new; `providers` records every candidate attempted.
    /// No satisfied provider means the relationship is unsatisfiable, and an
    /// empty provider list is the unsatisfiable leaf of an explanation
    /// trace.
    ByNew {
        source: Option<Arc<Release>>,
        descriptor: RelationshipDescriptor,
        reason: SelectionReason,
        providers: Vec<ProviderResolution>,
    },
}

impl ResolvedRelationship {
    pub fn source(&self) -> Option<&Arc<Release>> {
        match self {
            ResolvedRelationship::ByInstalled { source, .. }
            | ResolvedRelationship::ByInstalling { source, .. }
            | ResolvedRelationship::ByDll { source, .. }
            | ResolvedRelationship::ByNew { source, .. } => source.as_ref(),
        }
    }

    pub fn descriptor(&self) -> &RelationshipDescriptor {
        match self {
            ResolvedRelationship::ByInstalled { descriptor, .. }
            | ResolvedRelationship::ByInstalling { descriptor, .. }
            | ResolvedRelationship::ByDll { descriptor, .. }
            | ResolvedRelationship::ByNew { descriptor, .. } => descriptor,
        }
    }

    pub fn reason(&self) -> &SelectionReason {
        match self {
            ResolvedRelationship::ByInstalled { reason, .. }
            | ResolvedRelationship::ByInstalling { reason, .. }
            | ResolvedRelationship::ByDll { reason, .. }
            | ResolvedRelationship::ByNew { reason, .. } => reason,
        }
    }

    /// Whether this node's subtree resolved.
    pub fn is_satisfied(&self) -> bool {
        match self {
            ResolvedRelationship::ByInstalled { .. }
            | ResolvedRelationship::ByInstalling { .. }
            | ResolvedRelationship::ByDll { .. } => true,
            ResolvedRelationship::ByNew { providers, .. } => {
                providers.iter().any(|provider| provider.satisfied)
            }
        }
    }

    /// Whether `release` appears anywhere in this subtree.
    pub fn contains(&self, release: &Release) -> bool {
        let same = |other: &Arc<Release>| {
            other.identifier == release.identifier && other.version == release.version
        };
        match self {
            ResolvedRelationship::ByInstalled { installed, .. } => same(installed),
            ResolvedRelationship::ByInstalling { chosen, .. } => same(chosen),
            ResolvedRelationship::ByDll { .. } => false,
            ResolvedRelationship::ByNew { providers, .. } => providers.iter().any(|provider| {
                same(&provider.provider)
                    || provider
                        .resolutions
                        .iter()
                        .any(|child| child.contains(release))
            }),
        }
    }

    /// Same resolution, re-attributed to a different source and reason.
    ///
    /// Used when a memoized resolution satisfies a second relationship.
    pub fn with_source(
        &self,
        source: Option<Arc<Release>>,
        reason: SelectionReason,
    ) -> ResolvedRelationship {
        let mut clone = self.clone();
        match &mut clone {
            ResolvedRelationship::ByInstalled {
                source: s,
                reason: r,
                ..
            }
            | ResolvedRelationship::ByInstalling {
                source: s,
                reason: r,
                ..
            }
            | ResolvedRelationship::ByDll {
                source: s,
                reason: r,
                ..
            }
            | ResolvedRelationship::ByNew {
                source: s,
                reason: r,
                ..
            } => {
                *s = source;
                *r = reason;
            }
        }
        clone
    }

    /// Explanation traces: every path from this node down to an
    /// unsatisfiable leaf. Empty when the node is satisfied.
    pub fn unsatisfied_from(
        &self,
        prefix: &[ResolvedRelationship],
    ) -> Vec<Vec<ResolvedRelationship>> {
        if self.is_satisfied() {
            return Vec::new();
        }
        let mut path = prefix.to_vec();
        path.push(self.clone());

        match self {
            ResolvedRelationship::ByNew { providers, .. } => {
                let mut traces = Vec::new();
                for provider in providers {
                    for child in &provider.resolutions {
                        traces.extend(child.unsatisfied_from(&path));
                    }
                }
                if traces.is_empty() {
                    // No deeper explanation (no providers at all, or a
                    // provider rejected by a conflict): this node is the leaf.
                    traces.push(path);
                }
                traces
            }
            // Satisfied variants never reach here.
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for ResolvedRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source() {
            Some(release) => release.to_string(),
            None => "user".to_string(),
        };
        match self {
            ResolvedRelationship::ByInstalled { installed, .. } => {
                write!(f, "{} -> {} (installed)", source, installed)
            }
            ResolvedRelationship::ByInstalling { chosen, .. } => {
                write!(f, "{} -> {} (installing)", source, chosen)
            }
            ResolvedRelationship::ByDll { dll, .. } => {
                write!(f, "{} -> {} (dll)", source, dll)
            }
            ResolvedRelationship::ByNew {
                descriptor,
                providers,
                ..
            } => {
                if providers.is_empty() {
                    write!(f, "{} -> {} (no providers)", source, descriptor)
                } else {
                    write!(
                        f,
                        "{} -> {} ({} providers)",
                        source,
                        descriptor,
                        providers.len()
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(identifier: &str, version: &str) -> Arc<Release> {
        Arc::new(
            serde_json::from_str(&format!(
                r#"{{"identifier":"{}","version":"{}"}}"#,
                identifier, version
            ))
            .unwrap(),
        )
    }

    fn by_new_leaf(source: Option<Arc<Release>>, identifier: &str) -> ResolvedRelationship {
        ResolvedRelationship::ByNew {
            source,
            descriptor: RelationshipDescriptor::any_version(identifier),
            reason: SelectionReason::UserRequested,
            providers: vec![],
        }
    }

    #[test]
    fn test_installed_is_satisfied() {
        let node = ResolvedRelationship::ByInstalled {
            source: None,
            descriptor: RelationshipDescriptor::any_version("A"),
            reason: SelectionReason::UserRequested,
            installed: release("A", "1.0"),
        };
        assert!(node.is_satisfied());
        assert!(node.unsatisfied_from(&[]).is_empty());
    }

    #[test]
    fn test_empty_providers_is_unsatisfied_leaf() {
        let node = by_new_leaf(None, "Ghost");
        assert!(!node.is_satisfied());
        let traces = node.unsatisfied_from(&[]);
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].len(), 1);
    }

    #[test]
    fn test_nested_trace_path() {
        let a = release("A", "1.0");
        let b = release("B", "1.0");
        let leaf = by_new_leaf(Some(Arc::clone(&b)), "C");
        let middle = ResolvedRelationship::ByNew {
            source: Some(Arc::clone(&a)),
            descriptor: RelationshipDescriptor::any_version("B"),
            reason: SelectionReason::Depends(Arc::clone(&a)),
            providers: vec![ProviderResolution {
                provider: Arc::clone(&b),
                resolutions: vec![leaf],
                satisfied: false,
            }],
        };
        let root = ResolvedRelationship::ByNew {
            source: None,
            descriptor: RelationshipDescriptor::any_version("A"),
            reason: SelectionReason::UserRequested,
            providers: vec![ProviderResolution {
                provider: Arc::clone(&a),
                resolutions: vec![middle],
                satisfied: false,
            }],
        };

        let traces = root.unsatisfied_from(&[]);
        assert_eq!(traces.len(), 1);
        let path = &traces[0];
        assert_eq!(path.len(), 3);
        assert!(matches!(path[2], ResolvedRelationship::ByNew { ref providers, .. } if providers.is_empty()));
    }

    #[test]
    fn test_contains_walks_providers() {
        let a = release("A", "1.0");
        let node = ResolvedRelationship::ByNew {
            source: None,
            descriptor: RelationshipDescriptor::any_version("A"),
            reason: SelectionReason::UserRequested,
            providers: vec![ProviderResolution {
                provider: Arc::clone(&a),
                resolutions: vec![],
                satisfied: true,
            }],
        };
        assert!(node.contains(&a));
        assert!(!node.contains(&release("B", "1.0")));
    }

    #[test]
    fn test_with_source_reattributes() {
        let a = release("A", "1.0");
        let node = by_new_leaf(None, "X");
        let reattributed = node.with_source(
            Some(Arc::clone(&a)),
            SelectionReason::Depends(Arc::clone(&a)),
        );
        assert_eq!(reattributed.source().unwrap().identifier, "A");
        assert!(matches!(
            reattributed.reason(),
            SelectionReason::Depends(_)
        ));
    }
}
