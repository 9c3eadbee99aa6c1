//! Stateless consistency checks over a set of releases.
//!
//! Used both as the final gate on resolver output and by callers that want
//! to validate an installed set against freshly synced metadata.

use crate::relationship::{RelationshipDescriptor, RelationshipMatch};
use crate::release::{DlcFact, Release};
use std::fmt;
use std::sync::Arc;

/// Everything wrong with a module set.
#[derive(Debug, Default)]
pub struct SanityIssues {
    /// `(release, descriptor)` pairs where nothing satisfies a dependency.
    pub unmet: Vec<(Arc<Release>, RelationshipDescriptor)>,
    /// `(release, descriptor, matched)` triples where a conflict clause
    /// matches something else in the population.
    pub conflicts: Vec<(Arc<Release>, RelationshipDescriptor, RelationshipMatch)>,
}

impl SanityIssues {
    pub fn is_clean(&self) -> bool {
        self.unmet.is_empty() && self.conflicts.is_empty()
    }
}

/// Raised by [`enforce_consistency`] when a module set is inconsistent.
#[derive(Debug)]
pub struct BadRelationships {
    pub issues: SanityIssues,
}

impl std::error::Error for BadRelationships {}

impl fmt::Display for BadRelationships {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (release, descriptor) in &self.issues.unmet {
            parts.push(format!("{} requires {}", release, descriptor));
        }
        for (release, descriptor, matched) in &self.issues.conflicts {
            let target = match matched {
                RelationshipMatch::Release(other) => other.to_string(),
                RelationshipMatch::Dll(name) => format!("DLL {}", name),
                RelationshipMatch::Dlc(fact) => format!("DLC {}", fact.identifier),
            };
            parts.push(format!(
                "{} conflicts with {} (via {})",
                release, target, descriptor
            ));
        }
        write!(f, "inconsistent module set: {}", parts.join("; "))
    }
}

/// Scan `modules` for unmet dependencies and conflicts.
///
/// A dependency may be satisfied by another module, a DLL, or a DLC fact. A
/// conflict clause matching the release's own identifier is ignored; mods
/// routinely conflict with older renamings of themselves.
pub fn check(modules: &[Arc<Release>], dlls: &[String], dlc: &[DlcFact]) -> SanityIssues {
    let mut issues = SanityIssues::default();

    for release in modules {
        for descriptor in &release.depends {
            if descriptor.match_any(modules, dlls, dlc).is_none() {
                issues.unmet.push((Arc::clone(release), descriptor.clone()));
            }
        }

        for descriptor in &release.conflicts {
            let others: Vec<Arc<Release>> = modules
                .iter()
                .filter(|other| other.identifier != release.identifier)
                .map(Arc::clone)
                .collect();
            if let Some(matched) = descriptor.match_any(&others, dlls, dlc) {
                issues
                    .conflicts
                    .push((Arc::clone(release), descriptor.clone(), matched));
            }
        }
    }

    issues
}

/// Whether the module set has no unmet dependencies and no conflicts.
pub fn is_consistent(modules: &[Arc<Release>], dlls: &[String], dlc: &[DlcFact]) -> bool {
    check(modules, dlls, dlc).is_clean()
}

/// Error out unless the module set is consistent.
pub fn enforce_consistency(
    modules: &[Arc<Release>],
    dlls: &[String],
    dlc: &[DlcFact],
) -> Result<(), BadRelationships> {
    let issues = check(modules, dlls, dlc);
    if issues.is_clean() {
        Ok(())
    } else {
        Err(BadRelationships { issues })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::ModVersion;

    fn release(json: &str) -> Arc<Release> {
        Arc::new(serde_json::from_str(json).unwrap())
    }

    #[test]
    fn test_clean_set() {
        let modules = vec![
            release(r#"{"identifier":"A","version":"1.0","depends":[{"identifier":"B"}]}"#),
            release(r#"{"identifier":"B","version":"2.0"}"#),
        ];
        assert!(is_consistent(&modules, &[], &[]));
    }

    #[test]
    fn test_unmet_dependency_reported() {
        let modules =
            vec![release(r#"{"identifier":"A","version":"1.0","depends":[{"identifier":"Z"}]}"#)];
        let issues = check(&modules, &[], &[]);
        assert_eq!(issues.unmet.len(), 1);
        assert_eq!(issues.unmet[0].0.identifier, "A");
    }

    #[test]
    fn test_dll_satisfies_dependency() {
        let modules =
            vec![release(r#"{"identifier":"A","version":"1.0","depends":[{"identifier":"Z"}]}"#)];
        let dlls = vec!["Z".to_string()];
        assert!(is_consistent(&modules, &dlls, &[]));
    }

    #[test]
    fn test_dlc_satisfies_versioned_dependency() {
        let modules = vec![release(
            r#"{"identifier":"A","version":"1.0","depends":[{"identifier":"BreakingGround","min_version":"1.5"}]}"#,
        )];
        let dlc = vec![DlcFact::new(
            "BreakingGround",
            "1.7.1".parse::<ModVersion>().unwrap(),
        )];
        assert!(is_consistent(&modules, &[], &dlc));
    }

    #[test]
    fn test_conflict_reported() {
        let modules = vec![
            release(r#"{"identifier":"A","version":"1.0","conflicts":[{"identifier":"B"}]}"#),
            release(r#"{"identifier":"B","version":"2.0"}"#),
        ];
        let issues = check(&modules, &[], &[]);
        assert_eq!(issues.conflicts.len(), 1);
        match &issues.conflicts[0].2 {
            RelationshipMatch::Release(other) => assert_eq!(other.identifier, "B"),
            other => panic!("unexpected match {:?}", other),
        }
    }

    #[test]
    fn test_self_conflict_ignored() {
        // A conflict clause naming our own identifier must not fire.
        let modules = vec![release(
            r#"{"identifier":"A","version":"1.0","conflicts":[{"identifier":"A"}]}"#,
        )];
        assert!(is_consistent(&modules, &[], &[]));
    }

    #[test]
    fn test_conflict_against_dll() {
        let modules = vec![release(
            r#"{"identifier":"A","version":"1.0","conflicts":[{"identifier":"LegacyDll"}]}"#,
        )];
        let dlls = vec!["LegacyDll".to_string()];
        let issues = check(&modules, &dlls, &[]);
        assert_eq!(issues.conflicts.len(), 1);
    }

    #[test]
    fn test_versioned_conflict_spares_out_of_range() {
        let modules = vec![
            release(
                r#"{"identifier":"A","version":"1.0","conflicts":[{"identifier":"B","max_version":"1.5"}]}"#,
            ),
            release(r#"{"identifier":"B","version":"2.0"}"#),
        ];
        assert!(is_consistent(&modules, &[], &[]));
    }

    #[test]
    fn test_enforce_returns_structured_error() {
        let modules =
            vec![release(r#"{"identifier":"A","version":"1.0","depends":[{"identifier":"Z"}]}"#)];
        let err = enforce_consistency(&modules, &[], &[]).unwrap_err();
        assert_eq!(err.issues.unmet.len(), 1);
        assert!(err.to_string().contains("A 1.0 requires Z"));
    }
}
