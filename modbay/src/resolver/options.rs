//! Resolver configuration.

use crate::release::Stability;

/// Knobs for one `resolve()` run.
///
/// Recommendations expand one level deep: recommendations of recommendations
/// are never followed, and suggestions reached through a recommendation are
/// dropped unless `with_all_suggests` is set.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Expand `recommends` into the plan.
    pub with_recommends: bool,
    /// Expand `suggests` into the plan.
    pub with_suggests: bool,
    /// Also follow suggests reached transitively through optional expansions.
    pub with_all_suggests: bool,
    /// Collect `supports` back-references from the registry.
    pub with_supports: bool,
    /// Record unmet relationships and conflicts instead of failing.
    pub proceed_with_inconsistencies: bool,
    /// Maximum pre-release level of candidate releases.
    pub stability_tolerance: Stability,
    /// Collect the recommendation/suggestion maps for a picker dialog
    /// without expanding them into the plan.
    pub get_recommenders: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            with_recommends: true,
            with_suggests: false,
            with_all_suggests: false,
            with_supports: false,
            proceed_with_inconsistencies: false,
            stability_tolerance: Stability::Stable,
            get_recommenders: false,
        }
    }
}

impl ResolverOptions {
    /// Dependencies only: no optional expansion at all.
    pub fn depends_only() -> Self {
        ResolverOptions {
            with_recommends: false,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ResolverOptions::default();
        assert!(options.with_recommends);
        assert!(!options.with_suggests);
        assert!(!options.proceed_with_inconsistencies);
        assert_eq!(options.stability_tolerance, Stability::Stable);
    }

    #[test]
    fn test_depends_only() {
        assert!(!ResolverOptions::depends_only().with_recommends);
    }
}
