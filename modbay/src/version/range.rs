//! Version bounds and ranges for relationship constraints.

use super::ModVersion;
use std::fmt;

/// Constraint a relationship descriptor places on a module version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionBound {
    /// Any version satisfies the descriptor.
    Any,
    /// Exactly this version.
    Exact(ModVersion),
    /// A half-open or closed interval.
    Range(VersionRange),
}

impl VersionBound {
    /// Whether `version` satisfies this bound.
    pub fn contains(&self, version: &ModVersion) -> bool {
        match self {
            VersionBound::Any => true,
            VersionBound::Exact(exact) => version == exact,
            VersionBound::Range(range) => range.contains(version),
        }
    }

    /// Whether the bound constrains the version at all.
    ///
    /// DLLs are version-opaque and may only satisfy unbounded descriptors.
    pub fn is_any(&self) -> bool {
        matches!(self, VersionBound::Any)
    }
}

impl fmt::Display for VersionBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionBound::Any => write!(f, "any version"),
            VersionBound::Exact(v) => write!(f, "= {}", v),
            VersionBound::Range(r) => write!(f, "{}", r),
        }
    }
}

/// An interval of module versions with independently inclusive endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub min: Option<ModVersion>,
    pub max: Option<ModVersion>,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Closed interval `[min, max]`; either side may be unbounded.
    pub fn inclusive(min: Option<ModVersion>, max: Option<ModVersion>) -> Self {
        VersionRange {
            min,
            max,
            min_inclusive: true,
            max_inclusive: true,
        }
    }

    /// Whether `version` lies in the interval.
    pub fn contains(&self, version: &ModVersion) -> bool {
        if let Some(min) = &self.min {
            let ok = if self.min_inclusive {
                version >= min
            } else {
                version > min
            };
            if !ok {
                return false;
            }
        }
        if let Some(max) = &self.max {
            let ok = if self.max_inclusive {
                version <= max
            } else {
                version < max
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Intersection of two ranges; `None` means the ranges are incompatible.
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, min_inclusive) = tighter_min(
            (&self.min, self.min_inclusive),
            (&other.min, other.min_inclusive),
        );
        let (max, max_inclusive) = tighter_max(
            (&self.max, self.max_inclusive),
            (&other.max, other.max_inclusive),
        );

        if let (Some(lo), Some(hi)) = (&min, &max) {
            if lo > hi || (lo == hi && !(min_inclusive && max_inclusive)) {
                return None;
            }
        }

        Some(VersionRange {
            min,
            max,
            min_inclusive,
            max_inclusive,
        })
    }
}

fn tighter_min(
    a: (&Option<ModVersion>, bool),
    b: (&Option<ModVersion>, bool),
) -> (Option<ModVersion>, bool) {
    match (a.0, b.0) {
        (None, None) => (None, true),
        (Some(v), None) => (Some(v.clone()), a.1),
        (None, Some(v)) => (Some(v.clone()), b.1),
        (Some(x), Some(y)) => {
            if x > y || (x == y && !a.1) {
                (Some(x.clone()), a.1)
            } else {
                (Some(y.clone()), b.1)
            }
        }
    }
}

fn tighter_max(
    a: (&Option<ModVersion>, bool),
    b: (&Option<ModVersion>, bool),
) -> (Option<ModVersion>, bool) {
    match (a.0, b.0) {
        (None, None) => (None, true),
        (Some(v), None) => (Some(v.clone()), a.1),
        (None, Some(v)) => (Some(v.clone()), b.1),
        (Some(x), Some(y)) => {
            if x < y || (x == y && !a.1) {
                (Some(x.clone()), a.1)
            } else {
                (Some(y.clone()), b.1)
            }
        }
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "any version"),
            (Some(min), None) => {
                write!(f, "{} {}", if self.min_inclusive { ">=" } else { ">" }, min)
            }
            (None, Some(max)) => {
                write!(f, "{} {}", if self.max_inclusive { "<=" } else { "<" }, max)
            }
            (Some(min), Some(max)) => write!(
                f,
                "{} {} and {} {}",
                if self.min_inclusive { ">=" } else { ">" },
                min,
                if self.max_inclusive { "<=" } else { "<" },
                max,
            ),
        }
    }
}
