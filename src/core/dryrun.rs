//! Dry-run levels

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-wide cap on side effects modules may perform
///
/// Levels are ordered: an action gated at threshold `T` is disallowed once the active
/// level is at least `T`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DryRunLevel {
    /// Everything is allowed
    #[default]
    Default,
    /// No changes to the outside world
    Dry,
    /// No interaction with the outside world at all
    Isolated,
}

impl DryRunLevel {
    /// Map the `dry-run` and `isolated-run` flags to a level; isolated outranks dry
    pub fn from_flags(dry_run: bool, isolated_run: bool) -> Self {
        if isolated_run {
            DryRunLevel::Isolated
        } else if dry_run {
            DryRunLevel::Dry
        } else {
            DryRunLevel::Default
        }
    }

    pub fn is_enabled(self) -> bool {
        self != DryRunLevel::Default
    }

    /// Whether an action gated at `threshold` may run under this level
    pub fn allows(self, threshold: DryRunLevel) -> bool {
        self < threshold
    }
}

impl fmt::Display for DryRunLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DryRunLevel::Default => "DEFAULT",
            DryRunLevel::Dry => "DRY",
            DryRunLevel::Isolated => "ISOLATED",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_flags() {
        assert_eq!(DryRunLevel::from_flags(false, false), DryRunLevel::Default);
        assert_eq!(DryRunLevel::from_flags(true, false), DryRunLevel::Dry);
        assert_eq!(DryRunLevel::from_flags(false, true), DryRunLevel::Isolated);
        assert_eq!(DryRunLevel::from_flags(true, true), DryRunLevel::Isolated);
    }

    #[test]
    fn test_thresholds() {
        assert!(DryRunLevel::Default.allows(DryRunLevel::Dry));
        assert!(!DryRunLevel::Dry.allows(DryRunLevel::Dry));
        assert!(DryRunLevel::Dry.allows(DryRunLevel::Isolated));
        assert!(!DryRunLevel::Isolated.allows(DryRunLevel::Isolated));
        assert!(DryRunLevel::Default < DryRunLevel::Dry && DryRunLevel::Dry < DryRunLevel::Isolated);
    }
}
