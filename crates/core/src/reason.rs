//! Build reasons: an integer bitmask explaining why a rebuild was requested.
//! The numeric values are part of the trigger queue wire format.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildReason(u32);

impl BuildReason {
    pub const NONE: BuildReason = BuildReason(0);
    pub const CHANGED_FILES: BuildReason = BuildReason(1 << 0);
    pub const CONFIG: BuildReason = BuildReason(1 << 1);
    pub const CRASH: BuildReason = BuildReason(1 << 2);
    pub const INIT: BuildReason = BuildReason(1 << 3);
    pub const TRIGGER_WEB: BuildReason = BuildReason(1 << 4);
    pub const TRIGGER_CLI: BuildReason = BuildReason(1 << 5);
    pub const TRIGGER_HUD: BuildReason = BuildReason(1 << 6);
    pub const TRIGGER_UNKNOWN: BuildReason = BuildReason(1 << 7);
    pub const TILTFILE_ARGS: BuildReason = BuildReason(1 << 8);
    pub const CHANGED_DEPS: BuildReason = BuildReason(1 << 9);

    const NAMES: [(BuildReason, &'static str); 10] = [
        (Self::CHANGED_FILES, "Changed Files"),
        (Self::CONFIG, "Config Changed"),
        (Self::CRASH, "Pod Crashed, Lost live_update Changes"),
        (Self::INIT, "Initial Build"),
        (Self::TRIGGER_WEB, "Web Trigger"),
        (Self::TRIGGER_CLI, "CLI Trigger"),
        (Self::TRIGGER_HUD, "Terminal Trigger"),
        (Self::TRIGGER_UNKNOWN, "Unknown Trigger"),
        (Self::TILTFILE_ARGS, "Args Changed"),
        (Self::CHANGED_DEPS, "Dependency Updated"),
    ];

    /// Keeps unknown bits so codes written by newer writers round-trip.
    pub const fn from_bits(bits: u32) -> Self { BuildReason(bits) }

    pub const fn bits(self) -> u32 { self.0 }

    pub const fn is_none(self) -> bool { self.0 == 0 }

    pub const fn contains(self, other: BuildReason) -> bool { self.0 & other.0 == other.0 }

    pub const fn with(self, other: BuildReason) -> Self { BuildReason(self.0 | other.0) }

    pub fn is_trigger(self) -> bool {
        [Self::TRIGGER_WEB, Self::TRIGGER_CLI, Self::TRIGGER_HUD, Self::TRIGGER_UNKNOWN]
            .iter()
            .any(|f| self.contains(*f))
    }

    /// Human-readable names of the set flags, lowest bit first.
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES.iter().filter(|(f, _)| self.contains(*f)).map(|(_, n)| *n).collect()
    }
}

impl std::ops::BitOr for BuildReason {
    type Output = BuildReason;
    fn bitor(self, rhs: BuildReason) -> BuildReason { self.with(rhs) }
}

impl std::ops::BitOrAssign for BuildReason {
    fn bitor_assign(&mut self, rhs: BuildReason) { self.0 |= rhs.0; }
}

impl std::fmt::Display for BuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_none() { return f.write_str("None"); }
        let names = self.names();
        if names.is_empty() { return write!(f, "Unknown({})", self.0); }
        f.write_str(&names.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_contain() {
        let r = BuildReason::CHANGED_FILES | BuildReason::TRIGGER_CLI;
        assert!(r.contains(BuildReason::CHANGED_FILES));
        assert!(r.contains(BuildReason::TRIGGER_CLI));
        assert!(!r.contains(BuildReason::CRASH));
        assert!(r.is_trigger());
        assert_eq!(r.bits(), 33);
    }

    #[test]
    fn none_contains_only_none() {
        assert!(BuildReason::NONE.is_none());
        assert!(BuildReason::NONE.contains(BuildReason::NONE));
        assert!(!BuildReason::NONE.contains(BuildReason::INIT));
        assert_eq!(BuildReason::NONE.to_string(), "None");
    }

    #[test]
    fn display_lists_flag_names() {
        let r = BuildReason::from_bits(1 | 128);
        assert_eq!(r.to_string(), "Changed Files | Unknown Trigger");
        assert_eq!(BuildReason::from_bits(1 << 20).to_string(), "Unknown(1048576)");
    }
}
