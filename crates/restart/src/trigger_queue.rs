//! Reader for the manual trigger queue.
//!
//! The queue is a ConfigMap. Each entry `{key} -> {target}` marks a queued
//! target; an optional `{key}-reason-code` entry carries its build reason as a
//! decimal integer. The encoding has no ordering, so entries are read in key
//! order and no FIFO position is ever inferred.

use std::collections::BTreeMap;

use rekon_core::api::ConfigMap;
use rekon_core::{BuildReason, NamespacedName, RekonResult};
use rekon_kubehub::{get_typed, FetchCtx, ObjectStore};
use tracing::{debug, warn};

pub const REASON_CODE_SUFFIX: &str = "-reason-code";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerQueue {
    data: BTreeMap<String, String>,
}

impl TriggerQueue {
    /// Read the queue named `name`. A queue that was never created is empty.
    pub async fn fetch(store: &dyn ObjectStore, ctx: &FetchCtx, name: &str) -> RekonResult<Self> {
        match get_typed::<ConfigMap>(store, ctx, &NamespacedName::cluster(name)).await {
            Ok(cm) => Ok(Self::from_config_map(&cm)),
            Err(e) if e.is_not_found() => {
                debug!(queue = %name, "trigger_queue: not created yet, treating as empty");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn from_config_map(cm: &ConfigMap) -> Self { Self::from_data(cm.data.clone()) }

    pub fn from_data(data: BTreeMap<String, String>) -> Self { Self { data } }

    pub fn is_empty(&self) -> bool { self.entries().next().is_none() }

    /// Whether `name` is queued under any key.
    pub fn is_queued(&self, name: &str) -> bool { self.entries().any(|(_, target)| target == name) }

    /// Reason recorded for the first entry (in key order) queuing `name`.
    /// `NONE` if it is not queued; `TRIGGER_UNKNOWN` if the reason code is
    /// missing or not a decimal integer.
    ///
    /// Codes are read as signed 64-bit integers and cut to their low 32 bits,
    /// where every known flag lives. `-1` therefore sets every flag and
    /// `4294967300` reads as `CRASH`.
    pub fn reason_for(&self, name: &str) -> BuildReason {
        let Some((key, _)) = self.entries().find(|(_, target)| *target == name) else {
            return BuildReason::NONE;
        };
        let code_key = format!("{}{}", key, REASON_CODE_SUFFIX);
        match self.data.get(&code_key).map(|c| c.parse::<i64>()) {
            Some(Ok(code)) => BuildReason::from_bits(code as u32),
            Some(Err(_)) => {
                warn!(key = %code_key, "trigger_queue: unparsable reason code");
                BuildReason::TRIGGER_UNKNOWN
            }
            None => BuildReason::TRIGGER_UNKNOWN,
        }
    }

    /// Targets currently queued, in key order, without duplicates.
    pub fn queued_names(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (_, target) in self.entries() {
            if !out.contains(&target) {
                out.push(target);
            }
        }
        out
    }

    fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.data
            .iter()
            .filter(|(k, _)| !k.ends_with(REASON_CODE_SUFFIX))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(pairs: &[(&str, &str)]) -> TriggerQueue {
        TriggerQueue::from_data(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn queued_with_reason_code() {
        let q = queue(&[("t1", "my-target"), ("t1-reason-code", "4")]);
        assert!(q.is_queued("my-target"));
        assert_eq!(q.reason_for("my-target"), BuildReason::CRASH);
        assert!(!q.is_queued("other"));
        assert_eq!(q.reason_for("other"), BuildReason::NONE);
    }

    #[test]
    fn missing_or_bad_code_is_unknown_trigger() {
        let q = queue(&[("t1", "a"), ("t2", "b"), ("t2-reason-code", "soon")]);
        assert_eq!(q.reason_for("a"), BuildReason::TRIGGER_UNKNOWN);
        assert_eq!(q.reason_for("b"), BuildReason::TRIGGER_UNKNOWN);
    }

    #[test]
    fn reason_code_entries_are_not_targets() {
        // a reason code value that happens to equal a target name
        let q = queue(&[("t1-reason-code", "16")]);
        assert!(!q.is_queued("16"));
        assert!(q.is_empty());
    }

    #[test]
    fn combined_flags_keep_every_bit() {
        let q = queue(&[("t1", "a"), ("t1-reason-code", "48")]);
        assert_eq!(q.reason_for("a"), BuildReason::TRIGGER_WEB | BuildReason::TRIGGER_CLI);
    }

    #[test]
    fn out_of_range_codes_keep_their_low_bits() {
        let q = queue(&[("t1", "neg"), ("t1-reason-code", "-1"), ("t2", "wide"), ("t2-reason-code", "4294967300")]);
        assert_eq!(q.reason_for("neg"), BuildReason::from_bits(u32::MAX));
        assert!(q.reason_for("neg").contains(BuildReason::TRIGGER_CLI));
        assert_eq!(q.reason_for("wide"), BuildReason::CRASH);

        let q = queue(&[("t1", "huge"), ("t1-reason-code", "99999999999999999999")]);
        assert_eq!(q.reason_for("huge"), BuildReason::TRIGGER_UNKNOWN);
    }

    #[test]
    fn first_key_wins_and_names_dedup() {
        let q = queue(&[("b", "x"), ("b-reason-code", "32"), ("a", "x"), ("a-reason-code", "64"), ("c", "y")]);
        assert_eq!(q.reason_for("x"), BuildReason::TRIGGER_HUD);
        assert_eq!(q.queued_names(), vec!["x", "y"]);
    }
}
