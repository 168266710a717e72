//! Rekon restart – decide whether a target's declared dependencies ask for a
//! rebuild, and why.
//!
//! * `restart_on`: fetch the file watches and buttons a target depends on and
//!   aggregate their event timestamps and changed files.
//! * `trigger_queue`: read the manual trigger queue (a ConfigMap).
//! * `decision`: fold both into a single `RestartDecision`.

#![forbid(unsafe_code)]

pub mod decision;
pub mod restart_on;
pub mod trigger_queue;

pub use decision::{decide, DecisionInputs, RestartChecker, RestartDecision};
pub use restart_on::{files_changed, last_restart_event, DependencyFetcher};
pub use trigger_queue::{TriggerQueue, REASON_CODE_SUFFIX};
