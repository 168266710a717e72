//! Error taxonomy shared by every Rekon crate.

use serde::{Deserialize, Serialize};

/// Errors surfaced to the reconciliation loop. Nothing here is retried
/// internally; callers re-run the pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum RekonError {
    /// Ownership was requested for an object with no live identity.
    #[error("can only get owners of deployed entities: {0}")]
    NotDeployed(String),
    #[error("not_found: {kind} {name}")]
    NotFound { kind: String, name: String },
    /// An apply record lists an entity that was never materialized.
    #[error("entity not deployed correctly: {0}")]
    IncompleteApply(String),
    #[error("cyclic ownership: {0}")]
    CyclicOwnership(String),
    #[error("reading pod template spec hashes: {0}")]
    TemplateHash(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("store: {0}")]
    Store(String),
    #[error("canceled")]
    Canceled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

pub type RekonResult<T> = Result<T, RekonError>;

impl RekonError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound { kind: kind.into(), name: name.into() }
    }

    pub fn is_not_found(&self) -> bool { matches!(self, Self::NotFound { .. }) }

    /// Cancellation and deadline errors abort a pass; they are not store failures.
    pub fn is_interrupted(&self) -> bool { matches!(self, Self::Canceled | Self::DeadlineExceeded) }
}
