//! Typed error codes surfaced by the version manager.
//!
//! Two classes (matching the contract of the public operations):
//! - User errors: unknown id, double-attach, rule rejections, over-limit.
//!   State is unchanged on failure.
//! - Adapter errors: mstore / presentation plumbing keeps anyhow::Result
//!   internally (with context); whatever crosses the manager boundary is
//!   wrapped into `VersionError::Persistence`.
//!
//! Invariant violations (corrupt bootstrap stream, detach of a non-attached
//! version, deregister of an untracked id) are not errors — they panic.

use thiserror::Error;

/// Result type for version-manager operations.
pub type VResult<T> = Result<T, VersionError>;

#[derive(Debug, Error)]
pub enum VersionError {
    /// No record with this id in the store.
    #[error("version {0} not found")]
    NotFound(u32),

    /// Malformed caller input (deleting the root, double zero_init,
    /// conflicting tag, ...).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The version is already attached to a writer.
    #[error("version {0} is already attached")]
    Busy(u32),

    /// Lifetime creation cap reached.
    #[error("cannot create more than {0} versions")]
    OverLimit(u32),

    /// Record allocation failed. Kept for adapters with bounded allocators;
    /// the in-process store itself never raises it.
    #[error("version allocation failed")]
    OutOfMemory,

    /// The snapshot/clone creation rules rejected the new version.
    #[error("snapshot/clone rules rejected the new version")]
    RuleViolation,

    /// Metadata-store or presentation adapter failure.
    #[error("metadata adapter failure: {0}")]
    Persistence(#[from] anyhow::Error),
}
