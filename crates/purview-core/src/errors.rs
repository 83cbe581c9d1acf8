//! Layer and freeze error types.

use thiserror::Error;

/// Errors from write operations against a configuration layer.
#[derive(Debug, Error)]
pub enum LayerError {
    /// A write was attempted on a layer that has been frozen.
    #[error("layer '{label}' is frozen and rejects writes")]
    Frozen {
        /// Label of the layer that rejected the write.
        label: String,
    },
}

/// Result type for layer operations; freeze-time paths override `E` with
/// [`FreezeError`].
pub type Result<T, E = LayerError> = std::result::Result<T, E>;

/// Errors raised by freeze rules while a layer is being frozen.
///
/// A failed freeze leaves the layer open and its entries unchanged.
#[derive(Debug, Error)]
pub enum FreezeError {
    /// A key the rule requires was absent at freeze time.
    #[error("freeze rule '{rule}' requires key '{key}', which is absent")]
    MissingKey {
        /// Name of the rule that failed.
        rule: String,
        /// The key that was required but absent.
        key: String,
    },
    /// A rule vetoed the layer's contents.
    #[error("freeze rule '{rule}' rejected key '{key}': {reason}")]
    Rejected {
        /// Name of the rule that failed.
        rule: String,
        /// The key the rule objected to.
        key: String,
        /// Why the rule rejected it.
        reason: String,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
