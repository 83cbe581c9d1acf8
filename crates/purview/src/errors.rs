//! Context and scope error types.

use purview_core::{FreezeError, LayerError};
use thiserror::Error;

/// Errors from registry, handle, and scope operations.
///
/// All of these are local and fatal to the caller: nothing is retried, and
/// the failed operation leaves registry and stacks unchanged.
#[derive(Debug, Error)]
pub enum ContextError {
    /// A context with this name is already registered.
    #[error("context '{name}' is already registered")]
    Duplicate {
        /// The contested name.
        name: String,
    },
    /// No context is registered under this name.
    #[error("no context registered under '{name}'")]
    Unknown {
        /// The name that was looked up.
        name: String,
    },
    /// A pop did not match the innermost scope on this thread.
    #[error("scope mismatch on context '{context}': {reason}")]
    ScopeMismatch {
        /// Name of the context the pop targeted.
        context: String,
        /// What specifically did not line up.
        reason: String,
    },
    /// A write was rejected by a frozen layer.
    #[error("write rejected: {0}")]
    Layer(#[from] LayerError),
    /// A freeze rule vetoed freezing the layer.
    #[error("freeze failed: {0}")]
    Freeze(#[from] FreezeError),
}

/// Result type for context operations.
pub type Result<T> = std::result::Result<T, ContextError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
