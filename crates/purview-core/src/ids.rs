//! Identifier newtypes for contexts and scopes.
//!
//! A [`ContextId`] is unique for the lifetime of the process, minted from a
//! process-wide counter. Per-thread scope storage is keyed by it, so contexts
//! from distinct registries never collide even when they share a name.
//!
//! A [`ScopeToken`] pairs the owning context with a per-thread sequence
//! number; it identifies exactly one pushed scope layer and is required to
//! pop that layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier for a named context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(u64);

impl ContextId {
    /// Mint the next process-unique identifier.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Return the inner numeric value.
    #[must_use]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token minted by a scope push, required to pop exactly that layer.
///
/// Tokens are `Copy`; a stale copy used for a second pop fails the
/// top-of-stack check rather than corrupting the stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[must_use = "a scope token must be retained to pop the scope it was minted for"]
pub struct ScopeToken {
    context: ContextId,
    sequence: u64,
}

impl ScopeToken {
    /// Create a token for the given context and sequence number.
    ///
    /// Tokens are normally minted by a scope push; a hand-built token can
    /// only pop a layer whose context and sequence both match.
    pub fn new(context: ContextId, sequence: u64) -> Self {
        Self { context, sequence }
    }

    /// The context this token was minted for.
    #[must_use]
    pub fn context_id(self) -> ContextId {
        self.context
    }

    /// The per-thread sequence number of the pushed layer.
    #[must_use]
    pub fn sequence(self) -> u64 {
        self.sequence
    }
}

impl fmt::Display for ScopeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.context, self.sequence)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
