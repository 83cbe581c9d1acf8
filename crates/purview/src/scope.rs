//! Per-thread scope stacks and the RAII scope guard.
//!
//! Each thread is its own execution unit: it sees a private stack of scoped
//! override layers per context, layered over the shared base. Storage is a
//! `thread_local!` map keyed by [`ContextId`], so two registries holding a
//! context of the same name never collide. The per-thread stack is released
//! when the last scope pops; only the token sequence counter outlives it.
//!
//! Scope layers are frozen through the registry's `Freezer` before any
//! thread-local state is touched, so freeze rules are free to read back
//! through handles (this context's included) while they run.
//!
//! Strict nesting is enforced with [`ScopeToken`]s: a pop must present the
//! token of the innermost scope, and a failed pop leaves the stack exactly
//! as it was. [`ScopeGuard`] pops on drop, which covers early returns,
//! `?` propagation, and panics; the guard is `!Send`, so it cannot carry a
//! scope onto another thread's stack. On cooperative schedulers, run the
//! scoped work synchronously inside [`ContextHandle::with_scope`] — a scope
//! must not be held across a suspension point.
//!
//! [`ContextHandle::with_scope`]: crate::registry::ContextHandle::with_scope

use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use purview_core::{ConfigLayer, ContextId, ContextStack, OverrideMap, ScopeToken};

use crate::errors::{ContextError, Result};
use crate::registry::ContextShared;

thread_local! {
    static SCOPES: RefCell<HashMap<ContextId, ThreadScopes>> = RefCell::new(HashMap::new());
}

/// Scope state for one context on the current thread.
struct ThreadScopes {
    /// This thread's view of the context stack: shared base plus the
    /// thread's scoped layers. `None` while no scope is active, so an idle
    /// thread does not pin the base layers.
    stack: Option<ContextStack>,
    /// Tokens for the scoped layers, innermost last.
    tokens: Vec<ScopeToken>,
    /// Sequence for token minting; monotonic per thread and context, never
    /// reset, so a stale token can never match a later push.
    next_seq: u64,
}

impl ThreadScopes {
    fn new() -> Self {
        Self {
            stack: None,
            tokens: Vec::new(),
            next_seq: 0,
        }
    }
}

/// Freeze a new layer from `overrides` and push it on the calling thread's
/// stack for this context.
pub(crate) fn push(shared: &Arc<ContextShared>, overrides: OverrideMap) -> Result<ScopeToken> {
    // Reserve the sequence up front and freeze with no thread-local borrow
    // held: freeze rules may read back through handles, which borrows the
    // same map. A vetoed freeze burns the sequence, which keeps tokens
    // monotonic even when a rule pushes scopes of its own.
    let sequence = SCOPES.with(|cell| {
        let mut map = cell.borrow_mut();
        let entry = map.entry(shared.id()).or_insert_with(ThreadScopes::new);
        let sequence = entry.next_seq;
        entry.next_seq += 1;
        sequence
    });

    let layer = ConfigLayer::from_map(format!("scope:{sequence}"), overrides);
    layer.freeze_with(shared.freezer())?;

    let token = ScopeToken::new(shared.id(), sequence);
    SCOPES.with(|cell| {
        let mut map = cell.borrow_mut();
        let entry = map.entry(shared.id()).or_insert_with(ThreadScopes::new);
        entry
            .stack
            .get_or_insert_with(|| shared.base_stack().clone())
            .push(Arc::new(layer));
        entry.tokens.push(token);
        debug!(context = %shared.name(), %token, scopes = entry.tokens.len(), "pushed scope layer");
    });
    Ok(token)
}

/// Pop the layer `token` was minted for.
///
/// Fails with [`ContextError::ScopeMismatch`] unless `token` matches the
/// innermost scope on the calling thread; the stack is left unmodified on
/// failure.
pub(crate) fn pop(shared: &Arc<ContextShared>, token: ScopeToken) -> Result<()> {
    if token.context_id() != shared.id() {
        return Err(mismatch(shared, "token was minted for a different context"));
    }
    SCOPES
        .try_with(|cell| {
            let mut map = cell.borrow_mut();
            let Some(entry) = map.get_mut(&shared.id()) else {
                return Err(mismatch(shared, "no active scope on this thread"));
            };
            let Some(top) = entry.tokens.last().copied() else {
                return Err(mismatch(shared, "no active scope on this thread"));
            };
            if top != token {
                return Err(mismatch(
                    shared,
                    &format!("token {token} does not match the innermost scope {top}"),
                ));
            }
            let _ = entry.tokens.pop();
            if let Some(stack) = entry.stack.as_mut() {
                let _ = stack.pop();
            }
            if entry.tokens.is_empty() {
                // Release the base stack clone; `next_seq` stays, so stale
                // tokens keep failing.
                entry.stack = None;
            }
            debug!(context = %shared.name(), %token, scopes = entry.tokens.len(), "popped scope layer");
            Ok(())
        })
        // Thread-local storage already torn down: the thread's scopes are
        // gone with it, so there is nothing left to pop.
        .unwrap_or(Ok(()))
}

/// Top-down lookup through the calling thread's scopes, then the shared
/// base stack.
pub(crate) fn resolve(shared: &ContextShared, key: &str) -> Option<Value> {
    SCOPES
        .try_with(|cell| {
            let map = cell.borrow();
            match map.get(&shared.id()).and_then(|entry| entry.stack.as_ref()) {
                Some(stack) => stack.get(key),
                None => shared.base_stack().get(key),
            }
        })
        .unwrap_or_else(|_| shared.base_stack().get(key))
}

/// The calling thread's view of the full stack (base plus its scopes).
pub(crate) fn view_stack(shared: &ContextShared) -> ContextStack {
    SCOPES
        .try_with(|cell| {
            let map = cell.borrow();
            map.get(&shared.id())
                .and_then(|entry| entry.stack.as_ref())
                .map_or_else(|| shared.base_stack().clone(), Clone::clone)
        })
        .unwrap_or_else(|_| shared.base_stack().clone())
}

/// Number of scopes the calling thread has active on this context.
pub(crate) fn depth(shared: &ContextShared) -> usize {
    SCOPES
        .try_with(|cell| {
            cell.borrow()
                .get(&shared.id())
                .map_or(0, |entry| entry.tokens.len())
        })
        .unwrap_or(0)
}

fn mismatch(shared: &ContextShared, reason: &str) -> ContextError {
    ContextError::ScopeMismatch {
        context: shared.name().to_string(),
        reason: reason.to_string(),
    }
}

/// Pops its scope layer when dropped.
///
/// Dropping covers every exit path: normal return, `?` propagation, and
/// panic unwind. The guard is `!Send`; it must be dropped on the thread
/// that pushed the scope.
#[must_use = "the scope ends when the guard is dropped"]
pub struct ScopeGuard {
    shared: Arc<ContextShared>,
    token: ScopeToken,
    _not_send: PhantomData<*const ()>,
}

impl ScopeGuard {
    pub(crate) fn new(shared: Arc<ContextShared>, token: ScopeToken) -> Self {
        Self {
            shared,
            token,
            _not_send: PhantomData,
        }
    }

    /// The token of the scope this guard will pop.
    #[must_use]
    pub fn token(&self) -> ScopeToken {
        self.token
    }

    /// Name of the context the scope belongs to.
    #[must_use]
    pub fn context(&self) -> &str {
        self.shared.name()
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        if let Err(err) = pop(&self.shared, self.token) {
            // Out-of-order drops leave the stack for the outer guard to
            // clean up; nothing is popped here.
            warn!(context = %self.shared.name(), token = %self.token, error = %err, "scope guard failed to pop its layer");
        }
    }
}

impl std::fmt::Debug for ScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeGuard")
            .field("context", &self.shared.name())
            .field("token", &self.token)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
