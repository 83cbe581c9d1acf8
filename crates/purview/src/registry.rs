//! Named context registry and handles.
//!
//! [`ContextRegistry`] is an explicit, passed-around object: tests build
//! isolated instances, applications usually share one (see [`crate::global`]).
//! Registering a name yields a [`ContextHandle`], the working surface for
//! everything else — writes, freezing, lookup, and scoped overrides.
//!
//! Writes go to the context's base layer, which every thread shares
//! read-only once frozen. Scoped override layers never live here; they are
//! per-thread, managed by the scope module.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use purview_core::{ConfigLayer, ContextId, ContextStack, Freezer, OverrideMap, ScopeToken};

use crate::errors::{ContextError, Result};
use crate::scope::{self, ScopeGuard};
use crate::snapshot::ContextSnapshot;

/// Label given to every context's base layer.
const BASE_LABEL: &str = "defaults";

/// Registry of named contexts.
///
/// Context names are unique within one registry. Distinct registries are
/// fully isolated, even for contexts sharing a name.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: RwLock<HashMap<String, Arc<ContextShared>>>,
    freezer: Arc<Freezer>,
}

/// State shared by every handle to one named context.
pub(crate) struct ContextShared {
    id: ContextId,
    name: String,
    base: ContextStack,
    freezer: Arc<Freezer>,
}

impl ContextShared {
    pub(crate) fn id(&self) -> ContextId {
        self.id
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn base_stack(&self) -> &ContextStack {
        &self.base
    }

    pub(crate) fn freezer(&self) -> &Freezer {
        &self.freezer
    }
}

impl ContextRegistry {
    /// Create a registry whose contexts freeze layers without any rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry whose contexts freeze layers through `freezer`.
    ///
    /// The rules apply to base layers at [`ContextHandle::freeze`] and to
    /// every scoped layer at push time.
    #[must_use]
    pub fn with_freezer(freezer: Freezer) -> Self {
        Self {
            contexts: RwLock::new(HashMap::new()),
            freezer: Arc::new(freezer),
        }
    }

    /// Register a new named context with an empty, open base layer.
    ///
    /// Fails with [`ContextError::Duplicate`] if the name is taken.
    pub fn create(&self, name: impl Into<String>) -> Result<ContextHandle> {
        let name = name.into();
        let mut contexts = self.contexts.write();
        if contexts.contains_key(&name) {
            return Err(ContextError::Duplicate { name });
        }
        Ok(self.register_locked(&mut contexts, name))
    }

    /// Look up an existing context by name.
    ///
    /// Fails with [`ContextError::Unknown`] if nothing is registered under
    /// `name`.
    pub fn get(&self, name: &str) -> Result<ContextHandle> {
        self.contexts
            .read()
            .get(name)
            .map(|shared| ContextHandle {
                shared: Arc::clone(shared),
            })
            .ok_or_else(|| ContextError::Unknown {
                name: name.to_string(),
            })
    }

    /// Fetch the context registered under `name`, registering it first if
    /// needed.
    pub fn get_or_create(&self, name: impl Into<String>) -> ContextHandle {
        let name = name.into();
        let mut contexts = self.contexts.write();
        if let Some(shared) = contexts.get(&name) {
            return ContextHandle {
                shared: Arc::clone(shared),
            };
        }
        self.register_locked(&mut contexts, name)
    }

    /// Register `name` in an already write-locked context map.
    fn register_locked(
        &self,
        contexts: &mut HashMap<String, Arc<ContextShared>>,
        name: String,
    ) -> ContextHandle {
        let base = Arc::new(ConfigLayer::new(BASE_LABEL));
        let shared = Arc::new(ContextShared {
            id: ContextId::next(),
            name: name.clone(),
            base: ContextStack::new(base),
            freezer: Arc::clone(&self.freezer),
        });
        debug!(context = %name, id = %shared.id, "context registered");
        let _ = contexts.insert(name, Arc::clone(&shared));
        ContextHandle { shared }
    }

    /// Whether a context is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.contexts.read().contains_key(name)
    }

    /// The registered context names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.contexts.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    /// Whether no contexts are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }

    /// Unregister the context under `name`, freeing the name.
    ///
    /// Outstanding handles keep working against the removed context; only
    /// the name-based lookup is affected. Fails with
    /// [`ContextError::Unknown`] if nothing is registered under `name`.
    pub fn remove(&self, name: &str) -> Result<()> {
        match self.contexts.write().remove(name) {
            Some(shared) => {
                debug!(context = %name, id = %shared.id, "context removed");
                Ok(())
            }
            None => Err(ContextError::Unknown {
                name: name.to_string(),
            }),
        }
    }

    /// Unregister every context.
    pub fn clear(&self) {
        self.contexts.write().clear();
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("context_count", &self.len())
            .field("freezer", &self.freezer)
            .finish()
    }
}

/// Cheap-to-clone handle to one named context.
///
/// Handles are `Send + Sync`; clones all address the same context. Reads
/// ([`get`](Self::get)) see the calling thread's scoped layers first, then
/// the shared base. Writes ([`set`](Self::set)) always target the base
/// layer and fail once it is frozen.
#[derive(Clone)]
pub struct ContextHandle {
    shared: Arc<ContextShared>,
}

impl ContextHandle {
    /// The context's registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.shared.name()
    }

    /// The context's process-unique id.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.shared.id()
    }

    /// Write a value into the base layer.
    ///
    /// Expected to run during single-threaded startup, before
    /// [`freeze`](Self::freeze). Fails with a frozen-layer error afterward,
    /// leaving the layer unchanged. Scoped layers are frozen at push time
    /// and are never write targets.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        self.shared.base_stack().top().set(key, value)?;
        Ok(())
    }

    /// Read the effective value for `key` as seen by the calling thread:
    /// innermost scope first, then outer scopes, then the base layer.
    ///
    /// Never fails and never blocks on another thread's writes.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        scope::resolve(&self.shared, key)
    }

    /// Like [`get`](Self::get), but returns `default` when the key is
    /// absent from every layer.
    #[must_use]
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Freeze the base layer, first running the registry's freeze rules
    /// over it. Idempotent: freezing an already-frozen base is a no-op.
    ///
    /// On a rule failure the base stays open and unchanged.
    pub fn freeze(&self) -> Result<()> {
        self.shared
            .base_stack()
            .top()
            .freeze_with(self.shared.freezer())?;
        Ok(())
    }

    /// Whether the base layer has been frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.shared.base_stack().top().is_frozen()
    }

    /// Freeze a layer from `overrides` and push it on the calling thread's
    /// stack. The layer shadows everything below it for this thread only.
    ///
    /// The returned token pops exactly this layer. Prefer
    /// [`scope`](Self::scope) or [`with_scope`](Self::with_scope) unless
    /// push and pop genuinely cannot share a lexical scope.
    pub fn push_scope(&self, overrides: OverrideMap) -> Result<ScopeToken> {
        scope::push(&self.shared, overrides)
    }

    /// Pop the scope layer `token` was minted for.
    ///
    /// Scopes are strictly nested: fails with
    /// [`ContextError::ScopeMismatch`] unless `token` matches the calling
    /// thread's innermost scope, leaving the stack unmodified.
    pub fn pop_scope(&self, token: ScopeToken) -> Result<()> {
        scope::pop(&self.shared, token)
    }

    /// Push a scope layer and return a guard that pops it when dropped.
    pub fn scope(&self, overrides: OverrideMap) -> Result<ScopeGuard> {
        let token = scope::push(&self.shared, overrides)?;
        Ok(ScopeGuard::new(Arc::clone(&self.shared), token))
    }

    /// Run `f` inside a scope layer built from `overrides`.
    ///
    /// The layer is popped on every exit path, a panicking `f` included.
    pub fn with_scope<R>(&self, overrides: OverrideMap, f: impl FnOnce() -> R) -> Result<R> {
        let guard = self.scope(overrides)?;
        let result = f();
        drop(guard);
        Ok(result)
    }

    /// Number of scopes the calling thread has active on this context.
    #[must_use]
    pub fn scope_depth(&self) -> usize {
        scope::depth(&self.shared)
    }

    /// The context's base layer.
    ///
    /// Useful for layer-level operations such as
    /// [`union`](ConfigLayer::union) or key listing.
    #[must_use]
    pub fn base_layer(&self) -> Arc<ConfigLayer> {
        Arc::clone(self.shared.base_stack().top())
    }

    /// Capture the calling thread's effective view of this context.
    #[must_use]
    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot::capture(self.shared.name(), &scope::view_stack(&self.shared))
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("name", &self.shared.name())
            .field("id", &self.shared.id())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
