//! # purview
//!
//! Scoped, layered configuration contexts with per-thread override stacks.
//!
//! A context is a named stack of configuration layers. A lookup walks the
//! stack top-down and returns the first hit:
//!
//! 1. The calling thread's innermost scoped layer.
//! 2. Outer scoped layers, newest to oldest.
//! 3. The shared base layer, written during startup and then frozen.
//!
//! Layers shadow key by key: a scope that overrides `timeout` leaves every
//! other key visible from the layers below it. Scoped layers are
//! per-thread, so concurrent units of work can hold different overrides
//! against the same context without observing each other.
//!
//! ## Usage
//!
//! ```no_run
//! use purview::{overrides, ContextRegistry};
//!
//! # fn main() -> purview::Result<()> {
//! let registry = ContextRegistry::new();
//! let ctx = registry.create("app")?;
//! ctx.set("timeout", 20)?;
//! ctx.freeze()?;
//!
//! ctx.with_scope(overrides! { "timeout" => 5 }, || {
//!     assert_eq!(ctx.get_or("timeout", 0), 5);
//! })?;
//! assert_eq!(ctx.get_or("timeout", 0), 20);
//! # Ok(())
//! # }
//! ```
//!
//! Most applications share one [`ContextRegistry`]; the [`global`] registry
//! and the [`create_context`] / [`get_context`] free functions cover that
//! arrangement. Tests and libraries that want isolation build their own.

#![deny(unsafe_code)]

use std::sync::OnceLock;

pub mod errors;
pub mod registry;
pub mod scope;
pub mod snapshot;

pub use errors::{ContextError, Result};
pub use registry::{ContextHandle, ContextRegistry};
pub use scope::ScopeGuard;
pub use snapshot::{ContextSnapshot, LayerInfo};

// The layer and freeze vocabulary, so downstream crates need only one
// dependency.
pub use purview_core::{
    json, overrides, ConfigLayer, ContextId, ContextStack, FreezeError, FreezeRule, Freezer,
    LayerError, OverrideMap, RedactSecrets, RequireKeys, ScopeToken, Value, REDACTED,
};

// ── global registry ──────────────────────────────────────────────────────────

static GLOBAL: OnceLock<ContextRegistry> = OnceLock::new();

/// The process-wide registry.
///
/// Initialized on first access with [`ContextRegistry::new`] unless
/// [`init_global`] installed a configured one earlier.
pub fn global() -> &'static ContextRegistry {
    GLOBAL.get_or_init(ContextRegistry::new)
}

/// Install `registry` as the process-wide registry.
///
/// Must run before the first [`global`] access. Once the global registry
/// exists, the rejected `registry` is handed back as the error.
pub fn init_global(registry: ContextRegistry) -> std::result::Result<(), ContextRegistry> {
    GLOBAL.set(registry)
}

/// Register a new named context in the process-wide registry.
///
/// Fails with [`ContextError::Duplicate`] if the name is taken.
pub fn create_context(name: impl Into<String>) -> Result<ContextHandle> {
    global().create(name)
}

/// Look up a context in the process-wide registry.
///
/// Fails with [`ContextError::Unknown`] if nothing is registered under
/// `name`.
pub fn get_context(name: &str) -> Result<ContextHandle> {
    global().get(name)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Unit tests share one process, so every context registered against the
    // global registry here gets a name unique to its test.

    #[test]
    fn re_exported_vocabulary_composes() {
        let layer = ConfigLayer::from_map("smoke", overrides! { "limit" => 3 });
        layer.freeze();
        assert_eq!(layer.get("limit"), Some(json!(3)));

        let stack = ContextStack::new(std::sync::Arc::new(layer));
        assert_eq!(stack.get("limit"), Some(json!(3)));
    }

    #[test]
    fn global_registry_is_one_instance() {
        let first = global();
        let second = global();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn global_free_functions_roundtrip() {
        let ctx = create_context("lib-global-roundtrip").unwrap();
        ctx.set("mode", "global").unwrap();

        let again = get_context("lib-global-roundtrip").unwrap();
        assert_eq!(again.id(), ctx.id());
        assert_eq!(again.get("mode"), Some(json!("global")));
    }

    #[test]
    fn init_global_after_access_hands_the_registry_back() {
        let _ = global();
        let rejected = init_global(ContextRegistry::new());
        assert!(rejected.is_err());
    }
}
