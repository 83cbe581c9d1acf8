//! # purview-core
//!
//! Foundation types for Purview's layered configuration contexts.
//!
//! The pieces, bottom-up:
//! 1. **[`ConfigLayer`]** — a labelled key/value layer, mutable while open,
//!    permanently immutable once frozen
//! 2. **[`Freezer`]** — an ordered [`FreezeRule`] chain run at freeze time
//!    (redaction, required keys, custom closures)
//! 3. **[`ContextStack`]** — ordered layers with top-down shadowing lookup,
//!    never empty after construction
//! 4. **[`ContextId`] / [`ScopeToken`]** — identifiers tying scoped layers
//!    to the context and push they belong to
//!
//! Values are [`serde_json::Value`]; override sets are [`OverrideMap`]s,
//! most conveniently built with the [`overrides!`] macro.
//!
//! # Usage
//!
//! ```no_run
//! use purview_core::{overrides, ConfigLayer};
//!
//! let layer = ConfigLayer::from_map("defaults", overrides! {
//!     "timeout" => 20,
//!     "host" => "localhost",
//! });
//! layer.freeze();
//! assert!(layer.set("timeout", 5).is_err());
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod freeze;
pub mod ids;
pub mod layer;
pub mod stack;

pub use errors::{FreezeError, LayerError, Result};
pub use freeze::{FreezeRule, Freezer, RedactSecrets, RequireKeys, REDACTED};
pub use ids::{ContextId, ScopeToken};
pub use layer::{ConfigLayer, OverrideMap};
pub use stack::ContextStack;

// Value currency of the crate, re-exported so `overrides!` works without a
// direct serde_json dependency downstream.
pub use serde_json::{json, Value};

/// Build an [`OverrideMap`] from `key => value` pairs.
///
/// Each value is an expression fed through [`json!`], so scalars and array
/// literals work directly; build object values with [`json!`] at the call
/// site:
///
/// ```no_run
/// use purview_core::{json, overrides};
///
/// let map = overrides! {
///     "timeout" => 5,
///     "labels" => ["canary", "eu-west"],
///     "cache" => json!({ "size": 10 }),
/// };
/// assert_eq!(map.len(), 3);
/// ```
#[macro_export]
macro_rules! overrides {
    () => { $crate::OverrideMap::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::OverrideMap::new();
        $(
            let _ = map.insert(($key).into(), $crate::json!($value));
        )+
        map
    }};
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
