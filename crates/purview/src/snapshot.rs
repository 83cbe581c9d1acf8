//! Serializable effective-configuration snapshots.
//!
//! A snapshot answers two debugging questions at once: *what* the effective
//! configuration was at a point in time, and *where* each value came from.
//! Captures are per-thread views — the capturing thread's scoped layers are
//! included, other threads' are not.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use purview_core::{ContextStack, OverrideMap};

/// Point-in-time view of a context as seen by the capturing thread.
#[derive(Debug, Clone, Serialize)]
pub struct ContextSnapshot {
    /// Name of the captured context.
    pub context: String,
    /// When the snapshot was taken.
    pub captured_at: DateTime<Utc>,
    /// The composed effective values, scopes shadowing base key by key.
    pub values: OverrideMap,
    /// Per-layer provenance, bottom-up (base first).
    pub layers: Vec<LayerInfo>,
}

/// Provenance line for one layer of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct LayerInfo {
    /// The layer's label.
    pub label: String,
    /// Whether the layer was frozen at capture time.
    pub frozen: bool,
    /// The layer's keys, sorted.
    pub keys: Vec<String>,
}

impl ContextSnapshot {
    pub(crate) fn capture(context: &str, stack: &ContextStack) -> Self {
        Self {
            context: context.to_string(),
            captured_at: Utc::now(),
            values: stack.effective(),
            layers: stack
                .layers()
                .map(|layer| LayerInfo {
                    label: layer.label().to_string(),
                    frozen: layer.is_frozen(),
                    keys: layer.keys(),
                })
                .collect(),
        }
    }

    /// The effective value for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Label of the layer that supplies `key`, walking top-down.
    ///
    /// Returns `None` when no layer holds the key.
    #[must_use]
    pub fn origin(&self, key: &str) -> Option<&str> {
        self.layers
            .iter()
            .rev()
            .find(|layer| layer.keys.iter().any(|k| k == key))
            .map(|layer| layer.label.as_str())
    }

    /// Number of layers the snapshot covers, the base included.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use crate::registry::ContextRegistry;
    use purview_core::overrides;
    use serde_json::json;

    #[test]
    fn snapshot_without_scopes_shows_base_only() {
        let registry = ContextRegistry::new();
        let ctx = registry.create("snap-base").unwrap();
        ctx.set("timeout", 20).unwrap();
        ctx.freeze().unwrap();

        let snapshot = ctx.snapshot();
        assert_eq!(snapshot.context, "snap-base");
        assert_eq!(snapshot.depth(), 1);
        assert_eq!(snapshot.get("timeout"), Some(&json!(20)));
        assert_eq!(snapshot.origin("timeout"), Some("defaults"));
        assert!(snapshot.layers[0].frozen);
    }

    #[test]
    fn snapshot_composes_scoped_values() {
        let registry = ContextRegistry::new();
        let ctx = registry.create("snap-scoped").unwrap();
        ctx.set("timeout", 20).unwrap();
        ctx.set("host", "localhost").unwrap();
        ctx.freeze().unwrap();

        let token = ctx.push_scope(overrides! { "timeout" => 5 }).unwrap();
        let snapshot = ctx.snapshot();
        ctx.pop_scope(token).unwrap();

        assert_eq!(snapshot.depth(), 2);
        assert_eq!(snapshot.get("timeout"), Some(&json!(5)));
        assert_eq!(snapshot.get("host"), Some(&json!("localhost")));
        assert_eq!(snapshot.origin("timeout"), Some("scope:0"));
        assert_eq!(snapshot.origin("host"), Some("defaults"));
        assert_eq!(snapshot.origin("missing"), None);
    }

    #[test]
    fn snapshot_is_detached_from_later_changes() {
        let registry = ContextRegistry::new();
        let ctx = registry.create("snap-detached").unwrap();
        ctx.set("mode", "before").unwrap();

        let snapshot = ctx.snapshot();
        ctx.set("mode", "after").unwrap();

        assert_eq!(snapshot.get("mode"), Some(&json!("before")));
        assert_eq!(ctx.get("mode"), Some(json!("after")));
    }

    #[test]
    fn snapshot_serializes_with_provenance() {
        let registry = ContextRegistry::new();
        let ctx = registry.create("snap-serde").unwrap();
        ctx.set("timeout", 20).unwrap();
        ctx.freeze().unwrap();

        let value = serde_json::to_value(ctx.snapshot()).unwrap();
        assert_eq!(value["context"], json!("snap-serde"));
        assert_eq!(value["values"]["timeout"], json!(20));
        assert_eq!(value["layers"][0]["label"], json!("defaults"));
        assert_eq!(value["layers"][0]["frozen"], json!(true));
        assert!(value["captured_at"].is_string());
    }

    #[test]
    fn snapshot_layers_are_bottom_up() {
        let registry = ContextRegistry::new();
        let ctx = registry.create("snap-order").unwrap();
        ctx.freeze().unwrap();

        let outer = ctx.push_scope(overrides! { "k" => 1 }).unwrap();
        let inner = ctx.push_scope(overrides! { "k" => 2 }).unwrap();
        let snapshot = ctx.snapshot();
        ctx.pop_scope(inner).unwrap();
        ctx.pop_scope(outer).unwrap();

        let labels: Vec<&str> = snapshot.layers.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["defaults", "scope:0", "scope:1"]);
        assert_eq!(snapshot.get("k"), Some(&json!(2)));
    }
}
