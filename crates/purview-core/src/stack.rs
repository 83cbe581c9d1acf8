//! Ordered layer stacks with shadowing lookup.
//!
//! A [`ContextStack`] is the ordered sequence of layers for one named
//! context. Lookup walks top-down and returns the first hit; composition
//! is key-level shadowing, so a nested object in a higher layer replaces a
//! lower layer's object for the same key wholesale (no deep merge).
//!
//! The base layer is held apart from the overlays, so a stack is never
//! empty by construction and the base can never be popped.

use std::sync::Arc;

use serde_json::Value;

use crate::layer::{ConfigLayer, OverrideMap};

/// Ordered layers for one context, precedence top-to-bottom.
#[derive(Clone, Debug)]
pub struct ContextStack {
    base: Arc<ConfigLayer>,
    overlays: Vec<Arc<ConfigLayer>>,
}

impl ContextStack {
    /// Create a stack holding only `base`.
    #[must_use]
    pub fn new(base: Arc<ConfigLayer>) -> Self {
        Self {
            base,
            overlays: Vec::new(),
        }
    }

    /// Push a layer on top of the stack.
    pub fn push(&mut self, layer: Arc<ConfigLayer>) {
        self.overlays.push(layer);
    }

    /// Pop the top layer.
    ///
    /// Returns `None` when only the base remains; the base cannot be
    /// removed.
    pub fn pop(&mut self) -> Option<Arc<ConfigLayer>> {
        self.overlays.pop()
    }

    /// The top (highest precedence) layer.
    #[must_use]
    pub fn top(&self) -> &Arc<ConfigLayer> {
        self.overlays.last().unwrap_or(&self.base)
    }

    /// The base (lowest precedence) layer.
    #[must_use]
    pub fn base(&self) -> &Arc<ConfigLayer> {
        &self.base
    }

    /// Number of layers, the base included.
    #[must_use]
    pub fn depth(&self) -> usize {
        1 + self.overlays.len()
    }

    /// Iterate the layers bottom-up (base first).
    pub fn layers(&self) -> impl Iterator<Item = &Arc<ConfigLayer>> {
        std::iter::once(&self.base).chain(self.overlays.iter())
    }

    /// Walk the stack top-down and return the first value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.overlays
            .iter()
            .rev()
            .find_map(|layer| layer.get(key))
            .or_else(|| self.base.get(key))
    }

    /// The composed view of the whole stack: every layer's entries applied
    /// bottom-up, higher layers replacing lower ones key by key.
    ///
    /// Always agrees with [`ContextStack::get`] on every key.
    #[must_use]
    pub fn effective(&self) -> OverrideMap {
        let mut composed = self.base.to_map();
        for layer in &self.overlays {
            composed.extend(layer.to_map());
        }
        composed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
