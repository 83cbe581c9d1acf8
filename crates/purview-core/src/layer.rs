//! Freezable configuration layers.
//!
//! A [`ConfigLayer`] starts *open*: writes land in its entry map. Freezing
//! makes it permanently immutable; every later write fails with
//! [`LayerError::Frozen`] instead of silently mutating shared state.
//!
//! Write contract: writes are expected to happen during single-threaded
//! startup, before the layer is shared or frozen. Concurrent writes to an
//! open layer are a programmer error — the lock keeps them memory-safe, but
//! the resulting entry order is unspecified. Once frozen, a layer never
//! changes again, so reads are uncontended and safe from any thread.

use parking_lot::RwLock;
use serde::{Serialize, Serializer};
use serde_json::Value;
use tracing::debug;

use crate::errors::{FreezeError, LayerError, Result};
use crate::freeze::Freezer;

/// The shape of override sets supplied by callers.
pub type OverrideMap = serde_json::Map<String, Value>;

/// A labelled key/value layer with an open → frozen lifecycle.
pub struct ConfigLayer {
    label: String,
    state: RwLock<LayerState>,
}

struct LayerState {
    entries: OverrideMap,
    frozen: bool,
}

impl ConfigLayer {
    /// Create an open, empty layer.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            state: RwLock::new(LayerState {
                entries: OverrideMap::new(),
                frozen: false,
            }),
        }
    }

    /// Create an open layer pre-populated with `entries`.
    #[must_use]
    pub fn from_map(label: impl Into<String>, entries: OverrideMap) -> Self {
        Self {
            label: label.into(),
            state: RwLock::new(LayerState {
                entries,
                frozen: false,
            }),
        }
    }

    /// The label this layer was created with.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write a value, replacing any existing entry for `key`.
    ///
    /// Fails with [`LayerError::Frozen`] once the layer has been frozen;
    /// the entries are left unchanged in that case. Rejected writes take
    /// only the read lock, so they never stall readers of a frozen layer.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
        if self.state.read().frozen {
            return Err(self.frozen_error());
        }
        let mut state = self.state.write();
        // Frozen may have flipped between the two locks.
        if state.frozen {
            return Err(self.frozen_error());
        }
        let _ = state.entries.insert(key.into(), value.into());
        Ok(())
    }

    fn frozen_error(&self) -> LayerError {
        LayerError::Frozen {
            label: self.label.clone(),
        }
    }

    /// Read the value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.state.read().entries.get(key).cloned()
    }

    /// Whether an entry for `key` exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.state.read().entries.contains_key(key)
    }

    /// Mark the layer immutable. Idempotent.
    pub fn freeze(&self) {
        let mut state = self.state.write();
        if !state.frozen {
            state.frozen = true;
            debug!(layer = %self.label, entries = state.entries.len(), "layer frozen");
        }
    }

    /// Run `freezer`'s rules over the entries, then mark the layer immutable.
    ///
    /// Freezing an already-frozen layer is a no-op and runs no rules. If a
    /// rule fails, the layer stays open and its entries are unchanged.
    ///
    /// Rules run on a copy of the entries with no lock held, so a rule may
    /// read this layer (or any context) while the freeze is in progress.
    /// A write racing the freeze violates the single-threaded startup
    /// contract and may be lost.
    pub fn freeze_with(&self, freezer: &Freezer) -> Result<(), FreezeError> {
        let mut entries = {
            let state = self.state.read();
            if state.frozen {
                return Ok(());
            }
            state.entries.clone()
        };
        freezer.apply(&mut entries)?;

        let mut state = self.state.write();
        if state.frozen {
            // Lost the race to another freeze; keep its result.
            return Ok(());
        }
        state.entries = entries;
        state.frozen = true;
        debug!(layer = %self.label, entries = state.entries.len(), "layer frozen");
        Ok(())
    }

    /// Whether the layer has been frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.state.read().frozen
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether the layer holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// The entry keys, in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.state.read().entries.keys().cloned().collect()
    }

    /// An owned copy of the entries.
    #[must_use]
    pub fn to_map(&self) -> OverrideMap {
        self.state.read().entries.clone()
    }

    /// A new **open** layer holding this layer's entries with `overrides`
    /// applied on top, key by key. The receiver is unchanged and the result
    /// carries the receiver's label.
    #[must_use]
    pub fn union(&self, overrides: OverrideMap) -> ConfigLayer {
        let mut entries = self.to_map();
        entries.extend(overrides);
        ConfigLayer::from_map(self.label.clone(), entries)
    }
}

/// Two layers are equal iff **both are frozen** and hold equal entries;
/// labels are not compared. An open layer does not equal anything, itself
/// included (NaN-style partial equality).
impl PartialEq for ConfigLayer {
    fn eq(&self, other: &Self) -> bool {
        // Never hold both locks at once; `self` and `other` may be the
        // same layer, and two threads may compare in opposite order.
        let a_entries = {
            let a = self.state.read();
            if !a.frozen {
                return false;
            }
            a.entries.clone()
        };
        let b = other.state.read();
        b.frozen && a_entries == b.entries
    }
}

/// Serializes as the entry map.
impl Serialize for ConfigLayer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.state.read().entries.serialize(serializer)
    }
}

impl std::fmt::Debug for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("ConfigLayer")
            .field("label", &self.label)
            .field("frozen", &state.frozen)
            .field("entries", &state.entries.len())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
