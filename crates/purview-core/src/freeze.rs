//! Freeze-time rule chain.
//!
//! A [`Freezer`] holds an ordered list of [`FreezeRule`]s. When a layer is
//! frozen through it, every rule sees the full entry map in registration
//! order and may rewrite values or veto the freeze. A vetoed freeze leaves
//! the layer open and unchanged.
//!
//! Built-in rules:
//! - [`RedactSecrets`] — replaces values under secret-looking keys with
//!   [`REDACTED`], recursing into nested objects.
//! - [`RequireKeys`] — vetoes the freeze unless every named key is present.

use serde_json::Value;
use tracing::debug;

use crate::errors::{FreezeError, Result};
use crate::layer::OverrideMap;

/// Replacement value written by [`RedactSecrets`].
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments treated as secret-bearing by default.
const DEFAULT_SECRET_FRAGMENTS: &[&str] = &[
    "password",
    "token",
    "secret",
    "private_key",
    "api_key",
    "credential",
];

/// A rule applied to a layer's entries at freeze time.
///
/// Rules may rewrite values in place or fail the freeze by returning an
/// error. Every rule sees the entire entry map.
pub trait FreezeRule: Send + Sync {
    /// Short identifier used in diagnostics and error messages.
    fn name(&self) -> &str;

    /// Inspect or rewrite the entries before they become immutable.
    fn apply(&self, entries: &mut OverrideMap) -> Result<(), FreezeError>;
}

/// An ordered chain of freeze rules.
#[derive(Default)]
pub struct Freezer {
    rules: Vec<Box<dyn FreezeRule>>,
}

impl Freezer {
    /// Create a freezer with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, returning the freezer for chaining.
    #[must_use]
    pub fn with(mut self, rule: impl FreezeRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    /// Append a closure rule under the given name, returning the freezer
    /// for chaining.
    #[must_use]
    pub fn with_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut OverrideMap) -> Result<(), FreezeError> + Send + Sync + 'static,
    {
        self.with(FnRule {
            name: name.into(),
            f,
        })
    }

    /// Append a rule in place.
    pub fn push(&mut self, rule: impl FreezeRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the freezer has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Names of the registered rules, in application order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every rule over `entries` in registration order.
    ///
    /// Stops at the first failing rule; `entries` may have been rewritten
    /// by earlier rules at that point, so callers that need
    /// unchanged-on-error semantics should apply the freezer to a copy.
    pub fn apply(&self, entries: &mut OverrideMap) -> Result<(), FreezeError> {
        for rule in &self.rules {
            rule.apply(entries)?;
            debug!(rule = rule.name(), "freeze rule applied");
        }
        Ok(())
    }
}

impl std::fmt::Debug for Freezer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Freezer")
            .field("rules", &self.rule_names())
            .finish()
    }
}

struct FnRule<F> {
    name: String,
    f: F,
}

impl<F> FreezeRule for FnRule<F>
where
    F: Fn(&mut OverrideMap) -> Result<(), FreezeError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, entries: &mut OverrideMap) -> Result<(), FreezeError> {
        (self.f)(entries)
    }
}

/// Replaces values under secret-looking keys with [`REDACTED`].
///
/// A key matches when its lowercased form contains any configured fragment.
/// Nested objects are walked recursively; arrays and scalars under
/// non-matching keys are left alone.
pub struct RedactSecrets {
    fragments: Vec<String>,
}

impl Default for RedactSecrets {
    fn default() -> Self {
        Self {
            fragments: DEFAULT_SECRET_FRAGMENTS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl RedactSecrets {
    /// A redactor using the given key fragments instead of the defaults.
    #[must_use]
    pub fn with_fragments(fragments: Vec<String>) -> Self {
        Self { fragments }
    }

    fn matches(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.fragments.iter().any(|f| key.contains(f.as_str()))
    }

    fn redact(&self, key: &str, value: &mut Value) {
        if self.matches(key) {
            *value = Value::String(REDACTED.to_string());
            return;
        }
        if let Value::Object(map) = value {
            for (child_key, child) in map.iter_mut() {
                self.redact(child_key, child);
            }
        }
    }
}

impl FreezeRule for RedactSecrets {
    fn name(&self) -> &str {
        "redact-secrets"
    }

    fn apply(&self, entries: &mut OverrideMap) -> Result<(), FreezeError> {
        for (key, value) in entries.iter_mut() {
            self.redact(key, value);
        }
        Ok(())
    }
}

/// Vetoes the freeze unless every named key is present in the layer.
pub struct RequireKeys {
    keys: Vec<String>,
}

impl RequireKeys {
    /// Require the given keys to be present at freeze time.
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl FreezeRule for RequireKeys {
    fn name(&self) -> &str {
        "require-keys"
    }

    fn apply(&self, entries: &mut OverrideMap) -> Result<(), FreezeError> {
        for key in &self.keys {
            if !entries.contains_key(key) {
                return Err(FreezeError::MissingKey {
                    rule: self.name().to_string(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn map_of(pairs: &[(&str, Value)]) -> OverrideMap {
        let mut map = OverrideMap::new();
        for (key, value) in pairs {
            let _ = map.insert((*key).to_string(), value.clone());
        }
        map
    }

    #[test]
    fn default_freezer_passes_everything_through() {
        let freezer = Freezer::new();
        assert!(freezer.is_empty());

        let mut entries = map_of(&[("timeout", json!(20))]);
        freezer.apply(&mut entries).unwrap();
        assert_eq!(entries, map_of(&[("timeout", json!(20))]));
    }

    #[test]
    fn rules_run_in_registration_order() {
        let freezer = Freezer::new()
            .with_fn("double", |entries| {
                let n = entries["n"].as_i64().unwrap();
                let _ = entries.insert("n".to_string(), json!(n * 2));
                Ok(())
            })
            .with_fn("add-one", |entries| {
                let n = entries["n"].as_i64().unwrap();
                let _ = entries.insert("n".to_string(), json!(n + 1));
                Ok(())
            });

        let mut entries = map_of(&[("n", json!(10))]);
        freezer.apply(&mut entries).unwrap();
        // (10 * 2) + 1, not (10 + 1) * 2
        assert_eq!(entries["n"], json!(21));
    }

    #[test]
    fn closure_rule_can_veto() {
        let freezer = Freezer::new().with_fn("no-nulls", |entries| {
            for (key, value) in entries.iter() {
                if value.is_null() {
                    return Err(FreezeError::Rejected {
                        rule: "no-nulls".to_string(),
                        key: key.clone(),
                        reason: "null values are not allowed".to_string(),
                    });
                }
            }
            Ok(())
        });

        let mut entries = map_of(&[("retries", Value::Null)]);
        let err = freezer.apply(&mut entries).unwrap_err();
        assert_matches!(err, FreezeError::Rejected { ref key, .. } if key == "retries");
    }

    #[test]
    fn rule_names_in_order() {
        let freezer = Freezer::new()
            .with(RedactSecrets::default())
            .with(RequireKeys::new(["timeout"]));
        assert_eq!(freezer.rule_names(), vec!["redact-secrets", "require-keys"]);
        assert_eq!(freezer.len(), 2);
    }

    // ── RedactSecrets ───────────────────────────────────────────────

    #[test]
    fn redact_replaces_matching_keys() {
        let rule = RedactSecrets::default();
        let mut entries = map_of(&[
            ("api_key", json!("sk-12345")),
            ("timeout", json!(20)),
        ]);
        rule.apply(&mut entries).unwrap();
        assert_eq!(entries["api_key"], json!(REDACTED));
        assert_eq!(entries["timeout"], json!(20));
    }

    #[test]
    fn redact_is_case_insensitive() {
        let rule = RedactSecrets::default();
        let mut entries = map_of(&[("DB_PASSWORD", json!("hunter2"))]);
        rule.apply(&mut entries).unwrap();
        assert_eq!(entries["DB_PASSWORD"], json!(REDACTED));
    }

    #[test]
    fn redact_recurses_into_nested_objects() {
        let rule = RedactSecrets::default();
        let mut entries = map_of(&[(
            "database",
            json!({"host": "localhost", "credentials": {"user": "app"}}),
        )]);
        rule.apply(&mut entries).unwrap();
        assert_eq!(
            entries["database"],
            json!({"host": "localhost", "credentials": REDACTED})
        );
    }

    #[test]
    fn redact_custom_fragments() {
        let rule = RedactSecrets::with_fragments(vec!["pin".to_string()]);
        let mut entries = map_of(&[
            ("card_pin", json!("0000")),
            ("api_key", json!("sk-12345")),
        ]);
        rule.apply(&mut entries).unwrap();
        assert_eq!(entries["card_pin"], json!(REDACTED));
        // Default fragments no longer apply.
        assert_eq!(entries["api_key"], json!("sk-12345"));
    }

    // ── RequireKeys ─────────────────────────────────────────────────

    #[test]
    fn require_keys_passes_when_present() {
        let rule = RequireKeys::new(["timeout", "host"]);
        let mut entries = map_of(&[("timeout", json!(20)), ("host", json!("localhost"))]);
        rule.apply(&mut entries).unwrap();
    }

    #[test]
    fn require_keys_fails_naming_the_missing_key() {
        let rule = RequireKeys::new(["timeout", "host"]);
        let mut entries = map_of(&[("timeout", json!(20))]);
        let err = rule.apply(&mut entries).unwrap_err();
        assert_matches!(err, FreezeError::MissingKey { ref key, .. } if key == "host");
    }
}
