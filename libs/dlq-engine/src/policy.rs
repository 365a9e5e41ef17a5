//! Redaction policy store.
//!
//! Rules are kept per slot. A slot is `(scope, key)`: scope is
//! case-insensitive and defaults to `global`, a missing key is `_`.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedactionAction {
    Mask,
    Remove,
    Hash,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaskOptions {
    #[serde(default)]
    pub keep_first: Option<u32>,
    #[serde(default)]
    pub keep_last: Option<u32>,
    /// Mask character(s).
    #[serde(default)]
    pub pad: Option<String>,
    /// Emit a fixed-width mask instead of preserving the value length.
    #[serde(default)]
    pub fixed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HashOptions {
    /// Name of the secret used as the hash key.
    #[serde(default)]
    pub secret_ref: Option<String>,
    /// Truncate the digest.
    #[serde(default)]
    pub short: Option<bool>,
}

/// One redaction rule. Stored and returned verbatim; never applied here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub id: Option<String>,
    /// Field path the rule targets, e.g. `$.customer.email`.
    pub path: String,
    pub action: RedactionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<MaskOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<HashOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Scoped rule storage.
pub trait PolicyStore: Send + Sync {
    /// Rules of a slot; an unknown slot yields an empty list.
    fn load(&self, scope: Option<&str>, key: Option<&str>) -> Vec<Rule>;

    /// Replace the rules of a slot.
    fn save(&self, scope: Option<&str>, key: Option<&str>, rules: Vec<Rule>);
}

/// Slot index: `"<lowercased scope>:<key>"`.
pub fn slot(scope: Option<&str>, key: Option<&str>) -> String {
    let scope = scope.map_or_else(|| "global".to_string(), str::to_lowercase);
    format!("{scope}:{}", key.unwrap_or("_"))
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryPolicyStore {
    slots: RwLock<HashMap<String, Vec<Rule>>>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load(&self, scope: Option<&str>, key: Option<&str>) -> Vec<Rule> {
        let slots = match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("policy store read lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        slots.get(&slot(scope, key)).cloned().unwrap_or_default()
    }

    fn save(&self, scope: Option<&str>, key: Option<&str>, rules: Vec<Rule>) {
        let idx = slot(scope, key);
        tracing::info!(slot = %idx, rules = rules.len(), "saving redaction rules");
        let mut slots = match self.slots.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("policy store write lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        slots.insert(idx, rules);
    }
}
