//! Store collaborator boundary.
//!
//! The state machine never touches a real configuration backend; it stages
//! `StoreOp` batches against the narrow `PolicyStore` trait and reads
//! snapshots back through it. One store instance covers one class scope
//! (machine or user). `MemStore` is the in-memory implementation used by
//! tests and as the backing for the CLI's file store.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed payload of one store entry. The tag set is closed; `kind()` names
/// the wire kind in diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum StoreValue {
    U32(u32),
    U64(u64),
    Text(String),
    ExpandText(String),
    MultiText(Vec<String>),
}

impl StoreValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Text(_) => "text",
            Self::ExpandText(_) => "expand_text",
            Self::MultiText(_) => "multi_text",
        }
    }

    /// Numeric view across both integer widths; `None` for textual kinds.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::U32(v) => Some(u64::from(*v)),
            Self::U64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::ExpandText(s) => Some(s),
            _ => None,
        }
    }
}

/// One named value under a store key, as returned by `PolicyStore::read`.
/// `is_default` marks the key's anonymous default entry; the core carries it
/// through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub value_name: String,
    pub value: StoreValue,
    #[serde(default)]
    pub is_default: bool,
}

/// A staged mutation. `Delete` with `value_name: None` removes every value
/// under the key; list elements purge their key this way before rewriting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Write {
        key: String,
        value_name: String,
        value: StoreValue,
    },
    Delete {
        key: String,
        value_name: Option<String>,
    },
}

impl StoreOp {
    pub fn write(
        key: impl Into<String>,
        value_name: impl Into<String>,
        value: StoreValue,
    ) -> Self {
        Self::Write {
            key: key.into(),
            value_name: value_name.into(),
            value,
        }
    }

    pub fn delete(key: impl Into<String>, value_name: impl Into<String>) -> Self {
        Self::Delete {
            key: key.into(),
            value_name: Some(value_name.into()),
        }
    }

    pub fn purge(key: impl Into<String>) -> Self {
        Self::Delete {
            key: key.into(),
            value_name: None,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Write { key, .. } | Self::Delete { key, .. } => key,
        }
    }
}

/// Injected Read/Apply interface to the underlying configuration store.
///
/// `apply` commits the whole batch atomically: on failure nothing staged may
/// become observable to a later `read`.
pub trait PolicyStore {
    fn read(&self, key: &str) -> Result<Vec<StoreEntry>, StoreError>;
    fn apply(&mut self, ops: &[StoreOp]) -> Result<(), StoreError>;
}

/// Point-in-time view of every key a policy can touch. Entry order within a
/// key follows the store's reported order, which list decoding relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySnapshot {
    entries: Vec<(String, StoreEntry)>,
}

impl PolicySnapshot {
    /// Collect `keys` from `store`. Any read failure aborts the snapshot;
    /// callers classify that as `PolicyState::Unknown`.
    pub fn collect<S: PolicyStore + ?Sized>(
        store: &S,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<Self, StoreError> {
        let mut entries = Vec::new();
        let mut seen: Vec<String> = Vec::new();
        for key in keys {
            if seen.iter().any(|k| k.eq_ignore_ascii_case(&key)) {
                continue;
            }
            for entry in store.read(&key)? {
                entries.push((key.clone(), entry));
            }
            seen.push(key);
        }
        Ok(Self { entries })
    }

    pub fn value(&self, key: &str, value_name: &str) -> Option<&StoreValue> {
        self.entries
            .iter()
            .find(|(k, e)| {
                k.eq_ignore_ascii_case(key) && e.value_name.eq_ignore_ascii_case(value_name)
            })
            .map(|(_, e)| &e.value)
    }

    pub fn contains(&self, key: &str, value_name: &str) -> bool {
        self.value(key, value_name).is_some()
    }

    /// All values under `key` in store order.
    pub fn values_under<'a>(&'a self, key: &str) -> Vec<(&'a str, &'a StoreValue)> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, e)| (e.value_name.as_str(), &e.value))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// In-memory store. Keys compare case-insensitively; value order under a key
/// is insertion order, with same-name writes replacing in place.
#[derive(Debug, Default, Clone)]
pub struct MemStore {
    keys: BTreeMap<String, Vec<StoreEntry>>,
    fail_reads: bool,
    fail_applies: bool,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `read` fail; exercises the Unknown state path.
    pub fn poison_reads(&mut self) {
        self.fail_reads = true;
    }

    /// Make every subsequent `apply` fail without partial effect.
    pub fn poison_applies(&mut self) {
        self.fail_applies = true;
    }

    pub fn key_count(&self) -> usize {
        self.keys.values().filter(|v| !v.is_empty()).count()
    }

    fn canonical(key: &str) -> String {
        key.to_ascii_lowercase()
    }

    fn apply_to(keys: &mut BTreeMap<String, Vec<StoreEntry>>, op: &StoreOp) {
        match op {
            StoreOp::Write {
                key,
                value_name,
                value,
            } => {
                let slot = keys.entry(Self::canonical(key)).or_default();
                match slot
                    .iter_mut()
                    .find(|e| e.value_name.eq_ignore_ascii_case(value_name))
                {
                    Some(existing) => existing.value = value.clone(),
                    None => slot.push(StoreEntry {
                        value_name: value_name.clone(),
                        value: value.clone(),
                        is_default: false,
                    }),
                }
            }
            StoreOp::Delete { key, value_name } => {
                let canon = Self::canonical(key);
                match value_name {
                    Some(name) => {
                        if let Some(slot) = keys.get_mut(&canon) {
                            slot.retain(|e| !e.value_name.eq_ignore_ascii_case(name));
                        }
                    }
                    None => {
                        keys.remove(&canon);
                    }
                }
            }
        }
    }

    /// Export every entry, used by the file-backed store for persistence.
    pub fn dump(&self) -> &BTreeMap<String, Vec<StoreEntry>> {
        &self.keys
    }

    pub fn load(keys: BTreeMap<String, Vec<StoreEntry>>) -> Self {
        let keys = keys
            .into_iter()
            .map(|(k, v)| (Self::canonical(&k), v))
            .collect();
        Self {
            keys,
            fail_reads: false,
            fail_applies: false,
        }
    }
}

impl PolicyStore for MemStore {
    fn read(&self, key: &str) -> Result<Vec<StoreEntry>, StoreError> {
        if self.fail_reads {
            return Err(StoreError::new(format!("read refused for key '{key}'")));
        }
        Ok(self
            .keys
            .get(&Self::canonical(key))
            .cloned()
            .unwrap_or_default())
    }

    fn apply(&mut self, ops: &[StoreOp]) -> Result<(), StoreError> {
        if self.fail_applies {
            return Err(StoreError::new("apply refused"));
        }
        // Stage against a copy so a future fallible op cannot leave the map
        // half-applied.
        let mut staged = self.keys.clone();
        for op in ops {
            Self::apply_to(&mut staged, op);
        }
        self.keys = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let mut store = MemStore::new();
        store
            .apply(&[StoreOp::write(
                "Software/Corp",
                "Level",
                StoreValue::U32(3),
            )])
            .unwrap();
        let entries = store.read("software/corp").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value_name, "Level");
        assert_eq!(entries[0].value, StoreValue::U32(3));
    }

    #[test]
    fn same_name_write_replaces_in_place() {
        let mut store = MemStore::new();
        store
            .apply(&[
                StoreOp::write("k", "a", StoreValue::U32(1)),
                StoreOp::write("k", "b", StoreValue::U32(2)),
                StoreOp::write("k", "A", StoreValue::U32(9)),
            ])
            .unwrap();
        let entries = store.read("k").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].value_name, "a");
        assert_eq!(entries[0].value, StoreValue::U32(9));
    }

    #[test]
    fn purge_removes_every_value_under_key() {
        let mut store = MemStore::new();
        store
            .apply(&[
                StoreOp::write("list", "1", StoreValue::Text("x".into())),
                StoreOp::write("list", "2", StoreValue::Text("y".into())),
            ])
            .unwrap();
        store.apply(&[StoreOp::purge("LIST")]).unwrap();
        assert!(store.read("list").unwrap().is_empty());
    }

    #[test]
    fn poisoned_apply_leaves_no_partial_effect() {
        let mut store = MemStore::new();
        store
            .apply(&[StoreOp::write("k", "v", StoreValue::U32(1))])
            .unwrap();
        store.poison_applies();
        let err = store.apply(&[StoreOp::delete("k", "v")]);
        assert!(err.is_err());
        // the earlier write must survive untouched
        assert_eq!(store.keys.len(), 1);
    }

    #[test]
    fn snapshot_lookup_is_case_insensitive_and_ordered() {
        let mut store = MemStore::new();
        store
            .apply(&[
                StoreOp::write("Software/Corp/List", "first", StoreValue::Text("1".into())),
                StoreOp::write("Software/Corp/List", "second", StoreValue::Text("2".into())),
            ])
            .unwrap();
        let snap =
            PolicySnapshot::collect(&store, vec!["software/corp/list".to_string()]).unwrap();
        assert!(snap.contains("SOFTWARE/CORP/LIST", "FIRST"));
        let under: Vec<_> = snap
            .values_under("Software/Corp/List")
            .into_iter()
            .map(|(n, _)| n.to_string())
            .collect();
        assert_eq!(under, vec!["first", "second"]);
    }

    #[test]
    fn snapshot_skips_duplicate_keys() {
        let mut store = MemStore::new();
        store
            .apply(&[StoreOp::write("k", "v", StoreValue::U32(1))])
            .unwrap();
        let snap = PolicySnapshot::collect(
            &store,
            vec!["k".to_string(), "K".to_string(), "k".to_string()],
        )
        .unwrap();
        assert_eq!(snap.values_under("k").len(), 1);
    }

    #[test]
    fn store_value_views() {
        assert_eq!(StoreValue::U32(7).as_u64(), Some(7));
        assert_eq!(StoreValue::U64(u64::MAX).as_u64(), Some(u64::MAX));
        assert_eq!(StoreValue::Text("t".into()).as_u64(), None);
        assert_eq!(StoreValue::ExpandText("e".into()).as_text(), Some("e"));
        assert_eq!(StoreValue::MultiText(vec![]).kind(), "multi_text");
    }
}
