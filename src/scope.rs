//! Sandbox scope: the key/value mapping and the mutator.
//!
//! The mapping keeps one identity for its whole life. Host updates are
//! merged into it in place (changed keys updated, new keys added, stale keys
//! deleted) so a rendered component never sees its data object swapped out
//! from under an in-flight edit.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static STORE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn generate_store_id() -> u64 {
    STORE_ID_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// What a [`ValueStore::sync_from`] call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// The editable field store (`values`).
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueStore {
    instance_id: u64,
    revision: u64,
    entries: BTreeMap<String, String>,
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueStore {
    pub fn new() -> Self {
        Self {
            instance_id: generate_store_id(),
            revision: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut store = Self::new();
        store.entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        store
    }

    /// Identity of this store; never changes across syncs.
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Bumped whenever a sync changes the contents.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|v| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge the latest external state into this store in place.
    pub fn sync_from<K, V>(&mut self, latest: impl IntoIterator<Item = (K, V)>) -> SyncReport
    where
        K: Into<String>,
        V: Into<String>,
    {
        let latest: BTreeMap<String, String> = latest
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mut report = SyncReport::default();

        let before = self.entries.len();
        self.entries.retain(|k, _| latest.contains_key(k));
        report.removed = before - self.entries.len();

        for (key, value) in latest {
            match self.entries.get_mut(&key) {
                Some(existing) if *existing == value => {}
                Some(existing) => {
                    *existing = value;
                    report.updated += 1;
                }
                None => {
                    self.entries.insert(key, value);
                    report.inserted += 1;
                }
            }
        }

        if !report.is_empty() {
            self.revision += 1;
        }
        report
    }
}

/// Host callback receiving `setValue(key, value)` edits.
pub type Mutator = Box<dyn FnMut(&str, &str)>;

/// Bindings exposed to evaluated code besides the builtin runtime.
pub struct Scope {
    values: ValueStore,
    mutator: Mutator,
}

impl Scope {
    pub fn new(values: ValueStore, mutator: Mutator) -> Self {
        Self { values, mutator }
    }

    /// A scope whose mutator only logs; useful for read-only previews.
    pub fn detached(values: ValueStore) -> Self {
        Self::new(
            values,
            Box::new(|key, _value| {
                log::debug!("[PreviewNative] Ignoring edit of `{}` on detached scope", key);
            }),
        )
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub fn sync_values<K, V>(&mut self, latest: impl IntoIterator<Item = (K, V)>) -> SyncReport
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.sync_from(latest)
    }

    /// Forward an edit to the host. The store itself is left untouched: the
    /// host owns it and syncs the result back.
    pub fn set_value(&mut self, key: &str, value: &str) {
        (self.mutator)(key, value);
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}
