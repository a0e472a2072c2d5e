//! Config Store - ownership tracking for translated data-plane configuration
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ConfigStore<K, T>                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  parent_refs: owner → [artifact, ...]   (ordered, replaced whole)│
//! │  configs:     artifact → value          (flat, shared by owners) │
//! │                                                                  │
//! │  Both maps live behind ONE Arc<RwLock<..>>                       │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A reconciler hands the store the full artifact set its source object now
//! produces and gets back the artifacts the object stopped producing. The
//! store never deletes a config entry on its own: the discard set is only a
//! candidate list, and the caller removes entries with
//! [`ConfigStore::delete_config`] once the data plane confirms the removal.
//!
//! Ownership is not exclusive. The config table is keyed by artifact alone, so
//! two owners claiming the same artifact share one entry (last write wins) and
//! either one dropping it reports it as discarded. Use
//! [`ConfigStore::claimants`] before garbage-collecting a discarded key.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, warn};

/// Safe RwLock read helper that recovers from poisoning
#[inline]
fn safe_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during read, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

/// Safe RwLock write helper that recovers from poisoning
#[inline]
fn safe_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("RwLock poisoned during write, recovering (data is still valid)");
        poisoned.into_inner()
    })
}

struct StoreInner<K, T> {
    parent_refs: HashMap<K, Vec<K>>,
    configs: HashMap<K, T>,
}

/// Thread-safe ownership store, generic over key and payload types
///
/// Cloning yields a handle onto the same state. Construct it once and pass it
/// to every reconciler that needs a consistent view.
pub struct ConfigStore<K, T> {
    inner: Arc<RwLock<StoreInner<K, T>>>,
}

impl<K, T> ConfigStore<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                parent_refs: HashMap::new(),
                configs: HashMap::new(),
            })),
        }
    }

    /// Artifacts currently attributed to `owner` (empty if unknown)
    pub fn parent_refs(&self, owner: &K) -> Vec<K> {
        let inner = safe_read(&self.inner);
        inner.parent_refs.get(owner).cloned().unwrap_or_default()
    }

    /// Replace the ownership set of `owner` without touching any config entry
    pub fn set_parent_refs(&self, owner: K, refs: Vec<K>) {
        let mut inner = safe_write(&self.inner);
        debug!(owner = ?owner, refs = refs.len(), "ConfigStore: set parent refs");
        inner.parent_refs.insert(owner, refs);
    }

    /// Materialized artifacts of `owner`
    ///
    /// Keys in the ownership set without a config entry are skipped.
    pub fn get(&self, owner: &K) -> HashMap<K, T> {
        let inner = safe_read(&self.inner);
        let Some(refs) = inner.parent_refs.get(owner) else {
            return HashMap::new();
        };
        refs.iter()
            .filter_map(|key| {
                inner
                    .configs
                    .get(key)
                    .map(|value| (key.clone(), value.clone()))
            })
            .collect()
    }

    /// Snapshot of the whole config table
    pub fn list(&self) -> HashMap<K, T> {
        let inner = safe_read(&self.inner);
        inner.configs.clone()
    }

    /// Write `value` under each key, bypassing ownership bookkeeping
    pub fn update_config(&self, value: T, keys: &[K]) {
        let mut inner = safe_write(&self.inner);
        for key in keys {
            inner.configs.insert(key.clone(), value.clone());
        }
    }

    /// Replace the artifact set of `owner` and return what it no longer produces
    ///
    /// Every new artifact is written to the config table and the ownership set
    /// becomes exactly the new keys (in input order, duplicates collapsed).
    /// Previously owned keys that are not in the new set and still have a
    /// config entry are returned with their current value. Those entries stay
    /// in the table until [`ConfigStore::delete_config`] is called.
    pub fn update(&self, owner: K, artifacts: impl IntoIterator<Item = (K, T)>) -> HashMap<K, T> {
        let mut inner = safe_write(&self.inner);
        let previous = inner.parent_refs.remove(&owner).unwrap_or_default();

        let mut still_used = HashSet::new();
        let mut current = Vec::new();
        for (key, value) in artifacts {
            inner.configs.insert(key.clone(), value);
            if still_used.insert(key.clone()) {
                current.push(key);
            }
        }

        let mut discard = HashMap::new();
        for key in previous {
            if still_used.contains(&key) {
                continue;
            }
            if let Some(value) = inner.configs.get(&key) {
                discard.insert(key, value.clone());
            }
        }

        debug!(
            owner = ?owner,
            artifacts = current.len(),
            discarded = discard.len(),
            "ConfigStore: updated owner"
        );
        inner.parent_refs.insert(owner, current);
        discard
    }

    /// Write one config entry with no ownership interaction
    pub fn set(&self, key: K, value: T) {
        let mut inner = safe_write(&self.inner);
        inner.configs.insert(key, value);
    }

    /// Forget `owner`: drops its ownership set and any config entry under its own key
    pub fn delete(&self, owner: &K) {
        let mut inner = safe_write(&self.inner);
        inner.parent_refs.remove(owner);
        inner.configs.remove(owner);
        debug!(owner = ?owner, "ConfigStore: deleted owner");
    }

    /// Remove config entries only; ownership sets referencing them are left as-is
    pub fn delete_config(&self, keys: &[K]) {
        let mut inner = safe_write(&self.inner);
        for key in keys {
            inner.configs.remove(key);
        }
    }

    /// Owners whose ownership set currently contains `key`
    pub fn claimants(&self, key: &K) -> Vec<K> {
        let inner = safe_read(&self.inner);
        inner
            .parent_refs
            .iter()
            .filter(|(_, refs)| refs.contains(key))
            .map(|(owner, _)| owner.clone())
            .collect()
    }

    /// Number of tracked owners
    pub fn owner_count(&self) -> usize {
        safe_read(&self.inner).parent_refs.len()
    }

    /// Number of config entries
    pub fn len(&self) -> usize {
        safe_read(&self.inner).configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, T> Default for ConfigStore<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

// Implement Clone to share the same underlying data
impl<K, T> Clone for ConfigStore<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> fmt::Debug for ConfigStore<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = safe_read(&self.inner);
        f.debug_struct("ConfigStore")
            .field("owners", &inner.parent_refs.len())
            .field("configs", &inner.configs.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
