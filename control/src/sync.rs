//! Owner config sync
//!
//! Drives one source object's translated artifacts through the store and the
//! data plane in the order that keeps both consistent:
//!
//! 1. `ConfigStore::update` records the new set and yields the discard set
//! 2. the new set is pushed to the data plane
//! 3. discarded artifacts no other owner claims are removed downstream
//! 4. only then are their config entries dropped locally
//!
//! Translation and the push transport live behind [`DataPlaneClient`].

use crate::apis::metrics::record_config_sync;
use crate::error::Result;
use crate::store::ConfigStore;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use tracing::{debug, info, warn};

/// Data plane operations needed to keep it in line with the store
#[async_trait]
pub trait DataPlaneClient<K, T>: Send + Sync {
    /// Create or replace the given artifacts
    async fn apply(&self, artifacts: &[(K, T)]) -> Result<()>;

    /// Remove the given artifacts
    async fn delete(&self, keys: &[K]) -> Result<()>;
}

/// Result of a successful [`ConfigSync::sync`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome<K> {
    /// Number of artifacts pushed
    pub applied: usize,
    /// Artifacts removed from the data plane and the config table
    pub removed: Vec<K>,
    /// Discarded artifacts kept because another owner still claims them
    pub retained: Vec<K>,
}

/// Applies owner artifact sets and garbage-collects what falls out
pub struct ConfigSync<K, T, C> {
    store: ConfigStore<K, T>,
    client: C,
}

impl<K, T, C> ConfigSync<K, T, C>
where
    K: Eq + Hash + Clone + fmt::Debug + Send + Sync,
    T: Clone + Send + Sync,
    C: DataPlaneClient<K, T>,
{
    pub fn new(store: ConfigStore<K, T>, client: C) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &ConfigStore<K, T> {
        &self.store
    }

    /// Make `owner` produce exactly `artifacts`
    ///
    /// If the push fails, the previous ownership edges are merged back so the
    /// artifacts that would have been discarded show up again on retry.
    pub async fn sync(&self, owner: K, artifacts: Vec<(K, T)>) -> Result<SyncOutcome<K>> {
        let previous = self.store.parent_refs(&owner);
        let discard = self.store.update(owner.clone(), artifacts.iter().cloned());

        if let Err(e) = self.client.apply(&artifacts).await {
            warn!(owner = ?owner, error = %e, "Failed to push artifacts, restoring ownership");
            let mut refs = self.store.parent_refs(&owner);
            for key in previous {
                if !refs.contains(&key) {
                    refs.push(key);
                }
            }
            self.store.set_parent_refs(owner, refs);
            record_config_sync("error", 0);
            return Err(e);
        }

        let (removed, retained): (Vec<K>, Vec<K>) = discard
            .into_keys()
            .partition(|key| self.store.claimants(key).is_empty());

        if !retained.is_empty() {
            debug!(
                owner = ?owner,
                retained = ?retained,
                "Discarded artifacts still claimed by other owners"
            );
        }

        if !removed.is_empty() {
            if let Err(e) = self.client.delete(&removed).await {
                warn!(owner = ?owner, error = %e, "Failed to remove discarded artifacts");
                // Keep them reachable for the next attempt
                let mut refs = self.store.parent_refs(&owner);
                refs.extend(removed);
                self.store.set_parent_refs(owner, refs);
                record_config_sync("error", 0);
                return Err(e);
            }
            self.store.delete_config(&removed);
        }

        info!(
            owner = ?owner,
            applied = artifacts.len(),
            removed = removed.len(),
            "Synced owner config"
        );
        record_config_sync("success", removed.len());

        Ok(SyncOutcome {
            applied: artifacts.len(),
            removed,
            retained,
        })
    }

    /// Tear down `owner` and every artifact only it claims
    ///
    /// Local bookkeeping is left untouched when the data plane refuses the
    /// removal, so the call can simply be retried.
    pub async fn remove(&self, owner: &K) -> Result<Vec<K>> {
        let mut seen = HashSet::new();
        let orphaned: Vec<K> = self
            .store
            .parent_refs(owner)
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .filter(|key| self.store.claimants(key).iter().all(|o| o == owner))
            .collect();

        if !orphaned.is_empty() {
            if let Err(e) = self.client.delete(&orphaned).await {
                warn!(owner = ?owner, error = %e, "Failed to remove owner artifacts");
                record_config_sync("error", 0);
                return Err(e);
            }
        }

        self.store.delete(owner);
        self.store.delete_config(&orphaned);

        info!(owner = ?owner, removed = orphaned.len(), "Removed owner config");
        record_config_sync("success", orphaned.len());
        Ok(orphaned)
    }
}
