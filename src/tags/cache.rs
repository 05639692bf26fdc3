//! Shared taxonomy snapshot
//!
//! The hierarchy is read on every classification and label assignment but
//! changes rarely, so readers share an `Arc<Taxonomy>` that is reloaded from
//! the store once it is older than the refresh interval.

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::database::TagDatabase;
use super::taxonomy::Taxonomy;
use crate::error::Result;
use crate::store::Store;

pub struct TaxonomyCache {
    snapshot: RwLock<Option<(Arc<Taxonomy>, Instant)>>,
    refresh: Duration,
    default_floor: f32,
}

impl TaxonomyCache {
    pub fn new(refresh: Duration, default_floor: f32) -> Self {
        Self {
            snapshot: RwLock::new(None),
            refresh,
            default_floor,
        }
    }

    /// Current snapshot, reloading from `store` when missing or stale.
    pub fn get(&self, store: &Store) -> Result<Arc<Taxonomy>> {
        if let Ok(guard) = self.snapshot.read() {
            if let Some((taxonomy, loaded)) = guard.as_ref() {
                if loaded.elapsed() < self.refresh {
                    return Ok(Arc::clone(taxonomy));
                }
            }
        }
        self.reload(store)
    }

    /// Force a reload, e.g. right after this process changed the hierarchy.
    pub fn reload(&self, store: &Store) -> Result<Arc<Taxonomy>> {
        let taxonomy = Arc::new(TagDatabase::new(store).load(self.default_floor)?);
        // A poisoned lock only means a reader panicked; the data is replaced wholesale
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some((Arc::clone(&taxonomy), Instant::now()));
        tracing::debug!(tags = taxonomy.len(), "refreshed taxonomy cache");
        Ok(taxonomy)
    }

    pub fn invalidate(&self) {
        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = None;
    }
}
