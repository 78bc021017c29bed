use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::SyncHandle;
use crate::error::AppError;

/// Shares one synchronizer per key among all its watchers.
///
/// Entries hold weak references: the synchronizer stops when its last watcher drops the
/// handle, and the next watcher starts a fresh one.
pub struct SyncRegistry<S> {
    handles: DashMap<Uuid, Weak<SyncHandle<S>>>,
}

impl<S> Default for SyncRegistry<S> {
    fn default() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }
}

impl<S: Clone> SyncRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The running synchronizer for `key`, if any.
    #[must_use]
    pub fn get(&self, key: Uuid) -> Option<Arc<SyncHandle<S>>> {
        self.handles.get(&key).and_then(|weak| weak.upgrade())
    }

    /// The running synchronizer for `key`, or a new one from `start`.
    ///
    /// # Errors
    ///
    /// Propagates the error from `start`.
    pub fn get_or_start<F>(&self, key: Uuid, start: F) -> Result<Arc<SyncHandle<S>>, AppError>
    where
        F: FnOnce() -> Result<SyncHandle<S>, AppError>,
    {
        match self.handles.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(handle) = entry.get().upgrade() {
                    return Ok(handle);
                }
                let handle = Arc::new(start()?);
                entry.insert(Arc::downgrade(&handle));
                Ok(handle)
            }
            Entry::Vacant(entry) => {
                let handle = Arc::new(start()?);
                entry.insert(Arc::downgrade(&handle));
                tracing::debug!(%key, "registered synchronizer");
                Ok(handle)
            }
        }
    }

    /// Number of synchronizers still running. Drops entries whose watchers are all gone.
    #[must_use]
    pub fn active(&self) -> usize {
        self.handles.retain(|_, weak| weak.strong_count() > 0);
        self.handles.len()
    }

    /// Forget every entry. Running synchronizers stop once their watchers drop them.
    pub fn clear(&self) {
        self.handles.clear();
    }
}
