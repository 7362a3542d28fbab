//! Temporary, revocable resource handles.
//!
//! Some collaborators want a locator rather than raw bytes: the media
//! resource loads its source through one, previews are displayed through one,
//! and download sinks read artifacts through one. [`HandleRegistry`] hands
//! out those locators and tracks which are still live, so tests (and
//! long-running hosts) can check that every allocation is eventually revoked.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use endframe::{HandleRegistry, HandleTarget};
//!
//! let registry = HandleRegistry::new();
//! let handle = registry.allocate(HandleTarget::Bytes(Arc::from(&b"png"[..])));
//! assert_eq!(registry.live_count(), 1);
//!
//! assert!(registry.revoke(&handle));
//! assert!(!registry.revoke(&handle));
//! assert_eq!(registry.live_count(), 0);
//! ```

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};

/// What a handle resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleTarget {
    /// A file on disk, read lazily by whoever resolves the handle.
    File(PathBuf),
    /// An in-memory binary object.
    Bytes(Arc<[u8]>),
}

/// A locator for a registered [`HandleTarget`].
///
/// Handles are plain identifiers: dropping one does not revoke it. Call
/// [`HandleRegistry::revoke`] when the target is no longer needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceHandle {
    id: u64,
}

impl ResourceHandle {
    /// Numeric identifier, unique within its registry.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Display for ResourceHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "blob:endframe/{}", self.id)
    }
}

/// Allocates, resolves, and revokes [`ResourceHandle`]s.
#[derive(Debug, Default)]
pub struct HandleRegistry {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, HandleTarget>>,
}

impl HandleRegistry {
    /// Create an empty registry, ready to be shared behind an [`Arc`].
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `target` and return a fresh handle to it.
    pub fn allocate(&self, target: HandleTarget) -> ResourceHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.entries().insert(id, target);
        log::trace!("Allocated resource handle {id}");
        ResourceHandle { id }
    }

    /// Look up a live handle. Returns `None` once the handle is revoked.
    pub fn resolve(&self, handle: &ResourceHandle) -> Option<HandleTarget> {
        self.entries().get(&handle.id).cloned()
    }

    /// Revoke a handle. Returns `false` if it was already revoked.
    pub fn revoke(&self, handle: &ResourceHandle) -> bool {
        let removed = self.entries().remove(&handle.id).is_some();
        if removed {
            log::trace!("Revoked resource handle {}", handle.id);
        }
        removed
    }

    /// Whether `handle` still resolves.
    pub fn is_live(&self, handle: &ResourceHandle) -> bool {
        self.entries().contains_key(&handle.id)
    }

    /// Number of handles allocated and not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<u64, HandleTarget>> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
