//! Scoped references to selected media files
//!
//! A `PreviewHandle` stays registered for as long as it is alive and is
//! revoked on drop, so replacing or discarding a source always releases it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, PathBuf>>,
}

/// Registry of live preview references
#[derive(Debug, Clone, Default)]
pub struct PreviewRegistry {
    inner: Arc<RegistryInner>,
}

impl PreviewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return a handle that revokes it on drop
    pub fn register(&self, path: &Path) -> PreviewHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.live().insert(id, path.to_path_buf());
        debug!("Registered preview {} for {:?}", id, path);

        PreviewHandle {
            id,
            path: path.to_path_buf(),
            registry: self.clone(),
        }
    }

    /// Number of handles not yet released
    pub fn live_count(&self) -> usize {
        self.live().len()
    }

    fn revoke(&self, id: u64) {
        if self.live().remove(&id).is_some() {
            debug!("Revoked preview {}", id);
        }
    }

    fn live(&self) -> MutexGuard<'_, HashMap<u64, PathBuf>> {
        match self.inner.live.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Live reference to a selected media file
#[derive(Debug)]
pub struct PreviewHandle {
    id: u64,
    path: PathBuf,
    registry: PreviewRegistry,
}

impl PreviewHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        self.registry.revoke(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_released_on_drop() {
        let registry = PreviewRegistry::new();
        let handle = registry.register(Path::new("/tmp/a.jpg"));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(handle.path(), Path::new("/tmp/a.jpg"));

        drop(handle);
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_replacing_handle_releases_previous() {
        let registry = PreviewRegistry::new();
        let mut current = registry.register(Path::new("/tmp/a.jpg"));
        current = registry.register(Path::new("/tmp/b.mp4"));
        assert_eq!(registry.live_count(), 1);
        assert_eq!(current.path(), Path::new("/tmp/b.mp4"));
    }
}
