//! Temp-file tracking for intermediate page images.
//!
//! PDF rasterisation writes one PNG per page; those files must outlive the
//! network calls of both extraction paths and disappear afterwards. Instead
//! of a process-wide singleton with an exit hook, the registry is an explicit
//! cloneable handle the caller owns: clones share one insert-only set, both
//! extraction paths can register concurrently, and the files are removed
//! either explicitly via [`TempRegistry::cleanup_all`] or when the last
//! handle is dropped.
//!
//! Each path only ever releases files it registered itself, so there is no
//! removal race across the two concurrent paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

struct RegistryInner {
    tracked: Mutex<HashSet<PathBuf>>,
    cleanup_on_drop: bool,
}

impl RegistryInner {
    /// Registration never panics while holding the lock, but a poisoned
    /// set is still just a set of paths; recover it rather than propagate.
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.tracked.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared handle to the set of tracked temp files.
#[derive(Clone)]
pub struct TempRegistry {
    inner: Arc<RegistryInner>,
}

impl TempRegistry {
    /// A registry that removes tracked files when the last handle drops.
    pub fn new() -> Self {
        Self::with_cleanup(true)
    }

    /// `cleanup_on_drop = false` leaves the files on disk, matching
    /// `CLEANUP_TEMP_FILES=false`.
    pub fn with_cleanup(cleanup_on_drop: bool) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tracked: Mutex::new(HashSet::new()),
                cleanup_on_drop,
            }),
        }
    }

    /// Track a file for later cleanup. Returns `false` if it was already
    /// tracked.
    pub fn register(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let inserted = self.inner.lock().insert(path.clone());
        if inserted {
            debug!("Tracking temp file: {}", path.display());
        }
        inserted
    }

    /// Stop tracking a file without deleting it. Returns whether it was
    /// tracked.
    pub fn release(&self, path: &Path) -> bool {
        self.inner.lock().remove(path)
    }

    /// Delete one tracked file now. Returns `false` when the file was not
    /// tracked or could not be removed.
    pub fn cleanup(&self, path: &Path) -> bool {
        if !self.release(path) {
            return false;
        }
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Removed temp file: {}", path.display());
                true
            }
            Err(e) => {
                warn!("Failed to remove temp file {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Delete every tracked file, best-effort. Returns the number removed.
    pub fn cleanup_all(&self) -> usize {
        let paths: Vec<PathBuf> = self.inner.lock().drain().collect();
        let mut removed = 0;
        for path in paths {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove temp file {}: {}", path.display(), e),
            }
        }
        if removed > 0 {
            debug!("Removed {removed} temp files");
        }
        removed
    }

    /// Snapshot of currently tracked paths.
    pub fn tracked(&self) -> Vec<PathBuf> {
        self.inner.lock().iter().cloned().collect()
    }
}

impl Default for TempRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        let tracked = std::mem::take(self.tracked.get_mut().unwrap_or_else(|e| e.into_inner()));
        for path in tracked {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("Failed to remove temp file {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn make_temp_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"x").unwrap();
        path
    }

    #[test]
    fn register_is_insert_only() {
        let registry = TempRegistry::with_cleanup(false);
        assert!(registry.register("/tmp/a.png"));
        assert!(!registry.register("/tmp/a.png"));
        assert_eq!(registry.tracked().len(), 1);
    }

    #[test]
    fn release_without_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_temp_file(&dir, "page_0.png");
        let registry = TempRegistry::new();
        registry.register(&path);
        assert!(registry.release(&path));
        assert!(path.exists());
        assert!(!registry.release(&path));
    }

    #[test]
    fn cleanup_all_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = make_temp_file(&dir, "page_0.png");
        let b = make_temp_file(&dir, "page_1.png");
        let registry = TempRegistry::new();
        registry.register(&a);
        registry.register(&b);
        assert_eq!(registry.cleanup_all(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(registry.tracked().is_empty());
    }

    #[test]
    fn drop_cleans_up_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_temp_file(&dir, "page_0.png");
        {
            let registry = TempRegistry::new();
            let clone = registry.clone();
            clone.register(&path);
            // both handles dropped here
        }
        assert!(!path.exists());
    }

    #[test]
    fn drop_preserves_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = make_temp_file(&dir, "page_0.png");
        {
            let registry = TempRegistry::with_cleanup(false);
            registry.register(&path);
        }
        assert!(path.exists());
    }

    #[test]
    fn concurrent_registration() {
        let registry = TempRegistry::with_cleanup(false);
        let r1 = registry.clone();
        let r2 = registry.clone();
        let t1 = std::thread::spawn(move || {
            for i in 0..100 {
                r1.register(format!("/tmp/fields_{i}.png"));
            }
        });
        let t2 = std::thread::spawn(move || {
            for i in 0..100 {
                r2.register(format!("/tmp/tables_{i}.png"));
            }
        });
        t1.join().unwrap();
        t2.join().unwrap();
        assert_eq!(registry.tracked().len(), 200);
    }
}
