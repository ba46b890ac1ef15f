//! Reference counts on artifacts that are being read (e.g. uploaded).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared table of leased artifact paths. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ArtifactLeases {
    counts: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ArtifactLeases {
    /// Creates an empty lease table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `path` as in use until the returned lease is dropped.
    #[must_use]
    pub fn acquire(&self, path: impl Into<PathBuf>) -> ArtifactLease {
        let path = path.into();
        *self.counts.lock().entry(path.clone()).or_insert(0) += 1;
        ArtifactLease {
            path,
            counts: Arc::clone(&self.counts),
        }
    }

    /// Returns true if at least one lease on `path` is alive.
    #[must_use]
    pub fn is_leased(&self, path: &Path) -> bool {
        self.counts.lock().contains_key(path)
    }

    /// Returns the number of distinct leased paths.
    #[must_use]
    pub fn active(&self) -> usize {
        self.counts.lock().len()
    }
}

/// Guard keeping an artifact out of eviction.
#[derive(Debug)]
pub struct ArtifactLease {
    path: PathBuf,
    counts: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ArtifactLease {
    /// Returns the leased artifact path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLease {
    fn drop(&mut self) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(&self.path) {
            *count -= 1;
            if *count == 0 {
                counts.remove(&self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_leases() {
        let leases = ArtifactLeases::new();
        let path = PathBuf::from("/cache/a.gif");

        let first = leases.acquire(&path);
        let second = leases.acquire(path.clone());
        assert!(leases.is_leased(&path));
        assert_eq!(leases.active(), 1);

        drop(first);
        assert!(leases.is_leased(&path));

        drop(second);
        assert!(!leases.is_leased(&path));
        assert_eq!(leases.active(), 0);
    }

    #[test]
    fn test_clones_share_table() {
        let leases = ArtifactLeases::new();
        let lease = leases.clone().acquire("/cache/b.png");

        assert!(leases.is_leased(Path::new("/cache/b.png")));
        assert_eq!(lease.path(), Path::new("/cache/b.png"));
    }
}
