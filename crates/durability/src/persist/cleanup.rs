//! Pending temporary files and termination cleanup.
//!
//! Every in-flight persist registers its temporary file with a
//! [`CleanupRegistry`] through a [`CleanupGuard`]; dropping the guard
//! deregisters it. On SIGINT/SIGTERM the handler installed by
//! [`install_signal_cleanup`] marks the global registry interrupted,
//! removes every registered file, and exits. The handler runs on the
//! dedicated `ctrlc` thread, never in signal context.
//!
//! In-flight persists poll [`CleanupRegistry::is_interrupted`] between
//! steps so that no rename happens after a termination request.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use psrstore_core::{Error, Result};
use tracing::{debug, warn};

use super::TEMP_SUFFIX;

static GLOBAL: Lazy<Arc<CleanupRegistry>> = Lazy::new(|| Arc::new(CleanupRegistry::new()));

/// Process-wide registry used by default
pub fn global_registry() -> &'static Arc<CleanupRegistry> {
    &GLOBAL
}

/// Set of temporary files to remove if the process is terminated
#[derive(Debug, Default)]
pub struct CleanupRegistry {
    pending: Mutex<BTreeMap<u64, PathBuf>>,
    next_id: AtomicU64,
    interrupted: AtomicBool,
}

impl CleanupRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        CleanupRegistry::default()
    }

    /// Register `path` until the returned guard is dropped
    pub fn register(self: &Arc<Self>, path: &Path) -> CleanupGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pending.lock().insert(id, path.to_path_buf());
        CleanupGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    /// Paths currently registered
    pub fn pending(&self) -> Vec<PathBuf> {
        self.pending.lock().values().cloned().collect()
    }

    /// True if `path` is currently registered
    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.lock().values().any(|p| p == path)
    }

    /// Remove every registered file from disk and clear the registry
    ///
    /// Returns the number of files removed.
    pub fn remove_pending(&self) -> usize {
        let drained: Vec<PathBuf> = std::mem::take(&mut *self.pending.lock())
            .into_values()
            .collect();
        let mut removed = 0;
        for path in drained {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!(target: "psrstore::persist", path = %path.display(), error = %e, "Failed to remove temporary file")
                }
            }
        }
        removed
    }

    /// Mark the registry interrupted
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// True once [`CleanupRegistry::interrupt`] has been called
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// `Err(Interrupted)` once interrupted
    pub fn check_interrupted(&self) -> Result<()> {
        if self.is_interrupted() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Keeps a path registered while alive
#[derive(Debug)]
pub struct CleanupGuard {
    registry: Arc<CleanupRegistry>,
    id: u64,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        self.registry.pending.lock().remove(&self.id);
    }
}

/// Install a SIGINT/SIGTERM handler that removes pending temporaries
///
/// Can be installed once per process.
#[cfg(feature = "termination")]
pub fn install_signal_cleanup() -> Result<()> {
    ctrlc::set_handler(|| {
        let registry = global_registry();
        registry.interrupt();
        let removed = registry.remove_pending();
        warn!(target: "psrstore::persist", removed, "Terminated, removed pending temporary files");
        std::process::exit(130);
    })
    .map_err(|e| Error::invalid_state(format!("cannot install termination handler: {}", e)))
}

/// Remove leftover temporaries from earlier crashes in `dir`
///
/// Only files named like persist temporaries (`.<name>.<random>.psrtmp`)
/// and not registered in `registry` are removed.
pub fn cleanup_stale_temp_files(dir: &Path, registry: &CleanupRegistry) -> Result<usize> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io("read_dir", dir, e))?;
    let mut removed = 0;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io("read_dir", dir, e))?;
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX))
            .unwrap_or(false);
        if !is_temp || registry.is_pending(&path) {
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| Error::io("remove", &path, e))?;
        debug!(target: "psrstore::persist", path = %path.display(), "Removed stale temporary file");
        removed += 1;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_deregisters_on_drop() {
        let registry = Arc::new(CleanupRegistry::new());
        let a = registry.register(Path::new("/tmp/a"));
        let b = registry.register(Path::new("/tmp/b"));
        assert_eq!(registry.pending().len(), 2);

        drop(a);
        assert_eq!(registry.pending(), vec![PathBuf::from("/tmp/b")]);
        drop(b);
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_remove_pending_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".obs.abc.psrtmp");
        std::fs::write(&path, b"partial").unwrap();

        let registry = Arc::new(CleanupRegistry::new());
        let _guard = registry.register(&path);
        let _missing = registry.register(&dir.path().join("gone"));

        assert_eq!(registry.remove_pending(), 1);
        assert!(!path.exists());
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_interrupt_flag() {
        let registry = CleanupRegistry::new();
        assert!(registry.check_interrupted().is_ok());
        registry.interrupt();
        assert!(matches!(registry.check_interrupted(), Err(Error::Interrupted)));
    }

    #[test]
    fn test_stale_sweep_skips_registered_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".obs.psrc.x1y2.psrtmp");
        let live = dir.path().join(".obs.psrc.z9.psrtmp");
        let foreign = dir.path().join("notes.tmp");
        for path in [&stale, &live, &foreign] {
            std::fs::write(path, b"x").unwrap();
        }

        let registry = Arc::new(CleanupRegistry::new());
        let _guard = registry.register(&live);

        assert_eq!(cleanup_stale_temp_files(dir.path(), &registry).unwrap(), 1);
        assert!(!stale.exists());
        assert!(live.exists());
        assert!(foreign.exists());
    }
}
