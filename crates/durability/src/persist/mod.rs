//! Atomic replacement of container files
//!
//! A persist never modifies the destination in place. Its steps are:
//!
//! 1. `WriteTemp`: create a uniquely named temporary in the destination's
//!    directory, register it for termination cleanup, run the caller's
//!    writer against it, and fsync it
//! 2. `RenameOver`: rename the temporary over the destination, then fsync
//!    the parent directory
//! 3. `FixPermissions`: chmod the destination to the configured mode
//!    masked by the process umask
//!
//! Any error before the rename removes the temporary and leaves the
//! destination untouched. Once the rename has happened the destination
//! holds the new data, so a failed directory fsync or chmod is logged and
//! reported in [`PersistReport`], but the persist still succeeds.

pub mod cleanup;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use psrstore_core::{Error, Result, ResultExt};
use tracing::{debug, info, warn};

pub use cleanup::{cleanup_stale_temp_files, global_registry, CleanupGuard, CleanupRegistry};
#[cfg(feature = "termination")]
pub use cleanup::install_signal_cleanup;

/// Suffix of every persist temporary file
pub const TEMP_SUFFIX: &str = ".psrtmp";

/// Default permission mode before the umask is applied
pub const DEFAULT_FILE_MODE: u32 = 0o666;

/// Steps of a persist
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistState {
    /// Nothing done yet
    Start,
    /// Writing and syncing the temporary file
    WriteTemp,
    /// Renaming the temporary over the destination
    RenameOver,
    /// Resetting destination permissions
    FixPermissions,
    /// Destination replaced
    Done,
    /// A step failed before the rename; destination untouched
    Failed,
}

impl fmt::Display for PersistState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PersistState::Start => "start",
            PersistState::WriteTemp => "write temporary",
            PersistState::RenameOver => "rename over destination",
            PersistState::FixPermissions => "fix permissions",
            PersistState::Done => "done",
            PersistState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Destination path
    pub path: PathBuf,
    /// Bytes in the new file
    pub bytes: u64,
    /// False if the parent directory fsync failed (the rename may not be durable yet)
    pub dir_synced: bool,
    /// False if the permission reset failed (data is still in place)
    pub permissions_fixed: bool,
}

/// Write-temp-then-rename persist of one destination file
#[derive(Debug, Clone)]
pub struct AtomicPersist {
    dest: PathBuf,
    mode: u32,
    registry: Arc<CleanupRegistry>,
}

impl AtomicPersist {
    /// Persist to `dest` using the global cleanup registry
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        AtomicPersist {
            dest: dest.into(),
            mode: DEFAULT_FILE_MODE,
            registry: Arc::clone(global_registry()),
        }
    }

    /// Use a specific cleanup registry
    pub fn with_registry(mut self, registry: Arc<CleanupRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Permission mode applied (masked by umask) after the rename
    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Destination path
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Run the persist; `write` fills the temporary file
    pub fn run<F>(&self, write: F) -> Result<PersistReport>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        let mut state = PersistState::Start;
        let result = self.run_steps(&mut state, write);
        match &result {
            Ok(report) => info!(
                target: "psrstore::persist",
                path = %report.path.display(),
                bytes = report.bytes,
                "Persisted file"
            ),
            Err(e) => warn!(
                target: "psrstore::persist",
                path = %self.dest.display(),
                step = %state,
                error = %e,
                "Persist failed"
            ),
        }
        result.with_context(|| format!("persist '{}'", self.dest.display()))
    }

    fn run_steps<F>(&self, state: &mut PersistState, write: F) -> Result<PersistReport>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        let file_name = self
            .dest
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::invalid_param(format!("'{}' has no file name", self.dest.display()))
            })?;
        let dir = match self.dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        self.transition(state, PersistState::WriteTemp);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&dir)
            .map_err(|e| {
                *state = PersistState::Failed;
                Error::io("create temporary", &dir, e)
            })?;
        let guard = self.registry.register(temp.path());

        let written = write(temp.as_file_mut())
            .and_then(|()| self.registry.check_interrupted())
            .and_then(|()| {
                temp.as_file()
                    .sync_all()
                    .map_err(|e| Error::io("fsync", temp.path(), e))
            })
            .and_then(|()| {
                temp.as_file()
                    .metadata()
                    .map(|m| m.len())
                    .map_err(|e| Error::io("stat", temp.path(), e))
            });
        let bytes = match written {
            Ok(bytes) => bytes,
            Err(e) => {
                // dropping `temp` removes the file
                *state = PersistState::Failed;
                return Err(e.context(PersistState::WriteTemp.to_string()));
            }
        };

        self.transition(state, PersistState::RenameOver);
        if let Err(e) = self.registry.check_interrupted() {
            *state = PersistState::Failed;
            return Err(e);
        }
        temp.persist(&self.dest).map_err(|e| {
            *state = PersistState::Failed;
            Error::io("rename", &self.dest, e.error)
        })?;
        drop(guard);
        let dir_synced = self.after_rename("fsync directory", sync_dir(&dir));

        self.transition(state, PersistState::FixPermissions);
        let permissions_fixed = self.after_rename("chmod", fix_permissions(&self.dest, self.mode));

        self.transition(state, PersistState::Done);
        Ok(PersistReport {
            path: self.dest.clone(),
            bytes,
            dir_synced,
            permissions_fixed,
        })
    }

    /// Log a failure that happened after the destination was replaced
    fn after_rename(&self, step: &str, result: Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    target: "psrstore::persist",
                    path = %self.dest.display(),
                    step,
                    error = %e,
                    "Step failed after rename; data is in place"
                );
                false
            }
        }
    }

    fn transition(&self, state: &mut PersistState, next: PersistState) {
        debug!(target: "psrstore::persist", from = %state, to = %next, path = %self.dest.display(), "Persist step");
        *state = next;
    }
}

fn sync_dir(dir: &Path) -> Result<()> {
    let handle = File::open(dir).map_err(|e| Error::io("open directory", dir, e))?;
    handle
        .sync_all()
        .map_err(|e| Error::io("fsync directory", dir, e))
}

/// Current process umask
#[cfg(unix)]
pub fn current_umask() -> u32 {
    // SAFETY: umask cannot fail; it is set back to the original value
    // immediately.
    unsafe {
        let mask = libc::umask(0);
        libc::umask(mask);
        mask as u32
    }
}

/// Set `path` to `mode & !umask`
#[cfg(unix)]
pub fn fix_permissions(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let effective = mode & !current_umask();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(effective))
        .map_err(|e| Error::io("chmod", path, e))
}

/// Permissions are left to the platform default
#[cfg(not(unix))]
pub fn fix_permissions(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().ends_with(TEMP_SUFFIX))
            .collect()
    }

    fn local_persist(dest: &Path) -> (AtomicPersist, Arc<CleanupRegistry>) {
        let registry = Arc::new(CleanupRegistry::new());
        let persist = AtomicPersist::new(dest).with_registry(Arc::clone(&registry));
        (persist, registry)
    }

    #[test]
    fn test_failure_after_rename_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let (persist, _registry) = local_persist(&dir.path().join("obs.psrc"));
        let missing = dir.path().join("gone");
        assert!(!persist.after_rename("fsync directory", sync_dir(&missing)));
        assert!(persist.after_rename("fsync directory", sync_dir(dir.path())));
    }

    #[test]
    fn test_persist_creates_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obs.psrc");
        let (persist, registry) = local_persist(&dest);

        let report = persist
            .run(|file| {
                file.write_all(b"new contents")?;
                Ok(())
            })
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"new contents");
        assert_eq!(report.bytes, 12);
        assert!(report.dir_synced);
        assert!(report.permissions_fixed);
        assert!(temp_files(dir.path()).is_empty());
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_failed_write_leaves_original_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obs.psrc");
        std::fs::write(&dest, b"original").unwrap();
        let (persist, registry) = local_persist(&dest);

        let err = persist
            .run(|file| {
                file.write_all(b"half written")?;
                Err(Error::non_finite("SUBINT", "DAT_WTS", 3))
            })
            .unwrap_err();

        assert!(matches!(err.root(), Error::NonFinite { .. }));
        assert_eq!(err.call_path()[1], "write temporary");
        assert_eq!(std::fs::read(&dest).unwrap(), b"original");
        assert!(temp_files(dir.path()).is_empty());
        assert!(registry.pending().is_empty());
    }

    #[test]
    fn test_temp_is_registered_during_write() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obs.psrc");
        let (persist, registry) = local_persist(&dest);

        let seen = {
            let registry = Arc::clone(&registry);
            move || registry.pending()
        };
        persist
            .run(|_file| {
                let pending = seen();
                assert_eq!(pending.len(), 1);
                assert_eq!(pending[0].parent(), Some(dir.path()));
                let name = pending[0].file_name().unwrap().to_string_lossy().into_owned();
                assert!(name.starts_with(".obs.psrc."));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_interrupt_before_rename_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obs.psrc");
        std::fs::write(&dest, b"original").unwrap();
        let (persist, registry) = local_persist(&dest);

        let err = persist
            .run(|file| {
                file.write_all(b"replacement")?;
                registry.interrupt();
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err.root(), Error::Interrupted));
        assert_eq!(std::fs::read(&dest).unwrap(), b"original");
        assert!(temp_files(dir.path()).is_empty());
    }

    #[test]
    fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("no-such-dir").join("obs.psrc");
        let (persist, _) = local_persist(&dest);
        let err = persist.run(|_| Ok(())).unwrap_err();
        assert!(matches!(err.root(), Error::Io { op: "create temporary", .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_permissions_follow_umask() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("obs.psrc");
        let (persist, _) = local_persist(&dest);
        persist.with_mode(0o640).run(|_| Ok(())).unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640 & !current_umask());
    }
}
