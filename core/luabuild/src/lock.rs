//! Advisory locks on the work directory.
//!
//! Two runs for the same version share one source tree and one install
//! tree, so the second run is refused instead of racing the first.
//! [`VersionLock`] only covers names derived from the version. Every run
//! also unpacks next to the unversioned `lua/` tree that legacy archives
//! produce, so [`LegacyTreeLock`] serializes extraction and normalization
//! across versions.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::debug;

use crate::errors::LuaBuildError;
use crate::paths::WorkPaths;
use crate::version::ReleaseVersion;

/// Exclusive hold on `<work_dir>/lua-<version>.lock`.
///
/// The OS lock is released when this value is dropped. The lock file itself
/// is left in place.
#[derive(Debug)]
pub struct VersionLock {
    _file: File,
    path: PathBuf,
}

impl VersionLock {
    /// Takes the lock without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Busy`] when another process holds the lock,
    /// or [`LuaBuildError::Io`] if the lock file cannot be opened.
    pub fn acquire(version: &ReleaseVersion, paths: &WorkPaths) -> Result<Self, LuaBuildError> {
        let path = paths.lock_file(version);
        let file = open_lock_file(&path)
            .map_err(|e| LuaBuildError::io(format!("Failed to open {}", path.display()), e))?;

        let acquired = FileExt::try_lock_exclusive(&file)
            .map_err(|e| LuaBuildError::io(format!("Failed to lock {}", path.display()), e))?;
        if !acquired {
            return Err(LuaBuildError::Busy {
                version: version.to_string(),
                lock: path,
            });
        }

        debug!("Acquired {}", path.display());
        Ok(Self { _file: file, path })
    }

    /// The lock file this value holds.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Exclusive hold on `<work_dir>/lua.lock`, taken around stale-tree removal,
/// extraction and normalization.
///
/// Unlike [`VersionLock`] this waits for the holder: the guarded section is
/// short and a different version is a legitimate concurrent run.
#[derive(Debug)]
pub struct LegacyTreeLock {
    _file: File,
}

impl LegacyTreeLock {
    /// Takes the lock, blocking until it is free.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Io`] if the lock file cannot be opened or locked.
    pub fn acquire(paths: &WorkPaths) -> Result<Self, LuaBuildError> {
        let path = paths.legacy_lock_file();
        let file = open_lock_file(&path)
            .map_err(|e| LuaBuildError::io(format!("Failed to open {}", path.display()), e))?;
        FileExt::lock_exclusive(&file)
            .map_err(|e| LuaBuildError::io(format!("Failed to lock {}", path.display()), e))?;
        debug!("Acquired {}", path.display());
        Ok(Self { _file: file })
    }
}

fn open_lock_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}
