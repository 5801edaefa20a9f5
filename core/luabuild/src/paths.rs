//! On-disk locations used by the pipeline.
//!
//! All pipeline state lives in the filesystem, so every stage derives its
//! inputs and outputs from here rather than from values carried in memory.
//!
//! ## Directory Structure
//!
//! ```text
//! downloads/                    # Work directory (BuildConfig::work_dir)
//!   lua-5.4.6.tar.gz            # Release archive (deleted once compiling starts)
//!   lua-5.4.6.tar.gz.part       # Present only while a transfer is in flight
//!   lua-5.4.6.lock              # Per-version run lock
//!   lua-5.4.6/                  # Canonical source tree
//!     include/                  # Optional extra include directory
//!     src/                      # Compilation directory
//! lua-5.4.6/                    # Install tree (under BuildConfig::prefix)
//!   bin/
//!   include/
//!   lib/
//! ```

use std::path::{Path, PathBuf};

use crate::errors::LuaBuildError;
use crate::version::ReleaseVersion;

/// Top-level directory name used by archives that predate versioned trees.
pub const LEGACY_TREE_NAME: &str = "lua";

/// Suffix of the in-flight transfer marker.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Path helper rooted at the work directory.
#[derive(Debug, Clone)]
pub struct WorkPaths {
    /// The staging directory.
    pub root: PathBuf,
}

impl WorkPaths {
    /// Creates a helper for the given work directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the work directory if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_root(&self) -> Result<(), LuaBuildError> {
        std::fs::create_dir_all(&self.root).map_err(|e| {
            LuaBuildError::io(
                format!("failed to create work directory {}", self.root.display()),
                e,
            )
        })
    }

    /// Downloaded release archive.
    #[must_use]
    pub fn archive(&self, version: &ReleaseVersion) -> PathBuf {
        self.root.join(version.archive_name())
    }

    /// Canonical unpacked source tree.
    #[must_use]
    pub fn source_tree(&self, version: &ReleaseVersion) -> PathBuf {
        self.root.join(version.tree_name())
    }

    /// Unversioned tree produced by legacy archives.
    #[must_use]
    pub fn legacy_tree(&self) -> PathBuf {
        self.root.join(LEGACY_TREE_NAME)
    }

    /// Lock file guarding runs for one version.
    #[must_use]
    pub fn lock_file(&self, version: &ReleaseVersion) -> PathBuf {
        self.root.join(format!("{}.lock", version.tree_name()))
    }

    /// Lock file guarding the shared unversioned tree.
    #[must_use]
    pub fn legacy_lock_file(&self) -> PathBuf {
        self.root.join(format!("{LEGACY_TREE_NAME}.lock"))
    }
}

/// In-flight marker for a download destination (`<file>.part`).
#[must_use]
pub fn partial_marker(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Directory the sources are compiled in.
#[must_use]
pub fn compile_dir(source_tree: &Path) -> PathBuf {
    source_tree.join("src")
}

/// Optional include directory at the top of a source tree.
#[must_use]
pub fn include_dir(source_tree: &Path) -> PathBuf {
    source_tree.join("include")
}

/// Install tree for a version under the given prefix.
#[must_use]
pub fn install_tree(prefix: &Path, version: &ReleaseVersion) -> PathBuf {
    prefix.join(version.tree_name())
}
