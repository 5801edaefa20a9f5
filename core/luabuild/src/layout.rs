//! Source tree layout normalization.
//!
//! Releases from 5.0 onwards unpack to `lua-<version>/`, but some historical
//! archives unpack to a bare `lua/`. After normalization exactly one tree
//! named `lua-<version>/` exists in the work directory.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::LuaBuildError;
use crate::paths::WorkPaths;
use crate::version::ReleaseVersion;

/// Removes trees left behind by an earlier run of the same version.
///
/// Both the canonical tree and an unversioned `lua/` tree are removed so the
/// next extraction cannot be confused with stale contents.
///
/// # Errors
///
/// Returns [`LuaBuildError::Layout`] if a stale tree exists and cannot be removed.
pub fn remove_stale(version: &ReleaseVersion, paths: &WorkPaths) -> Result<(), LuaBuildError> {
    for stale in [paths.source_tree(version), paths.legacy_tree()] {
        if stale.exists() {
            info!("Removing stale tree {}", stale.display());
            std::fs::remove_dir_all(&stale).map_err(|e| {
                LuaBuildError::layout(&stale, format!("failed to remove stale tree: {e}"))
            })?;
        }
    }
    Ok(())
}

/// Ensures the extracted sources live under the canonical tree name.
///
/// Returns the canonical tree path.
///
/// # Errors
///
/// Returns [`LuaBuildError::Layout`] if neither tree exists, if both exist,
/// or if renaming the legacy tree fails.
pub fn normalize(version: &ReleaseVersion, paths: &WorkPaths) -> Result<PathBuf, LuaBuildError> {
    let canonical = paths.source_tree(version);
    let legacy = paths.legacy_tree();

    match (canonical.is_dir(), legacy.is_dir()) {
        (true, false) => Ok(canonical),
        (false, true) => {
            info!("Renaming {} to {}", legacy.display(), canonical.display());
            std::fs::rename(&legacy, &canonical).map_err(|e| {
                LuaBuildError::layout(
                    &legacy,
                    format!("failed to rename to {}: {e}", canonical.display()),
                )
            })?;
            Ok(canonical)
        }
        (true, true) => Err(LuaBuildError::layout(
            &legacy,
            format!(
                "ambiguous layout: both {} and an unversioned tree exist",
                canonical.display()
            ),
        )),
        (false, false) => Err(LuaBuildError::layout(
            &canonical,
            "archive did not contain a lua source tree",
        )),
    }
}

/// Deletes the downloaded archive once compilation starts.
///
/// Failures are logged and otherwise ignored. Returns whether the file is gone.
pub fn discard_archive(archive: &Path) -> bool {
    if !archive.exists() {
        return true;
    }
    match std::fs::remove_file(archive) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to remove {}: {e}", archive.display());
            false
        }
    }
}
