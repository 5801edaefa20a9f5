//! Release archive extraction.
//!
//! Lua releases are gzip-compressed tarballs whose entries sit under a single
//! top-level directory. Entries are unpacked with their relative paths intact;
//! renaming that directory is the layout normalizer's job.

use std::path::{Component, Path};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::errors::LuaBuildError;

/// Extracts a `.tar.gz` archive into `dest_dir`.
///
/// Creates the destination directory if it does not exist.
///
/// # Errors
///
/// Returns [`LuaBuildError::Extraction`] naming the archive if:
/// - The archive cannot be opened or is not a valid gzip tarball
/// - An entry path is absolute or escapes the destination with `..`
/// - A directory or file cannot be created
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use luabuild::archive::extract;
///
/// extract(Path::new("downloads/lua-5.4.6.tar.gz"), Path::new("downloads"))?;
/// # Ok::<(), luabuild::LuaBuildError>(())
/// ```
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<(), LuaBuildError> {
    let fail = |message: String| LuaBuildError::extraction(archive_path, message);

    std::fs::create_dir_all(dest_dir)
        .map_err(|e| fail(format!("failed to create {}: {e}", dest_dir.display())))?;

    let file = std::fs::File::open(archive_path).map_err(|e| fail(format!("cannot open: {e}")))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let entries = archive
        .entries()
        .map_err(|e| fail(format!("cannot read entries: {e}")))?;

    let mut count = 0usize;
    for entry in entries {
        let mut entry = entry.map_err(|e| fail(format!("cannot read entry: {e}")))?;

        let entry_path = entry
            .path()
            .map_err(|e| fail(format!("invalid entry path: {e}")))?
            .into_owned();

        // Reject anything that could land outside dest_dir.
        if entry_path.is_absolute()
            || entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(fail(format!(
                "refusing to extract entry outside the destination: {}",
                entry_path.display()
            )));
        }

        let output_path = dest_dir.join(&entry_path);

        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&output_path)
                .map_err(|e| fail(format!("failed to create {}: {e}", output_path.display())))?;
        } else {
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| fail(format!("failed to create {}: {e}", parent.display())))?;
            }
            entry
                .unpack(&output_path)
                .map_err(|e| fail(format!("failed to extract {}: {e}", output_path.display())))?;
        }
        count += 1;
    }

    info!(
        "Extracted {} ({count} entries) to {}",
        archive_path.display(),
        dest_dir.display()
    );
    Ok(())
}
