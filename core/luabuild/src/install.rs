//! Copying build outputs into the install tree.
//!
//! Copies are independent: a failed copy is recorded in the
//! [`InstallReport`] and the remaining copies still run. Nothing already
//! copied is rolled back, so a partial install is a possible end state and
//! the report says exactly what is missing.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::errors::LuaBuildError;
use crate::toolchain::BuildArtifacts;

/// Headers that make up the public C API.
pub const PUBLIC_HEADERS: [&str; 5] = ["lua.h", "luaconf.h", "lualib.h", "lauxlib.h", "lua.hpp"];

/// Outcome of [`install`].
#[derive(Debug)]
pub struct InstallReport {
    /// The install tree.
    pub root: PathBuf,
    /// Files successfully placed in the tree.
    pub installed: Vec<PathBuf>,
    /// One entry per copy that failed.
    pub failures: Vec<LuaBuildError>,
}

impl InstallReport {
    /// Returns true when every artifact was copied.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One planned copy: source in the compile directory, destination in the tree.
struct PlannedCopy {
    source: PathBuf,
    subdir: &'static str,
    name: String,
}

/// Installs binaries, headers and libraries under `root`.
///
/// Layout:
/// - `bin/`: both executables and the shared library
/// - `include/`: the [`PUBLIC_HEADERS`]
/// - `lib/`: the import stub (if any) and the static library under its
///   installed name
#[must_use]
pub fn install(artifacts: &BuildArtifacts, root: &Path) -> InstallReport {
    let names = &artifacts.names;
    let mut plan = Vec::new();

    for name in [&names.lua_exe, &names.luac_exe, &names.shared_lib] {
        plan.push(PlannedCopy {
            source: artifacts.path(name),
            subdir: "bin",
            name: name.clone(),
        });
    }
    for header in PUBLIC_HEADERS {
        plan.push(PlannedCopy {
            source: artifacts.path(header),
            subdir: "include",
            name: header.to_string(),
        });
    }
    if let Some(import_lib) = &names.import_lib {
        plan.push(PlannedCopy {
            source: artifacts.path(import_lib),
            subdir: "lib",
            name: import_lib.clone(),
        });
    }
    plan.push(PlannedCopy {
        source: artifacts.path(&names.static_lib),
        subdir: "lib",
        name: names.installed_static_lib.clone(),
    });

    let mut report = InstallReport {
        root: root.to_path_buf(),
        installed: Vec::new(),
        failures: Vec::new(),
    };

    info!("Installing to {}", root.display());
    for copy in plan {
        match copy_one(&copy, root) {
            Ok(dest) => report.installed.push(dest),
            Err(e) => {
                warn!("{e}");
                report.failures.push(e);
            }
        }
    }
    report
}

fn copy_one(copy: &PlannedCopy, root: &Path) -> Result<PathBuf, LuaBuildError> {
    let dir = root.join(copy.subdir);
    let artifact = copy
        .source
        .file_name()
        .map_or_else(|| copy.name.clone(), |n| n.to_string_lossy().into_owned());

    if !dir.is_dir() {
        std::fs::create_dir_all(&dir)
            .map_err(|e| LuaBuildError::install(&artifact, &dir, e.to_string()))?;
    }

    let dest = dir.join(&copy.name);
    std::fs::copy(&copy.source, &dest)
        .map_err(|e| LuaBuildError::install(&artifact, &dest, e.to_string()))?;
    Ok(dest)
}
