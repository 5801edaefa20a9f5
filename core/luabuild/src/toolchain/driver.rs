//! Compiling a normalized source tree into the artifact set.
//!
//! ## Build Order
//!
//! 1. Reject unsupported versions before touching the filesystem
//! 2. Register `<tree>/include` if present
//! 3. Delete byproducts of any earlier attempt in `<tree>/src`
//! 4. Compile every top-level `.c` file on its own
//! 5. Move the two entry-point objects out of the generic object set
//! 6. Link the shared library (and its import stub) from the generic set
//! 7. Link `lua` against the shared library
//! 8. Archive the generic set into the static library
//! 9. Link `luac` against the static library

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::LuaBuildError;
use crate::paths::{compile_dir, include_dir};
use crate::toolchain::{ArtifactNames, Flavor, LUA_ENTRY_SOURCE, LUAC_ENTRY_SOURCE, Toolchain};
use crate::version::ReleaseVersion;

/// Outputs of a successful [`build`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifacts {
    /// Directory every artifact was written to.
    pub compile_dir: PathBuf,
    /// Names of the produced files.
    pub names: ArtifactNames,
    /// Objects linked into the libraries (entry points excluded).
    pub library_objects: Vec<PathBuf>,
    /// The renamed `lua` and `luac` entry-point objects.
    pub entry_objects: [PathBuf; 2],
}

impl BuildArtifacts {
    /// Path of a file in the compile directory.
    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.compile_dir.join(name)
    }
}

/// Builds every artifact for `version` from `source_tree`.
///
/// # Errors
///
/// Returns an error if:
/// - The version is unsupported ([`LuaBuildError::UnsupportedVersion`])
/// - The tree has no `src/` directory or lacks an entry-point source ([`LuaBuildError::Layout`])
/// - Stale byproducts cannot be deleted ([`LuaBuildError::Io`])
/// - Any compile, link or archive step fails ([`LuaBuildError::Toolchain`])
pub fn build(
    version: &ReleaseVersion,
    source_tree: &Path,
    toolchain: &mut dyn Toolchain,
) -> Result<BuildArtifacts, LuaBuildError> {
    version.ensure_supported()?;

    let flavor = toolchain.flavor();
    let names = ArtifactNames::new(&version.stripped_tag(), flavor);

    let include = include_dir(source_tree);
    if include.is_dir() {
        debug!("include dir: {}", include.display());
        toolchain.add_include_dir(&include);
    }

    let dir = compile_dir(source_tree);
    if !dir.is_dir() {
        return Err(LuaBuildError::layout(&dir, "source tree has no src directory"));
    }

    let sources = scan_compile_dir(&dir, &names)?;
    for entry in [LUA_ENTRY_SOURCE, LUAC_ENTRY_SOURCE] {
        if !sources.iter().any(|s| s.file_name().is_some_and(|n| n == entry)) {
            return Err(LuaBuildError::layout(
                dir.join(entry),
                "entry-point source is missing",
            ));
        }
    }

    info!("Compiling {} sources for Lua {version} ({flavor})", sources.len());
    let flags = flavor.compile_flags();
    let mut objects = Vec::with_capacity(sources.len());
    for source in &sources {
        debug!("compiling {}", source.display());
        objects.push(toolchain.compile(source, &dir, &flags)?);
    }

    let (library_objects, entry_objects) = partition_entry_objects(objects, &dir, &names)?;

    let link_flags = flavor.link_flags();
    let shared = dir.join(&names.shared_lib);
    let import = names.import_lib.as_ref().map(|n| dir.join(n));
    let static_lib = dir.join(&names.static_lib);

    info!("Linking {}", names.shared_lib);
    toolchain.link_shared(&library_objects, &shared, import.as_deref(), &link_flags)?;

    info!("Linking {}", names.lua_exe);
    toolchain.link_executable(
        std::slice::from_ref(&entry_objects[0]),
        &dir.join(&names.lua_exe),
        &[dir.join(names.dynamic_link_target())],
        &link_flags,
    )?;

    info!("Creating static library {}", names.static_lib);
    toolchain.archive_static(&library_objects, &static_lib)?;

    info!("Linking {}", names.luac_exe);
    toolchain.link_executable(
        std::slice::from_ref(&entry_objects[1]),
        &dir.join(&names.luac_exe),
        &[static_lib],
        &link_flags,
    )?;

    Ok(BuildArtifacts {
        compile_dir: dir,
        names,
        library_objects,
        entry_objects,
    })
}

/// Returns the sorted top-level C sources and deletes stale byproducts.
fn scan_compile_dir(dir: &Path, names: &ArtifactNames) -> Result<Vec<PathBuf>, LuaBuildError> {
    let mut sources = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| {
            LuaBuildError::io(
                format!("failed to list {}", dir.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        if has_extension(&path, &["c"]) {
            sources.push(path);
        } else if is_byproduct(&path, names) {
            debug!("removing stale {}", path.display());
            std::fs::remove_file(&path).map_err(|e| {
                LuaBuildError::io(format!("failed to remove stale {}", path.display()), e)
            })?;
        }
    }

    Ok(sources)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Byproducts are matched by extension, plus the extension-less executables
/// that Unix flavors produce.
fn is_byproduct(path: &Path, names: &ArtifactNames) -> bool {
    if has_extension(path, Flavor::byproduct_extensions()) {
        return true;
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n == names.lua_exe || n == names.luac_exe)
}

/// Splits compiled objects into the library set and the renamed entry points.
fn partition_entry_objects(
    objects: Vec<PathBuf>,
    dir: &Path,
    names: &ArtifactNames,
) -> Result<(Vec<PathBuf>, [PathBuf; 2]), LuaBuildError> {
    let stem_of = |p: &Path| p.file_stem().and_then(|s| s.to_str()).map(str::to_owned);

    let mut library = Vec::with_capacity(objects.len().saturating_sub(2));
    let mut lua = None;
    let mut luac = None;
    for object in objects {
        match stem_of(&object).as_deref() {
            Some("lua") => lua = Some(object),
            Some("luac") => luac = Some(object),
            _ => library.push(object),
        }
    }

    let rename = |object: Option<PathBuf>, target: &str| -> Result<PathBuf, LuaBuildError> {
        let object = object.ok_or_else(|| {
            LuaBuildError::toolchain(
                format!("rename {target}"),
                "compiler produced no entry-point object",
            )
        })?;
        let renamed = dir.join(target);
        std::fs::rename(&object, &renamed).map_err(|e| {
            LuaBuildError::toolchain(
                format!("rename {target}"),
                format!("failed to rename {}: {e}", object.display()),
            )
        })?;
        Ok(renamed)
    };

    let lua = rename(lua, &names.lua_entry_object)?;
    let luac = rename(luac, &names.luac_entry_object)?;
    Ok((library, [lua, luac]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolchain::fake::{Call, FakeToolchain, write_source_tree};

    fn snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .expect("read dir")
            .map(|e| e.expect("entry").path())
            .filter(|p| p.is_file())
            .map(|p| {
                let name = p.file_name().expect("name").to_string_lossy().into_owned();
                let bytes = std::fs::read(&p).expect("read");
                (name, bytes)
            })
            .collect();
        files.sort();
        files
    }

    #[test]
    fn builds_full_msvc_artifact_set() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.4.6");
        write_source_tree(&tree);
        let version = ReleaseVersion::parse("5.4.6").expect("valid");
        let mut tc = FakeToolchain::new(Flavor::Msvc);

        let artifacts = build(&version, &tree, &mut tc).expect("build succeeds");

        let src = tree.join("src");
        for name in [
            "lua54.dll",
            "lua54.lib",
            "lua54-static.lib",
            "lua54.exe",
            "luac54.exe",
            "lua54.o",
            "luac54.o",
        ] {
            assert!(src.join(name).is_file(), "{name} should exist");
        }
        assert!(!src.join("lua.obj").exists());
        assert!(!src.join("luac.obj").exists());
        assert_eq!(tc.include_dirs, vec![tree.join("include")]);
        assert_eq!(artifacts.library_objects.len(), 3);
    }

    #[test]
    fn entry_points_never_reach_generic_link_or_archive() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.3.6");
        write_source_tree(&tree);
        let version = ReleaseVersion::parse("5.3.6").expect("valid");
        // Unix objects and renamed entry points share the `.o` extension.
        let mut tc = FakeToolchain::new(Flavor::Unix);

        let artifacts = build(&version, &tree, &mut tc).expect("build succeeds");

        let entry = &artifacts.entry_objects;
        for call in tc.calls() {
            match call {
                Call::LinkShared { objects, .. } | Call::ArchiveStatic { objects, .. } => {
                    assert!(objects.iter().all(|o| !entry.contains(o)));
                    assert_eq!(objects.len(), 3);
                }
                Call::Compile(_) | Call::LinkExecutable { .. } => {}
            }
        }
    }

    #[test]
    fn link_order_and_library_choice() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.4.6");
        write_source_tree(&tree);
        let version = ReleaseVersion::parse("5.4.6").expect("valid");
        let mut tc = FakeToolchain::new(Flavor::Msvc);

        build(&version, &tree, &mut tc).expect("build succeeds");

        let src = tree.join("src");
        let links: Vec<Call> = tc
            .calls()
            .into_iter()
            .filter(|c| !matches!(c, Call::Compile(_)))
            .collect();
        assert_eq!(links.len(), 4);
        assert!(matches!(&links[0], Call::LinkShared { output, import_lib, .. }
            if *output == src.join("lua54.dll") && *import_lib == Some(src.join("lua54.lib"))));
        assert!(matches!(&links[1], Call::LinkExecutable { objects, libraries, .. }
            if *objects == vec![src.join("lua54.o")] && *libraries == vec![src.join("lua54.lib")]));
        assert!(matches!(&links[2], Call::ArchiveStatic { output, .. }
            if *output == src.join("lua54-static.lib")));
        assert!(matches!(&links[3], Call::LinkExecutable { objects, libraries, .. }
            if *objects == vec![src.join("luac54.o")]
                && *libraries == vec![src.join("lua54-static.lib")]));
    }

    #[test]
    fn rebuild_is_idempotent_and_clears_stale_files() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.4.6");
        write_source_tree(&tree);
        let version = ReleaseVersion::parse("5.4.6").expect("valid");
        let src = tree.join("src");

        build(&version, &tree, &mut FakeToolchain::new(Flavor::Msvc)).expect("first build");
        let first = snapshot(&src);

        std::fs::write(src.join("leftover.obj"), b"old").expect("write");
        std::fs::write(src.join("old.dll"), b"old").expect("write");
        build(&version, &tree, &mut FakeToolchain::new(Flavor::Msvc)).expect("second build");

        assert_eq!(snapshot(&src), first);
    }

    #[test]
    fn unsupported_version_touches_nothing() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.1.5");
        write_source_tree(&tree);
        std::fs::write(tree.join("src").join("stale.obj"), b"old").expect("write");
        let before = snapshot(&tree.join("src"));
        let version = ReleaseVersion::parse("5.1.5").expect("valid");
        let mut tc = FakeToolchain::new(Flavor::Msvc);

        let err = build(&version, &tree, &mut tc).expect_err("must be rejected");

        assert!(matches!(err, LuaBuildError::UnsupportedVersion { .. }));
        assert!(tc.calls().is_empty());
        assert!(tc.include_dirs.is_empty());
        assert_eq!(snapshot(&tree.join("src")), before);
    }

    #[test]
    fn compile_failure_stops_the_build() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.4.6");
        write_source_tree(&tree);
        let version = ReleaseVersion::parse("5.4.6").expect("valid");
        let mut tc = FakeToolchain::new(Flavor::Msvc).failing_on("lcode.c");

        let err = build(&version, &tree, &mut tc).expect_err("must fail");

        assert!(matches!(err, LuaBuildError::Toolchain { ref step, .. } if step == "compile lcode.c"));
        assert!(
            !tc.calls()
                .iter()
                .any(|c| matches!(c, Call::LinkShared { .. }))
        );
        assert!(!tree.join("src").join("lua54.dll").exists());
    }

    #[test]
    fn missing_entry_point_is_reported() {
        let temp = tempfile::tempdir().expect("temp dir");
        let tree = temp.path().join("lua-5.4.6");
        write_source_tree(&tree);
        std::fs::remove_file(tree.join("src").join("luac.c")).expect("remove");
        let version = ReleaseVersion::parse("5.4.6").expect("valid");

        let err = build(&version, &tree, &mut FakeToolchain::new(Flavor::Msvc))
            .expect_err("must fail");

        assert!(err.to_string().contains("luac.c"));
    }
}
