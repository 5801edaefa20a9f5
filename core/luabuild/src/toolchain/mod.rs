//! Native toolchain capability and the build driver.
//!
//! ## Module Structure
//!
//! - [`Toolchain`] - the four operations the driver needs from a native toolchain
//! - [`Flavor`] / [`ArtifactNames`] - command line conventions and file naming
//! - [`command`] - implementation that spawns the host compiler, linker and archiver
//! - [`resolver`] - locating those binaries
//! - [`driver`] - compiling a source tree into the artifact set

pub mod command;
pub mod driver;
pub mod resolver;

#[cfg(test)]
pub(crate) mod fake;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::errors::LuaBuildError;

pub use command::CommandToolchain;
pub use driver::{BuildArtifacts, build};

/// Source file holding the interpreter's `main`.
pub const LUA_ENTRY_SOURCE: &str = "lua.c";

/// Source file holding the bytecode compiler's `main`.
pub const LUAC_ENTRY_SOURCE: &str = "luac.c";

/// Command line and file naming conventions of a toolchain family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flavor {
    /// Microsoft `cl` / `link` / `lib`.
    Msvc,
    /// GCC or Clang targeting Windows.
    MinGw,
    /// GCC or Clang on Linux and other ELF platforms.
    Unix,
    /// Apple Clang.
    MacOs,
}

impl Flavor {
    /// The flavor matching the target this binary was compiled for.
    #[must_use]
    pub fn host() -> Self {
        if cfg!(target_env = "msvc") {
            Self::Msvc
        } else if cfg!(windows) {
            Self::MinGw
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Unix
        }
    }

    /// Extension of the object files the compiler emits.
    #[must_use]
    pub fn object_extension(self) -> &'static str {
        match self {
            Self::Msvc => "obj",
            Self::MinGw | Self::Unix | Self::MacOs => "o",
        }
    }

    /// Suffix appended to executable names.
    #[must_use]
    pub fn executable_suffix(self) -> &'static str {
        match self {
            Self::Msvc | Self::MinGw => ".exe",
            Self::Unix | Self::MacOs => "",
        }
    }

    /// Raw compiler flags: release optimization, dynamic runtime, shared library define.
    #[must_use]
    pub fn compile_flags(self) -> Vec<String> {
        let flags: &[&str] = match self {
            Self::Msvc => &["/MD", "/O2", "/DLUA_BUILD_AS_DLL"],
            Self::MinGw => &["-O2", "-DLUA_BUILD_AS_DLL"],
            // LUA_USE_LINUX / LUA_USE_MACOSX would also pull in readline on 5.2.
            Self::Unix | Self::MacOs => &["-O2", "-fPIC", "-DLUA_USE_POSIX", "-DLUA_USE_DLOPEN"],
        };
        flags.iter().map(ToString::to_string).collect()
    }

    /// Raw linker flags appended to every link.
    #[must_use]
    pub fn link_flags(self) -> Vec<String> {
        match self {
            Self::Msvc | Self::MinGw | Self::MacOs => Vec::new(),
            Self::Unix => vec!["-lm".to_string(), "-ldl".to_string()],
        }
    }

    /// File extensions of build byproducts removed before every build.
    #[must_use]
    pub fn byproduct_extensions() -> &'static [&'static str] {
        &["obj", "o", "exe", "lib", "dll", "exp", "a", "so", "dylib"]
    }
}

impl fmt::Display for Flavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Msvc => "msvc",
            Self::MinGw => "mingw",
            Self::Unix => "unix",
            Self::MacOs => "macos",
        })
    }
}

/// File names of every artifact for one stripped version tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Shared library, e.g. `lua54.dll`.
    pub shared_lib: String,
    /// Import/link stub of the shared library, when the platform has one.
    pub import_lib: Option<String>,
    /// Static library as produced in the compile directory.
    pub static_lib: String,
    /// Static library name inside the install tree.
    pub installed_static_lib: String,
    /// Interpreter executable.
    pub lua_exe: String,
    /// Bytecode compiler executable.
    pub luac_exe: String,
    /// Renamed interpreter entry-point object.
    pub lua_entry_object: String,
    /// Renamed bytecode compiler entry-point object.
    pub luac_entry_object: String,
}

impl ArtifactNames {
    /// Builds the naming table for a tag such as `54`.
    #[must_use]
    pub fn new(tag: &str, flavor: Flavor) -> Self {
        let exe = flavor.executable_suffix();
        let (shared_lib, import_lib, static_lib, installed_static_lib) = match flavor {
            Flavor::Msvc => (
                format!("lua{tag}.dll"),
                Some(format!("lua{tag}.lib")),
                format!("lua{tag}-static.lib"),
                format!("lua-static{tag}.lib"),
            ),
            Flavor::MinGw => (
                format!("lua{tag}.dll"),
                Some(format!("liblua{tag}.dll.a")),
                format!("liblua{tag}-static.a"),
                format!("liblua-static{tag}.a"),
            ),
            Flavor::Unix => (
                format!("liblua{tag}.so"),
                None,
                format!("liblua{tag}-static.a"),
                format!("liblua-static{tag}.a"),
            ),
            Flavor::MacOs => (
                format!("liblua{tag}.dylib"),
                None,
                format!("liblua{tag}-static.a"),
                format!("liblua-static{tag}.a"),
            ),
        };

        Self {
            shared_lib,
            import_lib,
            static_lib,
            installed_static_lib,
            lua_exe: format!("lua{tag}{exe}"),
            luac_exe: format!("luac{tag}{exe}"),
            lua_entry_object: format!("lua{tag}.o"),
            luac_entry_object: format!("luac{tag}.o"),
        }
    }

    /// The library the interpreter executable links against.
    #[must_use]
    pub fn dynamic_link_target(&self) -> &str {
        self.import_lib.as_deref().unwrap_or(&self.shared_lib)
    }
}

/// Opaque native toolchain.
///
/// Implementations turn each call into whatever their compiler, linker and
/// archiver expect. Every path handed in is absolute or relative to the
/// caller's working directory; outputs are written exactly where asked.
pub trait Toolchain {
    /// Naming and flag conventions of this toolchain.
    fn flavor(&self) -> Flavor;

    /// Adds a directory to the header search path of subsequent compiles.
    fn add_include_dir(&mut self, dir: &Path);

    /// Compiles one source file into an object in `out_dir`, returning its path.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Toolchain`] naming the source on failure.
    fn compile(
        &self,
        source: &Path,
        out_dir: &Path,
        extra_args: &[String],
    ) -> Result<PathBuf, LuaBuildError>;

    /// Links objects into a shared library, optionally emitting its import stub.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Toolchain`] naming the output on failure.
    fn link_shared(
        &self,
        objects: &[PathBuf],
        output: &Path,
        import_lib: Option<&Path>,
        extra_args: &[String],
    ) -> Result<(), LuaBuildError>;

    /// Links objects and libraries into an executable.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Toolchain`] naming the output on failure.
    fn link_executable(
        &self,
        objects: &[PathBuf],
        output: &Path,
        libraries: &[PathBuf],
        extra_args: &[String],
    ) -> Result<(), LuaBuildError>;

    /// Archives objects into a static library.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Toolchain`] naming the output on failure.
    fn archive_static(&self, objects: &[PathBuf], output: &Path) -> Result<(), LuaBuildError>;
}
