//! [`Toolchain`] implementation that spawns the host's native tools.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::errors::LuaBuildError;
use crate::toolchain::resolver::{ToolPaths, resolve_tools};
use crate::toolchain::{Flavor, Toolchain};

/// Native toolchain driven through subprocesses.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    flavor: Flavor,
    tools: ToolPaths,
    include_dirs: Vec<PathBuf>,
}

impl CommandToolchain {
    /// Detects the host flavor and resolves its tools.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Toolchain`] if a tool cannot be found.
    pub fn detect() -> Result<Self, LuaBuildError> {
        let flavor = Flavor::host();
        Ok(Self::new(flavor, resolve_tools(flavor)?))
    }

    /// Creates a toolchain from explicit tool paths.
    #[must_use]
    pub fn new(flavor: Flavor, tools: ToolPaths) -> Self {
        Self {
            flavor,
            tools,
            include_dirs: Vec::new(),
        }
    }

    /// The resolved tool paths.
    #[must_use]
    pub fn tools(&self) -> &ToolPaths {
        &self.tools
    }

    fn compile_args(&self, source: &Path, object: &Path, extra_args: &[String]) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.flavor {
            Flavor::Msvc => {
                args.extend(["/nologo", "/c"].map(OsString::from));
                args.extend(extra_args.iter().map(OsString::from));
                for dir in &self.include_dirs {
                    args.push(prefixed("/I", dir));
                }
                args.push(source.into());
                args.push(prefixed("/Fo", object));
            }
            Flavor::MinGw | Flavor::Unix | Flavor::MacOs => {
                args.push("-c".into());
                args.extend(extra_args.iter().map(OsString::from));
                for dir in &self.include_dirs {
                    args.push(prefixed("-I", dir));
                }
                args.push(source.into());
                args.push("-o".into());
                args.push(object.into());
            }
        }
        args
    }

    fn link_shared_args(
        &self,
        objects: &[PathBuf],
        output: &Path,
        import_lib: Option<&Path>,
        extra_args: &[String],
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.flavor {
            Flavor::Msvc => {
                args.extend(["/nologo", "/DLL"].map(OsString::from));
                if let Some(import_lib) = import_lib {
                    args.push(prefixed("/IMPLIB:", import_lib));
                }
                args.push(prefixed("/OUT:", output));
                args.extend(objects.iter().map(OsString::from));
            }
            Flavor::MinGw => {
                args.push("-shared".into());
                if let Some(import_lib) = import_lib {
                    args.push(prefixed("-Wl,--out-implib,", import_lib));
                }
                args.push("-o".into());
                args.push(output.into());
                args.extend(objects.iter().map(OsString::from));
            }
            Flavor::Unix => {
                args.push("-shared".into());
                args.push(prefixed("-Wl,-soname,", Path::new(file_name(output))));
                args.push("-o".into());
                args.push(output.into());
                args.extend(objects.iter().map(OsString::from));
            }
            Flavor::MacOs => {
                args.push("-dynamiclib".into());
                args.push("-install_name".into());
                args.push(format!("@rpath/{}", file_name(output)).into());
                args.push("-o".into());
                args.push(output.into());
                args.extend(objects.iter().map(OsString::from));
            }
        }
        args.extend(extra_args.iter().map(OsString::from));
        args
    }

    fn link_executable_args(
        &self,
        objects: &[PathBuf],
        output: &Path,
        libraries: &[PathBuf],
        extra_args: &[String],
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.flavor {
            Flavor::Msvc => {
                args.push("/nologo".into());
                args.push(prefixed("/OUT:", output));
            }
            Flavor::MinGw => {
                args.push("-o".into());
                args.push(output.into());
            }
            // Installed executables find the shared library next to themselves.
            Flavor::Unix => {
                args.push("-Wl,-rpath,$ORIGIN".into());
                args.push("-o".into());
                args.push(output.into());
            }
            Flavor::MacOs => {
                args.push("-Wl,-rpath,@executable_path".into());
                args.push("-o".into());
                args.push(output.into());
            }
        }
        args.extend(objects.iter().map(OsString::from));
        args.extend(libraries.iter().map(OsString::from));
        args.extend(extra_args.iter().map(OsString::from));
        args
    }

    fn archive_args(&self, objects: &[PathBuf], output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();
        match self.flavor {
            Flavor::Msvc => {
                args.push("/nologo".into());
                args.push(prefixed("/OUT:", output));
            }
            Flavor::MinGw | Flavor::Unix | Flavor::MacOs => {
                args.push("rcs".into());
                args.push(output.into());
            }
        }
        args.extend(objects.iter().map(OsString::from));
        args
    }
}

impl Toolchain for CommandToolchain {
    fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn add_include_dir(&mut self, dir: &Path) {
        if !self.include_dirs.iter().any(|d| d == dir) {
            self.include_dirs.push(dir.to_path_buf());
        }
    }

    fn compile(
        &self,
        source: &Path,
        out_dir: &Path,
        extra_args: &[String],
    ) -> Result<PathBuf, LuaBuildError> {
        let stem = source.file_stem().ok_or_else(|| {
            LuaBuildError::toolchain(
                format!("compile {}", source.display()),
                "source has no file name",
            )
        })?;
        let mut object = out_dir.join(stem);
        object.set_extension(self.flavor.object_extension());

        run(
            &self.tools.compiler,
            &self.compile_args(source, &object, extra_args),
            out_dir,
            &format!("compile {}", file_name(source)),
        )?;
        Ok(object)
    }

    fn link_shared(
        &self,
        objects: &[PathBuf],
        output: &Path,
        import_lib: Option<&Path>,
        extra_args: &[String],
    ) -> Result<(), LuaBuildError> {
        run(
            &self.tools.linker,
            &self.link_shared_args(objects, output, import_lib, extra_args),
            working_dir(output),
            &format!("link shared library {}", file_name(output)),
        )
    }

    fn link_executable(
        &self,
        objects: &[PathBuf],
        output: &Path,
        libraries: &[PathBuf],
        extra_args: &[String],
    ) -> Result<(), LuaBuildError> {
        run(
            &self.tools.linker,
            &self.link_executable_args(objects, output, libraries, extra_args),
            working_dir(output),
            &format!("link executable {}", file_name(output)),
        )
    }

    fn archive_static(&self, objects: &[PathBuf], output: &Path) -> Result<(), LuaBuildError> {
        run(
            &self.tools.archiver,
            &self.archive_args(objects, output),
            working_dir(output),
            &format!("archive static library {}", file_name(output)),
        )
    }
}

/// Runs one tool invocation, turning a spawn failure or non-zero exit into a
/// [`LuaBuildError::Toolchain`] carrying the tool's output.
fn run(program: &Path, args: &[OsString], cwd: &Path, step: &str) -> Result<(), LuaBuildError> {
    debug!(
        "{step}: {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| {
            LuaBuildError::toolchain(step, format!("failed to run {}: {e}", program.display()))
        })?;

    if output.status.success() {
        return Ok(());
    }

    // MSVC reports diagnostics on stdout, GCC and Clang on stderr.
    let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        if !detail.is_empty() {
            detail.push('\n');
        }
        detail.push_str(stdout.trim());
    }
    if detail.is_empty() {
        detail = format!("{} exited with {}", program.display(), output.status);
    }
    Err(LuaBuildError::toolchain(step, detail))
}

fn prefixed(prefix: &str, path: &Path) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path.as_os_str());
    arg
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("?")
}

fn working_dir(output: &Path) -> &Path {
    output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}
