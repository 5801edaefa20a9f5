//! Recording toolchain used by driver and pipeline tests.
//!
//! Every operation writes a small deterministic file where the real tool
//! would, so stages can be exercised against a synthetic filesystem.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use crate::errors::LuaBuildError;
use crate::toolchain::{Flavor, Toolchain};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Compile(PathBuf),
    LinkShared {
        objects: Vec<PathBuf>,
        output: PathBuf,
        import_lib: Option<PathBuf>,
    },
    LinkExecutable {
        objects: Vec<PathBuf>,
        output: PathBuf,
        libraries: Vec<PathBuf>,
    },
    ArchiveStatic {
        objects: Vec<PathBuf>,
        output: PathBuf,
    },
}

pub(crate) struct FakeToolchain {
    flavor: Flavor,
    pub(crate) include_dirs: Vec<PathBuf>,
    pub(crate) calls: RefCell<Vec<Call>>,
    fail_compiling: Option<String>,
}

impl FakeToolchain {
    pub(crate) fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            include_dirs: Vec::new(),
            calls: RefCell::new(Vec::new()),
            fail_compiling: None,
        }
    }

    /// Makes compiling the named source file fail.
    pub(crate) fn failing_on(mut self, source_name: &str) -> Self {
        self.fail_compiling = Some(source_name.to_string());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn write_listing(output: &Path, kind: &str, inputs: &[PathBuf]) -> Result<(), LuaBuildError> {
    let body = inputs.iter().map(|p| name_of(p)).collect::<Vec<_>>().join("\n");
    std::fs::write(output, format!("{kind}\n{body}\n"))
        .map_err(|e| LuaBuildError::toolchain(format!("{kind} {}", name_of(output)), e.to_string()))
}

impl Toolchain for FakeToolchain {
    fn flavor(&self) -> Flavor {
        self.flavor
    }

    fn add_include_dir(&mut self, dir: &Path) {
        self.include_dirs.push(dir.to_path_buf());
    }

    fn compile(
        &self,
        source: &Path,
        out_dir: &Path,
        _extra_args: &[String],
    ) -> Result<PathBuf, LuaBuildError> {
        self.calls.borrow_mut().push(Call::Compile(source.to_path_buf()));
        let name = name_of(source);
        if self.fail_compiling.as_deref() == Some(name.as_str()) {
            return Err(LuaBuildError::toolchain(
                format!("compile {name}"),
                "syntax error",
            ));
        }

        let mut object = out_dir.join(source.file_stem().unwrap_or_default());
        object.set_extension(self.flavor.object_extension());
        let source_text = std::fs::read(source)
            .map_err(|e| LuaBuildError::toolchain(format!("compile {name}"), e.to_string()))?;
        let mut contents = format!("object of {name}\n").into_bytes();
        contents.extend_from_slice(&source_text);
        std::fs::write(&object, contents)
            .map_err(|e| LuaBuildError::toolchain(format!("compile {name}"), e.to_string()))?;
        Ok(object)
    }

    fn link_shared(
        &self,
        objects: &[PathBuf],
        output: &Path,
        import_lib: Option<&Path>,
        _extra_args: &[String],
    ) -> Result<(), LuaBuildError> {
        self.calls.borrow_mut().push(Call::LinkShared {
            objects: objects.to_vec(),
            output: output.to_path_buf(),
            import_lib: import_lib.map(Path::to_path_buf),
        });
        write_listing(output, "shared", objects)?;
        if let Some(import_lib) = import_lib {
            write_listing(import_lib, "import", objects)?;
        }
        Ok(())
    }

    fn link_executable(
        &self,
        objects: &[PathBuf],
        output: &Path,
        libraries: &[PathBuf],
        _extra_args: &[String],
    ) -> Result<(), LuaBuildError> {
        self.calls.borrow_mut().push(Call::LinkExecutable {
            objects: objects.to_vec(),
            output: output.to_path_buf(),
            libraries: libraries.to_vec(),
        });
        let mut inputs = objects.to_vec();
        inputs.extend_from_slice(libraries);
        write_listing(output, "executable", &inputs)
    }

    fn archive_static(&self, objects: &[PathBuf], output: &Path) -> Result<(), LuaBuildError> {
        self.calls.borrow_mut().push(Call::ArchiveStatic {
            objects: objects.to_vec(),
            output: output.to_path_buf(),
        });
        write_listing(output, "static", objects)
    }
}

/// Writes a minimal Lua-shaped source tree: library sources, both entry
/// points, the public headers and an `include/` directory.
pub(crate) fn write_source_tree(tree: &Path) {
    let src = tree.join("src");
    std::fs::create_dir_all(&src).expect("create src");
    std::fs::create_dir_all(tree.join("include")).expect("create include");
    for (name, body) in [
        ("lapi.c", "/* api */"),
        ("lcode.c", "/* code */"),
        ("lauxlib.c", "/* aux */"),
        ("lua.c", "int main(void) { return 0; }"),
        ("luac.c", "int main(void) { return 1; }"),
        ("lua.h", "/* lua.h */"),
        ("luaconf.h", "/* luaconf.h */"),
        ("lualib.h", "/* lualib.h */"),
        ("lauxlib.h", "/* lauxlib.h */"),
        ("lua.hpp", "// lua.hpp"),
        ("Makefile", "all:"),
    ] {
        std::fs::write(src.join(name), body).expect("write source");
    }
}
