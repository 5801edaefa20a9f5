//! Locating the native compiler, linker and archiver.
//!
//! Each tool is resolved in priority order:
//!
//! 1. Explicit override via environment variable (`CC`, `LUABUILD_LINKER`, `AR`)
//! 2. System PATH via `which::which` over the flavor's candidate names
//!
//! MSVC tools are only on PATH inside a developer command prompt (after
//! `vcvarsall.bat`), so the not-found error says so.

use std::path::PathBuf;

use crate::errors::LuaBuildError;
use crate::toolchain::Flavor;

/// Environment variable overriding the C compiler.
pub const CC_ENV: &str = "CC";

/// Environment variable overriding the linker.
pub const LINKER_ENV: &str = "LUABUILD_LINKER";

/// Environment variable overriding the static archiver.
pub const AR_ENV: &str = "AR";

/// Resolved tool paths for one flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// C compiler.
    pub compiler: PathBuf,
    /// Linker driver.
    pub linker: PathBuf,
    /// Static archiver.
    pub archiver: PathBuf,
}

/// Candidate executable names per role.
fn candidates(flavor: Flavor) -> (&'static [&'static str], &'static [&'static str], &'static [&'static str]) {
    match flavor {
        Flavor::Msvc => (&["cl"], &["link"], &["lib"]),
        Flavor::MinGw | Flavor::Unix => (
            &["cc", "gcc", "clang"],
            &["cc", "gcc", "clang"],
            &["ar", "gcc-ar", "llvm-ar"],
        ),
        Flavor::MacOs => (&["cc", "clang"], &["cc", "clang"], &["ar", "llvm-ar"]),
    }
}

/// Resolves all three tools for a flavor.
///
/// For GNU-like flavors the linker defaults to the resolved compiler, which
/// drives the system linker itself.
///
/// # Errors
///
/// Returns [`LuaBuildError::Toolchain`] if an override points at a missing
/// binary or no candidate is found on PATH.
pub fn resolve_tools(flavor: Flavor) -> Result<ToolPaths, LuaBuildError> {
    let (compilers, linkers, archivers) = candidates(flavor);

    let compiler = resolve_tool("compiler", CC_ENV, compilers, flavor)?;
    let linker = if flavor == Flavor::Msvc || std::env::var_os(LINKER_ENV).is_some() {
        resolve_tool("linker", LINKER_ENV, linkers, flavor)?
    } else {
        compiler.clone()
    };
    let archiver = resolve_tool("archiver", AR_ENV, archivers, flavor)?;

    Ok(ToolPaths {
        compiler,
        linker,
        archiver,
    })
}

/// Resolves one tool from its override variable or candidate names.
fn resolve_tool(
    role: &str,
    env_var: &str,
    names: &[&str],
    flavor: Flavor,
) -> Result<PathBuf, LuaBuildError> {
    // Priority 1: explicit override
    if let Ok(value) = std::env::var(env_var)
        && !value.trim().is_empty()
    {
        return which::which(value.trim()).map_err(|_| {
            LuaBuildError::toolchain(
                format!("resolve {role}"),
                format!("{env_var} is set to '{value}', but no such executable exists"),
            )
        });
    }

    // Priority 2: system PATH
    if let Some(path) = names.iter().find_map(|name| which::which(name).ok()) {
        return Ok(path);
    }

    let hint = if flavor == Flavor::Msvc {
        " (run from a Visual Studio developer command prompt)"
    } else {
        ""
    };
    Err(LuaBuildError::toolchain(
        format!("resolve {role}"),
        format!(
            "none of {} found on PATH{hint}; set {env_var} to override",
            names.join(", ")
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn msvc_candidates_are_the_visual_studio_tools() {
        let (c, l, a) = candidates(Flavor::Msvc);
        assert_eq!((c, l, a), (&["cl"][..], &["link"][..], &["lib"][..]));
    }

    #[test]
    fn unknown_candidates_report_every_name() {
        let err = resolve_tool(
            "archiver",
            "LUABUILD_TEST_UNSET_VARIABLE",
            &["definitely-not-a-real-tool-1", "definitely-not-a-real-tool-2"],
            Flavor::Unix,
        )
        .expect_err("nothing should resolve");

        let message = err.to_string();
        assert!(message.contains("definitely-not-a-real-tool-1"));
        assert!(message.contains("definitely-not-a-real-tool-2"));
        assert!(message.contains("LUABUILD_TEST_UNSET_VARIABLE"));
    }

    #[test]
    fn msvc_hint_mentions_developer_prompt() {
        let err = resolve_tool(
            "compiler",
            "LUABUILD_TEST_UNSET_VARIABLE",
            &["definitely-not-cl"],
            Flavor::Msvc,
        )
        .expect_err("nothing should resolve");
        assert!(err.to_string().contains("developer command prompt"));
    }
}
