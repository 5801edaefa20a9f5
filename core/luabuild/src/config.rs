//! Pipeline configuration.
//!
//! A [`BuildConfig`] value is passed to every stage explicitly; there is no
//! process-wide state. The binary fills it from command line flags, each of
//! which falls back to the environment variable named here.

use std::path::PathBuf;

/// Environment variable overriding the staging directory.
pub const WORK_DIR_ENV: &str = "LUABUILD_WORK_DIR";

/// Environment variable overriding the install root.
pub const PREFIX_ENV: &str = "LUABUILD_PREFIX";

/// Environment variable overriding the release download location.
pub const MIRROR_ENV: &str = "LUABUILD_MIRROR";

/// Default staging directory, relative to the current directory.
pub const DEFAULT_WORK_DIR: &str = "downloads";

/// Default release download location.
pub const DEFAULT_MIRROR: &str = "https://www.lua.org/ftp";

/// Settings for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildConfig {
    /// Staging directory for archives and unpacked sources.
    pub work_dir: PathBuf,
    /// Directory under which `lua-<version>/{bin,include,lib}` is created.
    pub prefix: PathBuf,
    /// Base URL that release archives are fetched from.
    pub mirror: String,
    /// Re-download the archive even if it is already present.
    pub force: bool,
    /// Treat size mismatches and failed artifact copies as fatal.
    pub strict: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            prefix: PathBuf::from("."),
            mirror: DEFAULT_MIRROR.to_string(),
            force: false,
            strict: false,
        }
    }
}

impl BuildConfig {
    /// Full URL of a release archive on the configured mirror.
    #[must_use]
    pub fn archive_url(&self, archive_name: &str) -> String {
        format!("{}/{archive_name}", self.mirror.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_layout() {
        let config = BuildConfig::default();
        assert_eq!(config.work_dir, PathBuf::from("downloads"));
        assert_eq!(config.prefix, PathBuf::from("."));
        assert!(!config.force);
        assert!(!config.strict);
    }

    #[test]
    fn archive_url_joins_without_double_slash() {
        let config = BuildConfig {
            mirror: "https://mirror.example.org/lua/".to_string(),
            ..BuildConfig::default()
        };
        assert_eq!(
            config.archive_url("lua-5.4.6.tar.gz"),
            "https://mirror.example.org/lua/lua-5.4.6.tar.gz"
        );
        assert_eq!(
            BuildConfig::default().archive_url("lua-5.4.6.tar.gz"),
            "https://www.lua.org/ftp/lua-5.4.6.tar.gz"
        );
    }
}
