//! Lua release version identifiers.
//!
//! Release archives are named after the dotted version exactly as published
//! (`lua-5.4.6.tar.gz`, `lua-5.0.tar.gz`), so the original text is kept next
//! to a numeric [`semver::Version`] used for support-range checks.

use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::errors::LuaBuildError;

/// Oldest release series the toolchain driver can build.
const MIN_SUPPORTED: Version = Version::new(5, 2, 0);

/// A dotted `major.minor[.patch]` Lua release version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReleaseVersion {
    raw: String,
    numeric: Version,
}

impl ReleaseVersion {
    /// Parses a dotted version identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::InvalidVersion`] if the text has fewer than two
    /// or more than three components, or any component is not a decimal number.
    pub fn parse(input: &str) -> Result<Self, LuaBuildError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Err(LuaBuildError::invalid_version(input, "version is empty"));
        }

        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(LuaBuildError::invalid_version(
                input,
                "expected major.minor or major.minor.patch",
            ));
        }

        let mut numbers = [0u64; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(LuaBuildError::invalid_version(
                    input,
                    format!("component '{part}' is not a number"),
                ));
            }
            *slot = part
                .parse()
                .map_err(|_| LuaBuildError::invalid_version(input, "component out of range"))?;
        }

        Ok(Self {
            raw: raw.to_string(),
            numeric: Version::new(numbers[0], numbers[1], numbers[2]),
        })
    }

    /// The version exactly as written, e.g. `5.4.6`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Numeric form with a missing patch treated as 0.
    #[must_use]
    pub fn numeric(&self) -> &Version {
        &self.numeric
    }

    /// Two-character tag used in artifact names (`5.4.6` becomes `54`).
    #[must_use]
    pub fn stripped_tag(&self) -> String {
        self.raw.replace('.', "").chars().take(2).collect()
    }

    /// Returns whether this release can be built.
    ///
    /// Everything up to and including the 5.1 series is rejected.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.numeric >= MIN_SUPPORTED
    }

    /// Fails with [`LuaBuildError::UnsupportedVersion`] for unsupported releases.
    ///
    /// # Errors
    ///
    /// Returns an error when [`is_supported`](Self::is_supported) is false.
    pub fn ensure_supported(&self) -> Result<(), LuaBuildError> {
        if self.is_supported() {
            Ok(())
        } else {
            Err(LuaBuildError::unsupported_version(self.as_str()))
        }
    }

    /// Canonical source tree directory name, `lua-<version>`.
    #[must_use]
    pub fn tree_name(&self) -> String {
        format!("lua-{}", self.raw)
    }

    /// Release archive file name, `lua-<version>.tar.gz`.
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("lua-{}.tar.gz", self.raw)
    }
}

impl FromStr for ReleaseVersion {
    type Err = LuaBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_three_components() {
        let v = ReleaseVersion::parse("5.4.6").expect("valid version");
        assert_eq!(v.as_str(), "5.4.6");
        assert_eq!(v.numeric(), &Version::new(5, 4, 6));
    }

    #[test]
    fn patch_is_optional() {
        let v = ReleaseVersion::parse("5.3").expect("valid version");
        assert_eq!(v.numeric(), &Version::new(5, 3, 0));
        assert_eq!(v.archive_name(), "lua-5.3.tar.gz");
    }

    #[test]
    fn rejects_malformed_input() {
        for input in ["", "5", "5.4.6.1", "5..4", "5.x", "v5.4", "5.4-rc1"] {
            assert!(
                matches!(
                    ReleaseVersion::parse(input),
                    Err(LuaBuildError::InvalidVersion { .. })
                ),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn stripped_tag_uses_major_and_minor() {
        let v: ReleaseVersion = "5.4.6".parse().expect("valid version");
        assert_eq!(v.stripped_tag(), "54");
        let v: ReleaseVersion = "5.2.0".parse().expect("valid version");
        assert_eq!(v.stripped_tag(), "52");
    }

    #[test]
    fn support_floor_is_five_two() {
        let supported = ["5.2.0", "5.3.6", "5.4.6", "6.0"];
        let unsupported = ["5.1.5", "5.1", "5.0.3", "4.0"];

        for v in supported {
            assert!(ReleaseVersion::parse(v).expect("valid").is_supported(), "{v}");
        }
        for v in unsupported {
            let v = ReleaseVersion::parse(v).expect("valid");
            assert!(!v.is_supported(), "{v}");
            assert!(matches!(
                v.ensure_supported(),
                Err(LuaBuildError::UnsupportedVersion { .. })
            ));
        }
    }

    #[test]
    fn derived_names() {
        let v = ReleaseVersion::parse("5.4.6").expect("valid version");
        assert_eq!(v.tree_name(), "lua-5.4.6");
        assert_eq!(v.archive_name(), "lua-5.4.6.tar.gz");
        assert_eq!(v.to_string(), "5.4.6");
    }
}
