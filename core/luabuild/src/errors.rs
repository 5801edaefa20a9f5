//! Error types for the luabuild pipeline.
//!
//! Every stage returns [`LuaBuildError`]. Variants carry the file, step or
//! version involved so the message printed to the operator is self-contained.
//! [`IntegrityWarning`] is deliberately not an error: a size mismatch is
//! reported to the caller, which decides whether to stop.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Consolidated error type for pipeline operations.
#[derive(Debug, Error)]
pub enum LuaBuildError {
    /// The version string is not a dotted numeric identifier.
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion {
        /// The text that failed to parse.
        input: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The version is below the supported floor.
    #[error("Lua {version} is not supported (versions below 5.2 cannot be built)")]
    UnsupportedVersion {
        /// The rejected version.
        version: String,
    },

    /// Network or write failure while fetching an archive.
    #[error("failed to download {file}: {message}")]
    Transfer {
        /// The file being downloaded.
        file: String,
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The archive could not be unpacked.
    #[error("failed to extract {archive}: {message}")]
    Extraction {
        /// The archive being extracted.
        archive: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Stale-tree removal or legacy rename failed.
    #[error("layout error for {path}: {message}")]
    Layout {
        /// The directory involved.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// A compiler, linker or archiver invocation failed.
    #[error("toolchain step '{step}' failed: {detail}")]
    Toolchain {
        /// The failing source file or link step.
        step: String,
        /// Tool output or spawn error.
        detail: String,
    },

    /// An artifact could not be copied into the install tree.
    #[error("failed to install {artifact} to {destination}: {message}")]
    Install {
        /// The artifact being copied.
        artifact: String,
        /// Where it was going.
        destination: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Another run holds the lock for this version.
    #[error("another build of Lua {version} is running (lock held on {lock})")]
    Busy {
        /// The locked version.
        version: String,
        /// The lock file.
        lock: PathBuf,
    },

    /// The run was cancelled between stages.
    #[error("cancelled before {stage}")]
    Cancelled {
        /// The stage that was about to start.
        stage: String,
    },

    /// Filesystem error outside of a more specific stage error.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O operation that failed.
        message: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl LuaBuildError {
    /// Creates a new `InvalidVersion` error.
    #[must_use]
    pub fn invalid_version(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidVersion {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `UnsupportedVersion` error.
    #[must_use]
    pub fn unsupported_version(version: impl Into<String>) -> Self {
        Self::UnsupportedVersion {
            version: version.into(),
        }
    }

    /// Creates a new `Transfer` error.
    #[must_use]
    pub fn transfer(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transfer {
            file: file.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new `Transfer` error with a source error.
    #[must_use]
    pub fn transfer_with_source(
        file: impl Into<String>,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Transfer {
            file: file.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a new `Extraction` error.
    #[must_use]
    pub fn extraction(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Layout` error.
    #[must_use]
    pub fn layout(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Layout {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Toolchain` error.
    #[must_use]
    pub fn toolchain(step: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Toolchain {
            step: step.into(),
            detail: detail.into(),
        }
    }

    /// Creates a new `Install` error.
    #[must_use]
    pub fn install(
        artifact: impl Into<String>,
        destination: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Install {
            artifact: artifact.into(),
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Creates a new `Cancelled` error.
    #[must_use]
    pub fn cancelled(stage: impl fmt::Display) -> Self {
        Self::Cancelled {
            stage: stage.to_string(),
        }
    }

    /// Creates a new `Io` error from an I/O error with context.
    #[must_use]
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }
}

/// Downloaded size differs from the advertised `Content-Length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityWarning {
    /// Bytes advertised by the server.
    pub expected: u64,
    /// Bytes actually written.
    pub actual: u64,
}

impl IntegrityWarning {
    /// Returns true when fewer bytes arrived than were advertised.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.actual < self.expected
    }
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size mismatch: expected {} bytes, received {}",
            self.expected, self.actual
        )
    }
}
