#![warn(clippy::pedantic)]
//! Fetch, unpack, compile and install pipeline for Lua source releases.
//!
//! Given a release version such as `5.4.6`, this crate downloads
//! `lua-5.4.6.tar.gz` from a mirror, unpacks it into a work directory,
//! normalizes the source tree name, compiles the shared library, static
//! library and both executables with the host's native toolchain, and copies
//! the results into `<prefix>/lua-5.4.6/{bin,include,lib}`.
//!
//! ## Overview
//!
//! ```text
//! fetch → extract → normalize → compile → install
//! ```
//!
//! Every stage is available as a standalone function; [`Pipeline`] chains them,
//! holds the per-version lock and records which stage failed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use luabuild::{BuildConfig, Fetcher, Pipeline, ReleaseVersion};
//!
//! async fn build_lua() -> Result<(), Box<dyn std::error::Error>> {
//!     let version: ReleaseVersion = "5.4.6".parse()?;
//!     let mut pipeline = Pipeline::new(BuildConfig::default(), Fetcher::new()?);
//!     let report = pipeline.run(&version).await?;
//!     println!("installed to {}", report.install.root.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Toolchains
//!
//! Compilation goes through the [`Toolchain`] trait. [`CommandToolchain`]
//! drives MSVC (`cl`/`link`/`lib`) or a GNU-like compiler plus `ar`, chosen
//! from the compilation target. Versions below 5.2 are rejected before any
//! download or filesystem change.

pub mod archive;
pub mod config;
pub mod download;
pub mod errors;
pub mod install;
pub mod layout;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod toolchain;
pub mod version;

pub use config::BuildConfig;
pub use download::{FetchOutcome, Fetcher, ProgressCallback, ProgressEvent};
pub use errors::{IntegrityWarning, LuaBuildError};
pub use install::InstallReport;
pub use pipeline::{Pipeline, PipelineFailure, PipelineReport, PipelineState, Stage};
pub use toolchain::{ArtifactNames, BuildArtifacts, CommandToolchain, Flavor, Toolchain};
pub use version::ReleaseVersion;
