//! End-to-end orchestration of fetch, extract, normalize, compile and install.
//!
//! A [`Pipeline`] runs the stages strictly in order for one version. Each
//! stage's postcondition is the next stage's precondition, so the first
//! failure ends the run in [`PipelineState::Failed`] with the stage that
//! failed. Cancellation is only observed between stages.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, warn};

use crate::archive;
use crate::config::BuildConfig;
use crate::download::{FetchOutcome, Fetcher};
use crate::errors::{IntegrityWarning, LuaBuildError};
use crate::install::{InstallReport, install};
use crate::layout;
use crate::lock::{LegacyTreeLock, VersionLock};
use crate::paths::{WorkPaths, install_tree, partial_marker};
use crate::toolchain::{ArtifactNames, CommandToolchain, Toolchain, build};
use crate::version::ReleaseVersion;

/// A pipeline stage, as named in failure messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Downloading the release archive.
    Fetching,
    /// Unpacking the archive into the work directory.
    Extracting,
    /// Renaming a legacy tree to its versioned name.
    Normalizing,
    /// Compiling and linking the artifacts.
    Compiling,
    /// Copying artifacts into the install tree.
    Installing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Fetching => "fetch",
            Self::Extracting => "extract",
            Self::Normalizing => "normalize",
            Self::Compiling => "compile",
            Self::Installing => "install",
        };
        f.write_str(name)
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing has run yet.
    Idle,
    /// The archive is being downloaded.
    Fetching,
    /// The archive is on disk, downloaded or reused.
    Fetched,
    /// The archive is being unpacked.
    Extracting,
    /// The archive is unpacked.
    Extracted,
    /// The source tree is being renamed to its versioned name.
    Normalizing,
    /// The toolchain is running.
    Compiling,
    /// Artifacts are being copied.
    Installing,
    /// Every stage succeeded.
    Done,
    /// Absorbing: the run stopped in this stage.
    Failed(Stage),
}

/// Summary of a successful run.
#[derive(Debug)]
pub struct PipelineReport {
    /// The version that was built.
    pub version: ReleaseVersion,
    /// The normalized source tree in the work directory.
    pub source_tree: PathBuf,
    /// Names of everything the toolchain produced.
    pub artifacts: ArtifactNames,
    /// Where the artifacts were copied.
    pub install: InstallReport,
    /// Size mismatches tolerated during the fetch.
    pub warnings: Vec<IntegrityWarning>,
}

/// A fatal failure, tagged with the stage and version it happened in.
#[derive(Debug, Error)]
#[error("{stage} failed for Lua {version}: {error}")]
pub struct PipelineFailure {
    /// The stage that failed.
    pub stage: Stage,
    /// The version being built.
    pub version: String,
    /// What went wrong.
    #[source]
    pub error: LuaBuildError,
}

type StageResult<T> = Result<T, (Stage, LuaBuildError)>;

/// Decides whether a size mismatch stops the run.
///
/// A shortfall is always fatal; an overrun only in strict mode. A tolerated
/// mismatch is handed back so it can be reported.
fn integrity_verdict(
    warning: Option<IntegrityWarning>,
    strict: bool,
    archive_name: &str,
) -> Result<Option<IntegrityWarning>, LuaBuildError> {
    match warning {
        Some(w) if strict || w.is_truncated() => {
            Err(LuaBuildError::transfer(archive_name, w.to_string()))
        }
        Some(w) => {
            warn!("{archive_name}: {w}");
            Ok(Some(w))
        }
        None => Ok(None),
    }
}

/// Applies [`integrity_verdict`] to a finished fetch, deleting the archive
/// when the mismatch is fatal so the next run downloads it again.
fn settle_fetch(
    outcome: &FetchOutcome,
    strict: bool,
    archive_name: &str,
) -> Result<Option<IntegrityWarning>, LuaBuildError> {
    integrity_verdict(outcome.warning(), strict, archive_name).inspect_err(|_| {
        layout::discard_archive(outcome.path());
    })
}

fn at(stage: Stage) -> impl FnOnce(LuaBuildError) -> (Stage, LuaBuildError) {
    move |error| (stage, error)
}

/// Runs the full pipeline for a single version.
pub struct Pipeline {
    config: BuildConfig,
    fetcher: Fetcher,
    toolchain: Option<Box<dyn Toolchain>>,
    cancel: Arc<AtomicBool>,
    state: PipelineState,
}

impl Pipeline {
    /// Creates a pipeline. The native toolchain is detected when the compile
    /// stage starts unless one is supplied with [`Pipeline::with_toolchain`].
    #[must_use]
    pub fn new(config: BuildConfig, fetcher: Fetcher) -> Self {
        Self {
            config,
            fetcher,
            toolchain: None,
            cancel: Arc::new(AtomicBool::new(false)),
            state: PipelineState::Idle,
        }
    }

    /// Uses the given toolchain instead of detecting one.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Flag that, once set, stops the run at the next stage boundary.
    #[must_use]
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Current position in the state machine.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Settings this pipeline runs with.
    #[must_use]
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Fetches, extracts, normalizes, compiles and installs `version`.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineFailure`] naming the stage that failed. The state
    /// is left at [`PipelineState::Failed`] with the same stage.
    pub async fn run(&mut self, version: &ReleaseVersion) -> Result<PipelineReport, PipelineFailure> {
        match self.run_stages(version).await {
            Ok(report) => {
                self.enter(PipelineState::Done);
                info!(
                    "Lua {version} installed to {}",
                    report.install.root.display()
                );
                Ok(report)
            }
            Err((stage, error)) => {
                self.state = PipelineState::Failed(stage);
                error!("{stage} failed for Lua {version}: {error}");
                Err(PipelineFailure {
                    stage,
                    version: version.to_string(),
                    error,
                })
            }
        }
    }

    async fn run_stages(&mut self, version: &ReleaseVersion) -> StageResult<PipelineReport> {
        // Nothing is downloaded or created for a version that cannot be built.
        version.ensure_supported().map_err(at(Stage::Compiling))?;

        let paths = WorkPaths::new(&self.config.work_dir);
        paths.ensure_root().map_err(at(Stage::Fetching))?;
        let _lock = VersionLock::acquire(version, &paths).map_err(at(Stage::Fetching))?;

        let archive_path = paths.archive(version);
        let warnings = self.fetch_stage(version, &paths).await?;

        self.checkpoint(Stage::Extracting)?;
        self.enter(PipelineState::Extracting);
        let marker = partial_marker(&archive_path);
        if marker.exists() {
            return Err((
                Stage::Extracting,
                LuaBuildError::transfer(
                    version.archive_name(),
                    format!("partial download marker {} is still present", marker.display()),
                ),
            ));
        }
        // Held until the unversioned tree, if any, has been renamed away.
        let legacy_lock = LegacyTreeLock::acquire(&paths).map_err(at(Stage::Extracting))?;
        layout::remove_stale(version, &paths).map_err(at(Stage::Extracting))?;
        archive::extract(&archive_path, &paths.root).map_err(at(Stage::Extracting))?;
        self.enter(PipelineState::Extracted);

        self.checkpoint(Stage::Normalizing)?;
        self.enter(PipelineState::Normalizing);
        let source_tree = layout::normalize(version, &paths).map_err(at(Stage::Normalizing))?;
        drop(legacy_lock);

        self.checkpoint(Stage::Compiling)?;
        self.enter(PipelineState::Compiling);
        layout::discard_archive(&archive_path);
        let toolchain: Box<dyn Toolchain> = match self.toolchain.take() {
            Some(toolchain) => toolchain,
            None => Box::new(CommandToolchain::detect().map_err(at(Stage::Compiling))?),
        };
        let toolchain = self.toolchain.insert(toolchain);
        let artifacts = build(version, &source_tree, &mut **toolchain).map_err(at(Stage::Compiling))?;

        self.checkpoint(Stage::Installing)?;
        self.enter(PipelineState::Installing);
        let mut report = install(&artifacts, &install_tree(&self.config.prefix, version));
        if self.config.strict && !report.failures.is_empty() {
            return Err((Stage::Installing, report.failures.swap_remove(0)));
        }
        if !report.is_complete() {
            warn!(
                "{} artifact(s) could not be installed to {}",
                report.failures.len(),
                report.root.display()
            );
        }

        Ok(PipelineReport {
            version: version.clone(),
            source_tree,
            artifacts: artifacts.names,
            install: report,
            warnings,
        })
    }

    /// Downloads the archive unless it is already present and `force` is off.
    ///
    /// A transfer that delivered fewer bytes than advertised always stops the
    /// run; any other mismatch only does so in strict mode.
    async fn fetch_stage(
        &mut self,
        version: &ReleaseVersion,
        paths: &WorkPaths,
    ) -> StageResult<Vec<IntegrityWarning>> {
        let archive_path = paths.archive(version);
        let mut warnings = Vec::new();

        if archive_path.exists() && !self.config.force {
            info!("Using existing {}", archive_path.display());
            self.enter(PipelineState::Fetched);
            return Ok(warnings);
        }

        self.checkpoint(Stage::Fetching)?;
        self.enter(PipelineState::Fetching);
        let url = self.config.archive_url(&version.archive_name());
        let outcome = self
            .fetcher
            .fetch(&url, &paths.root, self.config.force)
            .await
            .map_err(at(Stage::Fetching))?;

        let tolerated = settle_fetch(&outcome, self.config.strict, &version.archive_name())
            .map_err(at(Stage::Fetching))?;
        warnings.extend(tolerated);

        self.enter(PipelineState::Fetched);
        Ok(warnings)
    }

    fn checkpoint(&self, next: Stage) -> StageResult<()> {
        if self.cancel.load(Ordering::SeqCst) {
            return Err((next, LuaBuildError::cancelled(next)));
        }
        Ok(())
    }

    fn enter(&mut self, state: PipelineState) {
        info!("{:?} -> {:?}", self.state, state);
        self.state = state;
    }
}
