#![warn(clippy::pedantic)]

//! # luab
//!
//! Downloads a Lua source release, compiles it with the host's native
//! toolchain and installs the result.
//!
//! ## Examples
//!
//! Build and install Lua 5.4.6 under `./lua-5.4.6`:
//! ```bash
//! luab -d --lua 5.4.6
//! ```
//!
//! Re-download the archive and install under `/opt`:
//! ```bash
//! luab -d --lua 5.4.6 --force --prefix /opt
//! ```

mod progress;

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use luabuild::config::{
    DEFAULT_MIRROR, DEFAULT_WORK_DIR, MIRROR_ENV, PREFIX_ENV, WORK_DIR_ENV,
};
use luabuild::{BuildConfig, Fetcher, Pipeline, PipelineFailure, ReleaseVersion};
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use progress::DownloadProgress;

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("LUAB_GIT_COMMIT"),
    " ",
    env!("LUAB_TARGET"),
    ")"
);

/// Lua source release builder.
#[derive(Parser, Debug)]
#[command(
    name = "luab",
    version = VERSION,
    about = "Download, compile and install a Lua source release",
    after_help = "\
TOOLCHAIN RESOLUTION:
    Each tool is located using the following priority order:
    1. CC / LUABUILD_LINKER / AR environment variables (explicit override)
    2. System PATH (cl, link, lib for MSVC; cc, gcc, clang and ar otherwise)

    Versions below 5.2 are rejected before anything is downloaded."
)]
struct Cli {
    /// Enable download mode.
    #[arg(short = 'd', long = "download", requires = "lua")]
    download: bool,

    /// Lua version to fetch and build, e.g. 5.4.6.
    #[arg(
        short = 'l',
        long = "lua",
        value_name = "VERSION",
        requires = "download",
        value_parser = ReleaseVersion::parse
    )]
    lua: Option<ReleaseVersion>,

    /// Re-download the archive even if it already exists.
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Staging directory for archives and unpacked sources.
    #[arg(long, value_name = "DIR", env = WORK_DIR_ENV, default_value = DEFAULT_WORK_DIR)]
    work_dir: PathBuf,

    /// Directory under which lua-<version>/{bin,include,lib} is created.
    #[arg(long, value_name = "DIR", env = PREFIX_ENV, default_value = ".")]
    prefix: PathBuf,

    /// Base URL that release archives are downloaded from.
    #[arg(long, value_name = "URL", env = MIRROR_ENV, default_value = DEFAULT_MIRROR)]
    mirror: String,

    /// Treat size mismatches and failed artifact copies as fatal.
    #[arg(long)]
    strict: bool,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors and hide the progress bar.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

impl Cli {
    fn build_config(&self) -> BuildConfig {
        BuildConfig {
            work_dir: self.work_dir.clone(),
            prefix: self.prefix.clone(),
            mirror: self.mirror.clone(),
            force: self.force,
            strict: self.strict,
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        let exit_code = handle_error(&e);
        std::process::exit(exit_code);
    }
}

/// Prints the error and returns the exit code.
///
/// Pipeline failures already carry the stage and version, so they are
/// printed on one line without the cause chain.
fn handle_error(e: &anyhow::Error) -> i32 {
    if let Some(failure) = e.downcast_ref::<PipelineFailure>() {
        eprintln!("Error: {failure}");
        return 1;
    }
    eprintln!("Error: {e:?}");
    1
}

/// Initialize tracing with appropriate verbosity
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // clap guarantees --lua and --download appear together.
    let Some(version) = cli.lua.clone() else {
        println!("luab: Lua source release builder");
        println!();
        println!("Run 'luab -d --lua <VERSION>' to build a release.");
        println!("Run 'luab --help' for all options.");
        return Ok(());
    };

    let progress = DownloadProgress::new(cli.quiet);
    let fetcher = Fetcher::new()
        .context("Failed to set up the downloader")?
        .with_progress(progress.callback());
    let mut pipeline = Pipeline::new(cli.build_config(), fetcher);

    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current stage");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = pipeline.run(&version).await;
    progress.finish();
    let report = result?;

    println!(
        "Installed Lua {} to {}",
        report.version,
        report.install.root.display()
    );
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    if !report.install.is_complete() {
        for failure in &report.install.failures {
            println!("  not installed: {failure}");
        }
    }
    Ok(())
}
