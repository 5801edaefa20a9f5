//! Release archive fetching.
//!
//! Archives are streamed into a `<file>.part` marker next to the destination.
//! Only after the last chunk is flushed is the marker renamed to the final
//! name and [`ProgressEvent::Completed`] emitted, so the marker and the final
//! file never coexist once a transfer has been reported complete.
//!
//! ## Features
//!
//! - Streaming downloads with progress callbacks
//! - Automatic retry with exponential backoff (3 attempts by default) for
//!   connection failures and server errors; other HTTP errors fail at once
//! - Stale markers from interrupted runs are removed before a new transfer
//! - Size mismatches are surfaced as an [`IntegrityWarning`], not hidden

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::errors::{IntegrityWarning, LuaBuildError};
use crate::paths::partial_marker;

/// Progress event emitted during downloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Download has started.
    Started {
        /// The URL being downloaded.
        url: String,
        /// Advertised size in bytes, 0 if unknown.
        total: u64,
    },
    /// Download progress update.
    Progress {
        /// Bytes downloaded so far.
        downloaded: u64,
        /// Current download speed in bytes per second.
        speed: u64,
    },
    /// The file is complete and in its final location.
    Completed,
    /// Download failed with an error.
    Failed {
        /// Error description.
        error: String,
    },
}

/// Callback type for receiving progress updates during downloads.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Default number of download attempts.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between progress callback invocations in milliseconds.
const PROGRESS_CALLBACK_INTERVAL_MS: u128 = 100;

/// Result of a successful [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already existed and overwrite was not requested.
    Skipped {
        /// The existing file.
        path: PathBuf,
    },
    /// The file was transferred.
    Downloaded {
        /// The final file.
        path: PathBuf,
        /// Bytes written.
        bytes: u64,
        /// Set when the advertised size did not match what was written.
        warning: Option<IntegrityWarning>,
    },
}

impl FetchOutcome {
    /// Path of the archive on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Skipped { path } | Self::Downloaded { path, .. } => path,
        }
    }

    /// Integrity warning raised by the transfer, if any.
    #[must_use]
    pub fn warning(&self) -> Option<IntegrityWarning> {
        match self {
            Self::Skipped { .. } => None,
            Self::Downloaded { warning, .. } => *warning,
        }
    }
}

/// Streaming HTTP fetcher for release archives.
pub struct Fetcher {
    client: reqwest::Client,
    max_attempts: u32,
    base_delay: Duration,
    progress: Option<ProgressCallback>,
}

impl Fetcher {
    /// Creates a fetcher with the default client, timeout and retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, LuaBuildError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                LuaBuildError::transfer_with_source(
                    "http client",
                    "failed to create HTTP client",
                    Box::new(e),
                )
            })?;
        Ok(Self::with_client(client))
    }

    /// Creates a fetcher around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_attempts: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
            progress: None,
        }
    }

    /// Overrides the retry policy. `attempts` is clamped to at least one.
    #[must_use]
    pub fn with_retries(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = attempts.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Reports progress through the given callback.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(event);
        }
    }

    /// Downloads `url` into `dest_dir`, named after the last URL segment.
    ///
    /// If the destination exists and `overwrite` is false nothing is done and
    /// no request is issued. If `overwrite` is true the existing file is
    /// removed first.
    ///
    /// # Errors
    ///
    /// Returns [`LuaBuildError::Transfer`] if:
    /// - The URL has no file name
    /// - The existing file cannot be removed
    /// - The request fails after all retries or returns a non-success status
    /// - Writing or renaming the file fails
    pub async fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        overwrite: bool,
    ) -> Result<FetchOutcome, LuaBuildError> {
        let filename = url
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| LuaBuildError::transfer(url, "URL does not name a file"))?
            .to_string();
        let dest = dest_dir.join(&filename);

        if dest.exists() {
            if !overwrite {
                info!("{filename} already exists, skipping download");
                return Ok(FetchOutcome::Skipped { path: dest });
            }
            tokio::fs::remove_file(&dest).await.map_err(|e| {
                LuaBuildError::transfer_with_source(
                    &filename,
                    format!("failed to remove existing {}", dest.display()),
                    Box::new(e),
                )
            })?;
        }

        tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
            LuaBuildError::transfer_with_source(
                &filename,
                format!("failed to create directory {}", dest_dir.display()),
                Box::new(e),
            )
        })?;

        let marker = partial_marker(&dest);
        if marker.exists() {
            warn!("removing stale partial download {}", marker.display());
            let _ = tokio::fs::remove_file(&marker).await;
        }

        info!("Downloading {filename}");

        let mut last_error = None;
        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                let delay = calculate_retry_delay(self.base_delay, attempt - 1);
                info!(
                    "Retrying download (attempt {}/{})",
                    attempt + 1,
                    self.max_attempts
                );
                tokio::time::sleep(delay).await;
            }

            match self.transfer(url, &filename, &marker).await {
                Ok((bytes, warning)) => {
                    tokio::fs::rename(&marker, &dest).await.map_err(|e| {
                        LuaBuildError::transfer_with_source(
                            &filename,
                            format!(
                                "failed to rename {} to {}",
                                marker.display(),
                                dest.display()
                            ),
                            Box::new(e),
                        )
                    })?;
                    if let Some(warning) = warning {
                        warn!("{filename}: {warning}");
                    }
                    self.emit(ProgressEvent::Completed);
                    return Ok(FetchOutcome::Downloaded {
                        path: dest,
                        bytes,
                        warning,
                    });
                }
                Err(failure) => {
                    debug!("attempt {} for {filename} failed: {}", attempt + 1, failure.error);
                    let _ = tokio::fs::remove_file(&marker).await;
                    let retryable = failure.retryable;
                    last_error = Some(failure.error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            LuaBuildError::transfer(
                &filename,
                format!("download failed after {} attempts", self.max_attempts),
            )
        });
        self.emit(ProgressEvent::Failed {
            error: error.to_string(),
        });
        Err(error)
    }

    /// Performs one streaming transfer into `marker`.
    async fn transfer(
        &self,
        url: &str,
        filename: &str,
        marker: &Path,
    ) -> Result<(u64, Option<IntegrityWarning>), AttemptFailure> {
        let response = self.client.get(url).send().await.map_err(|e| {
            AttemptFailure::retryable(LuaBuildError::transfer_with_source(
                filename,
                format!("failed to connect to {url}"),
                Box::new(e),
            ))
        })?;

        let status = response.status();
        if !status.is_success() {
            let error = LuaBuildError::transfer(filename, format!("HTTP error {status}: {url}"));
            return Err(if is_transient(status) {
                AttemptFailure::retryable(error)
            } else {
                AttemptFailure::fatal(error)
            });
        }

        let total_size = response.content_length().unwrap_or(0);
        self.emit(ProgressEvent::Started {
            url: url.to_string(),
            total: total_size,
        });

        let mut file = tokio::fs::File::create(marker).await.map_err(|e| {
            AttemptFailure::fatal(LuaBuildError::transfer_with_source(
                filename,
                format!("failed to create {}", marker.display()),
                Box::new(e),
            ))
        })?;

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let start_time = Instant::now();
        let mut last_callback_time = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                AttemptFailure::retryable(LuaBuildError::transfer_with_source(
                    filename,
                    format!("failed to read from {url}"),
                    Box::new(e),
                ))
            })?;
            file.write_all(&chunk).await.map_err(|e| {
                AttemptFailure::fatal(LuaBuildError::transfer_with_source(
                    filename,
                    format!("failed to write {}", marker.display()),
                    Box::new(e),
                ))
            })?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_callback_time).as_millis() >= PROGRESS_CALLBACK_INTERVAL_MS {
                self.emit(ProgressEvent::Progress {
                    downloaded,
                    speed: bytes_per_second(downloaded, start_time),
                });
                last_callback_time = now;
            }
        }

        file.flush().await.map_err(|e| {
            AttemptFailure::fatal(LuaBuildError::transfer_with_source(
                filename,
                format!("failed to flush {}", marker.display()),
                Box::new(e),
            ))
        })?;
        drop(file);

        self.emit(ProgressEvent::Progress {
            downloaded,
            speed: bytes_per_second(downloaded, start_time),
        });

        let warning = (total_size != 0 && downloaded != total_size).then_some(IntegrityWarning {
            expected: total_size,
            actual: downloaded,
        });
        Ok((downloaded, warning))
    }
}

/// One failed attempt, and whether another attempt could succeed.
struct AttemptFailure {
    error: LuaBuildError,
    retryable: bool,
}

impl AttemptFailure {
    fn retryable(error: LuaBuildError) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    fn fatal(error: LuaBuildError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Server-side and rate-limit statuses; any other 4xx will not change on retry.
fn is_transient(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn bytes_per_second(downloaded: u64, start_time: Instant) -> u64 {
    let elapsed_secs = start_time.elapsed().as_secs_f64();
    if elapsed_secs > 0.0 {
        (downloaded as f64 / elapsed_secs) as u64
    } else {
        0
    }
}

/// Calculates the retry delay with exponential backoff and jitter.
///
/// The delay doubles with each attempt with +/- 25% jitter.
fn calculate_retry_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let base_delay = base_ms.saturating_mul(2u64.saturating_pow(attempt));
    let jitter_range = base_delay / 4;
    let jitter = rand::rng().random_range(0..=jitter_range * 2);
    Duration::from_millis(base_delay - jitter_range + jitter)
}
