//! Terminal progress display for archive downloads.

use std::sync::Arc;

use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use luabuild::{ProgressCallback, ProgressEvent};

/// Progress bar fed by the fetcher's [`ProgressEvent`]s.
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    /// Creates the bar. A hidden bar swallows every update.
    pub fn new(hidden: bool) -> Self {
        let bar = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        Self { bar }
    }

    /// Callback to hand to [`luabuild::Fetcher::with_progress`].
    pub fn callback(&self) -> ProgressCallback {
        let bar = self.bar.clone();
        Arc::new(move |event| apply(&bar, event))
    }

    /// Clears a bar that never reached a terminal event, e.g. when the
    /// archive was already present.
    pub fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    )
    .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"))
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.blue} {bytes} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn apply(bar: &ProgressBar, event: ProgressEvent) {
    match event {
        ProgressEvent::Started { url, total } => {
            // Retries start over from zero.
            bar.reset();
            if total > 0 {
                bar.set_style(bar_style());
                bar.set_length(total);
            } else {
                bar.set_style(spinner_style());
                bar.unset_length();
            }
            bar.set_message(url);
        }
        ProgressEvent::Progress { downloaded, speed } => {
            bar.set_position(downloaded);
            bar.set_message(format!("{}/s", HumanBytes(speed)));
        }
        ProgressEvent::Completed => bar.finish_with_message("done"),
        ProgressEvent::Failed { error } => bar.abandon_with_message(error),
    }
}
