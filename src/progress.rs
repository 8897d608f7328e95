//! Progress bars for long-running batches.

use importkit::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str = "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// A progress bar sized for `total` items; hidden when `quiet`
pub fn bar(total: usize, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    let style = ProgressStyle::with_template(BAR_TEMPLATE)
        .map(|s| s.progress_chars("=>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Drives a [`ProgressBar`] from engine progress callbacks
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// `bar` is shared; keep a clone to finish it afterwards
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&mut self, completed: usize, total: usize, current: &str) {
        self.bar.set_length(total as u64);
        self.bar.set_position(completed as u64);
        self.bar.set_message(current.to_string());
    }
}
