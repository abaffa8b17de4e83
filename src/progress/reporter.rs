//! Progress reporter implementation
//!
//! A single indicatif byte bar that tracks the patch phase: how far the
//! source scan has advanced and how many patch frames have gone out. The
//! driver renders nothing in quiet mode via the `disabled` constructor.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};

/// Progress reporter for a transfer
pub struct ProgressReporter {
    /// Bytes bar for the source scan
    bar: ProgressBar,
    /// Patch frames emitted so far
    patches: AtomicU64,
}

impl ProgressReporter {
    /// Create a new progress reporter drawing to stderr
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}",
                )
                .expect("Invalid template")
                .progress_chars("=> "),
        );
        bar.set_prefix("Scan");

        Self {
            bar,
            patches: AtomicU64::new(0),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.bar.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Set total bytes to scan
    pub fn set_total_bytes(&self, total: u64) {
        self.bar.set_length(total);
    }

    /// Advance the scan position
    pub fn inc_bytes(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    /// Record an emitted patch frame
    pub fn inc_patches(&self) {
        let n = self.patches.fetch_add(1, Ordering::Relaxed) + 1;
        self.bar.set_message(format!("{} patches", n));
    }

    /// Patch frames emitted so far
    pub fn patches(&self) -> u64 {
        self.patches.load(Ordering::Relaxed)
    }

    /// Finish the bar with a success message
    pub fn finish_success(&self) {
        self.bar
            .finish_with_message(format!("{} patches", self.patches()));
    }

    /// Abandon the bar after an error
    pub fn finish_error(&self) {
        self.bar.abandon();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
