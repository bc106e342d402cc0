//! Component H — Progress Reporter.
//!
//! A bounded, cancellable reporter backing the non-MP4 render paths. MP4 has
//! no fixed total (the loop exits on reveal-state exhaustion, not a known
//! page count) and is reported indeterminately.

use indicatif::{ProgressBar, ProgressStyle};

/// Wraps an `indicatif` bar, ticking every 200ms. `total = None` renders a
/// spinner; `Some(n)` renders a bar sized to `n` steps.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new(total: Option<u64>) -> Self {
        let bar = match total {
            Some(n) => ProgressBar::new(n),
            None => ProgressBar::new_spinner(),
        };
        let style = match total {
            Some(_) => ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
            None => ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        };
        bar.set_style(style);
        bar.enable_steady_tick(std::time::Duration::from_millis(200));
        Self { bar }
    }

    pub fn indeterminate() -> Self {
        Self::new(None)
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn determinate_reporter_tracks_total() {
        let reporter = ProgressReporter::new(Some(3));
        reporter.inc(1);
        reporter.inc(1);
        assert_eq!(reporter.bar.position(), 2);
        reporter.finish();
    }

    #[test]
    fn indeterminate_reporter_has_no_length() {
        let reporter = ProgressReporter::indeterminate();
        assert_eq!(reporter.bar.length(), None);
        reporter.finish();
    }
}
