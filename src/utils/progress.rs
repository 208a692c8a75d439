//! Progress indicators
//!
//! Thin wrappers over [`indicatif`] giving every yakka operation the same look.
//! Bars are hidden when `YAKKA_NO_PROGRESS` is set or when the CLI was started
//! with `--no-progress`.
//!
//! ```rust,no_run
//! use yakka_cli::utils::progress::ProgressBar;
//!
//! let progress = ProgressBar::new(10, true);
//! progress.set_message("Building");
//! progress.inc(1);
//! progress.finish_with_message("Done");
//! ```

use indicatif::{
    MultiProgress as IndicatifMulti, ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle,
};
use std::time::Duration;

use crate::constants::NO_PROGRESS_ENV;

/// True when `YAKKA_NO_PROGRESS` is set.
pub fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// A progress bar or spinner. Hidden bars accept every call and draw nothing.
#[derive(Clone, Debug)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// A bar for `len` units of work.
    pub fn new(len: u64, enabled: bool) -> Self {
        let bar = if enabled && !is_progress_disabled() {
            let bar = IndicatifBar::new(len);
            bar.set_style(bar_style());
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner: bar,
        }
    }

    /// A spinner for work of unknown size.
    pub fn new_spinner(enabled: bool) -> Self {
        let bar = if enabled && !is_progress_disabled() {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        } else {
            IndicatifBar::hidden()
        };
        Self {
            inner: bar,
        }
    }

    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
        }
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    pub fn inc(&self, delta: u64) {
        self.inner.inc(delta);
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Print a line above the bar without corrupting it.
    pub fn println(&self, line: impl AsRef<str>) {
        if self.inner.is_hidden() {
            println!("{}", line.as_ref());
        } else {
            self.inner.println(line.as_ref());
        }
    }
}

/// Several bars drawn together, one per concurrent operation.
#[derive(Clone, Debug)]
pub struct MultiProgress {
    inner: IndicatifMulti,
    enabled: bool,
}

impl MultiProgress {
    pub fn new(enabled: bool) -> Self {
        Self {
            inner: IndicatifMulti::new(),
            enabled: enabled && !is_progress_disabled(),
        }
    }

    /// Add a percentage bar labelled with `prefix`.
    pub fn add_percent_bar(&self, prefix: impl Into<String>) -> ProgressBar {
        if !self.enabled {
            return ProgressBar::hidden();
        }
        let bar = self.inner.add(IndicatifBar::new(100));
        bar.set_style(percent_style());
        bar.set_prefix(prefix.into());
        ProgressBar {
            inner: bar,
        }
    }
}

fn bar_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("#>-")
}

fn percent_style() -> IndicatifStyle {
    IndicatifStyle::default_bar()
        .template("{prefix:>20.bold} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_bar())
        .progress_chars("#>-")
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_bars_are_hidden() {
        let bar = ProgressBar::new(10, false);
        bar.inc(3);
        bar.set_message("working");
        bar.finish_and_clear();
        assert!(bar.inner.is_hidden());

        let multi = MultiProgress::new(false);
        assert!(multi.add_percent_bar("lwip").inner.is_hidden());
    }

    #[test]
    fn test_position_tracking() {
        let bar = ProgressBar::new(10, false);
        bar.set_position(4);
        bar.inc(2);
        assert_eq!(bar.inner.position(), 6);
    }
}
