use indicatif::ProgressBar;
use std::time::Duration;

use crate::ui::{format_duration, Ui};

/// Plain mode prints a progress line every this many frames.
const PLAIN_PROGRESS_EVERY: u64 = 50;

impl Ui {
    /// Live frame counter for the detection loop.
    pub fn run_progress(&self, cap: Duration) -> RunProgress {
        let spinner = if self.use_pretty() {
            Some(self.spinner(format!("detecting (cap {})…", format_duration(cap))))
        } else {
            eprintln!("==> Detect violations (cap {})", format_duration(cap));
            None
        };
        RunProgress {
            spinner,
            frames: 0,
            violations: 0,
        }
    }
}

pub struct RunProgress {
    spinner: Option<ProgressBar>,
    frames: u64,
    violations: u64,
}

impl RunProgress {
    pub fn frame(&mut self, people: usize, violations: usize, elapsed: Duration) {
        self.frames += 1;
        self.violations += violations as u64;
        let line = format!(
            "frame {} · {} people · {} violations ({} total) · {}",
            self.frames,
            people,
            violations,
            self.violations,
            format_duration(elapsed)
        );
        match &self.spinner {
            Some(spinner) => spinner.set_message(line),
            None if self.frames % PLAIN_PROGRESS_EVERY == 0 => eprintln!("    {line}"),
            None => {}
        }
    }

    pub fn finish(self, summary: &str) {
        match self.spinner {
            Some(spinner) => spinner.finish_with_message(format!("✔ {summary}")),
            None => eprintln!("✔ {summary}"),
        }
    }
}
