//! Terminal controller: a progress bar plus colored status lines.

use autoquant::{AutoquantError, Controller, JobSpec, MeasurementSource};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

pub struct ConsoleController {
    bar: ProgressBar,
}

impl ConsoleController {
    pub fn new(total_jobs: usize) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_length(total_jobs as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("🔧 Quantizing [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("█▉▊▋▌▍▎▏ "));
        }
        Self { bar }
    }

    /// Print above the bar without tearing it, or straight to stderr when
    /// the bar is not drawn.
    pub fn println(&self, msg: impl AsRef<str>) {
        if self.bar.is_hidden() {
            eprintln!("{}", msg.as_ref());
        } else {
            self.bar.println(msg.as_ref());
        }
    }
}

impl Controller for ConsoleController {
    fn disable_inputs(&self) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        self.bar.set_message("measuring...");
    }

    fn enable_inputs(&self) {
        self.bar.finish_and_clear();
    }

    fn report_progress(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
        self.bar.set_message("");
    }

    fn report_measurement(&self, source: &MeasurementSource) {
        match source {
            MeasurementSource::Supplied(path) => {
                self.println(format!("✓ Using measurement {}", path.display()));
            }
            MeasurementSource::Computed => {
                self.println("✓ Measurement complete");
            }
        }
    }

    fn report_job_failure(&self, job: &JobSpec, error: &AutoquantError) {
        self.println(format!("{} {}: {}", "✗".red().bold(), job.label(), error));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_bar_still_accepts_messages() {
        let console = ConsoleController::new(2);
        assert!(console.bar.is_hidden());
        console.println("📁 Job directory: /tmp/job");
        console.report_progress(1, 2);
        assert_eq!(console.bar.position(), 1);
    }
}
