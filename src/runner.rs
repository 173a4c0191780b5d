//! Job runner: directory lifecycle, the shared measurement pass, and the
//! sequential quantization queue.

use crate::controller::Controller;
use crate::errors::{AutoquantError, Result};
use crate::planner::JobSpec;
use crate::tool::{MeasureArgs, QuantTool, QuantizeArgs};
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the measurement artifact, in the job root and in every
/// output directory.
pub const MEASUREMENT_FILE: &str = "measurement.json";

/// Scratch directory used by the measurement pass.
pub const MEASUREMENT_SCRATCH_DIR: &str = "temp_measurement";

/// Directory layout of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub job_root: PathBuf,
    /// Shared measurement artifact, read by every job.
    pub measurement_path: PathBuf,
    pub measurement_scratch: PathBuf,
}

impl RunContext {
    pub fn new(job_root: impl Into<PathBuf>) -> Self {
        let job_root = job_root.into();
        Self {
            measurement_path: job_root.join(MEASUREMENT_FILE),
            measurement_scratch: job_root.join(MEASUREMENT_SCRATCH_DIR),
            job_root,
        }
    }

    /// `{base}/{model}_{HHMMSS}` for the given instant.
    pub fn at(base: &Path, model_name: &str, now: DateTime<Local>) -> Self {
        Self::new(base.join(format!("{}_{}", model_name, now.format("%H%M%S"))))
    }

    /// `{base}/{model}_{HHMMSS}` for the current local time.
    pub fn timestamped(base: &Path, model_name: &str) -> Self {
        Self::at(base, model_name, Local::now())
    }
}

/// Where the run's measurement artifact came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementSource {
    /// Copied from a precomputed file.
    Supplied(PathBuf),
    /// Produced by the tool's measurement pass.
    Computed,
}

/// Result of one job.
#[derive(Debug)]
pub struct JobOutcome {
    pub job: JobSpec,
    /// `None` on success.
    pub error: Option<AutoquantError>,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Summary of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub job_root: PathBuf,
    pub measurement: MeasurementSource,
    /// One entry per job, in execution order.
    pub outcomes: Vec<JobOutcome>,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(JobOutcome::is_success)
    }
}

/// Runs a planned job list against one [`RunContext`].
pub struct Runner<'a> {
    tool: &'a dyn QuantTool,
    controller: &'a dyn Controller,
}

impl<'a> Runner<'a> {
    pub fn new(tool: &'a dyn QuantTool, controller: &'a dyn Controller) -> Self {
        Self { tool, controller }
    }

    /// Execute a whole run.
    ///
    /// The measurement artifact is copied from `supplied` when that file
    /// exists, otherwise computed once by the tool. Jobs then run one at a
    /// time in the given order; a failing job is recorded in the report and
    /// the queue moves on. Progress is reported after every job.
    ///
    /// The shared artifact and measurement scratch directory are removed on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns [`AutoquantError::Input`] for an empty job list, and the
    /// measurement pass's error if it fails. Job failures are not errors of
    /// the run.
    pub fn run(&self, ctx: &RunContext, jobs: &[JobSpec], supplied: Option<&Path>) -> Result<RunReport> {
        let first = jobs.first().ok_or_else(|| AutoquantError::input("nothing to run"))?;
        let shared = &first.context;

        info!("starting run in {} ({} jobs)", ctx.job_root.display(), jobs.len());
        fs::create_dir_all(&ctx.job_root).map_err(AutoquantError::io("create job root", &ctx.job_root))?;
        let _cleanup = Cleanup(ctx);

        recreate_dir(&ctx.measurement_scratch)?;
        prepare_output_dirs(ctx, jobs);

        let measurement = self.measure(ctx, &shared.raw_weights_dir, &shared.device, supplied)?;
        self.controller.report_measurement(&measurement);

        let total = jobs.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, job) in jobs.iter().enumerate() {
            let error = self.quantize_one(ctx, job).err();
            if let Some(e) = &error {
                warn!("job {} failed: {e}", job.label());
                self.controller.report_job_failure(job, e);
            }
            outcomes.push(JobOutcome { job: job.clone(), error });
            self.controller.report_progress(idx + 1, total);
        }

        Ok(RunReport { job_root: ctx.job_root.clone(), measurement, outcomes })
    }

    fn measure(
        &self,
        ctx: &RunContext,
        weights_dir: &Path,
        device: &str,
        supplied: Option<&Path>,
    ) -> Result<MeasurementSource> {
        match supplied {
            Some(path) if path.is_file() => {
                if !same_file(path, &ctx.measurement_path) {
                    fs::copy(path, &ctx.measurement_path)
                        .map_err(AutoquantError::io("copy supplied measurement", path))?;
                }
                info!("using supplied measurement {}", path.display());
                Ok(MeasurementSource::Supplied(path.to_path_buf()))
            }
            other => {
                if let Some(path) = other {
                    warn!("measurement file {} is not a file, measuring instead", path.display());
                }
                self.tool.measure(&MeasureArgs {
                    weights_dir,
                    scratch_dir: &ctx.measurement_scratch,
                    measurement_out: &ctx.measurement_path,
                    device,
                })?;
                Ok(MeasurementSource::Computed)
            }
        }
    }

    fn quantize_one(&self, ctx: &RunContext, job: &JobSpec) -> Result<()> {
        let temp_dir = job.temp_dir(&ctx.job_root);
        let output_dir = job.output_dir(&ctx.job_root);

        recreate_dir(&temp_dir)?;
        let result = self.run_in_temp(ctx, job, &temp_dir, &output_dir);
        if result.is_err() {
            remove_dir_if_present(&temp_dir);
        }
        result?;

        fs::remove_dir_all(&temp_dir).map_err(AutoquantError::io("remove temp dir", &temp_dir))?;
        let target = output_dir.join(MEASUREMENT_FILE);
        fs::copy(&ctx.measurement_path, &target).map_err(AutoquantError::io("copy measurement", &target))?;

        debug!("job {} done: {}", job.label(), output_dir.display());
        Ok(())
    }

    /// Steps that run while the job's temp directory exists.
    fn run_in_temp(&self, ctx: &RunContext, job: &JobSpec, temp_dir: &Path, output_dir: &Path) -> Result<()> {
        recreate_dir(output_dir)?;
        self.tool.quantize(&QuantizeArgs {
            weights_dir: &job.context.raw_weights_dir,
            scratch_dir: temp_dir,
            measurement: &ctx.measurement_path,
            output_dir,
            bpw: &job.bpw,
            bits_per_head: &job.bits_per_head,
            device: &job.context.device,
        })
    }
}

/// Create every output directory up front so the expected results are
/// visible before the first job starts. Failures only warn.
fn prepare_output_dirs(ctx: &RunContext, jobs: &[JobSpec]) {
    for job in jobs {
        let dir = job.output_dir(&ctx.job_root);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("could not pre-create {}: {e}", dir.display());
        }
    }
}

/// Delete `dir` if present, then create it empty.
pub fn recreate_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(AutoquantError::io("remove directory", dir)(e)),
    }
    fs::create_dir_all(dir).map_err(AutoquantError::io("create directory", dir))
}

fn remove_dir_if_present(dir: &Path) {
    if let Err(e) = fs::remove_dir_all(dir) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!("could not remove {}: {e}", dir.display());
        }
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Removes the shared measurement artifact and its scratch directory when
/// the run ends, however it ends.
struct Cleanup<'a>(&'a RunContext);

impl Drop for Cleanup<'_> {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.0.measurement_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("could not remove {}: {e}", self.0.measurement_path.display());
            }
        }
        remove_dir_if_present(&self.0.measurement_scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_root_name() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap();
        let ctx = RunContext::at(Path::new("/work"), "Llama3", now);
        assert_eq!(ctx.job_root, Path::new("/work").join("Llama3_090507"));
        assert_eq!(ctx.measurement_path, ctx.job_root.join("measurement.json"));
        assert_eq!(ctx.measurement_scratch, ctx.job_root.join("temp_measurement"));
    }

    #[test]
    fn test_recreate_dir_empties_existing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out");
        fs::create_dir_all(target.join("nested")).unwrap();
        fs::write(target.join("stale.safetensors"), b"old").unwrap();

        recreate_dir(&target).unwrap();

        assert!(target.is_dir());
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
    }

    #[test]
    fn test_recreate_dir_creates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b");
        recreate_dir(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("measurement.json");
        fs::write(&file, b"{}").unwrap();
        assert!(same_file(&file, &dir.path().join(".").join("measurement.json")));
        assert!(!same_file(&file, &dir.path().join("missing.json")));
    }
}
