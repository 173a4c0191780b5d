//! Presentation seam and single-slot background executor.
//!
//! A front end implements [`Controller`] to receive state changes and
//! progress; [`RunSlot`] runs at most one quantization run at a time on a
//! worker thread so the caller stays responsive.

use crate::config::Settings;
use crate::errors::{AutoquantError, Result};
use crate::options::OptionSet;
use crate::planner::{self, JobContext, JobSpec};
use crate::runner::{MeasurementSource, RunContext, RunReport, Runner};
use crate::tool::QuantTool;
use log::error;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Receives run state changes. Everything except progress is optional.
///
/// Calls made during a run arrive on the worker thread.
pub trait Controller: Send + Sync {
    /// A run was accepted; inputs should be locked.
    fn disable_inputs(&self) {}

    /// The run is over, whatever its outcome; inputs may be unlocked.
    fn enable_inputs(&self) {}

    /// `done` of `total` jobs have finished, successfully or not.
    fn report_progress(&self, done: usize, total: usize);

    fn report_measurement(&self, _source: &MeasurementSource) {}

    fn report_job_failure(&self, _job: &JobSpec, _error: &AutoquantError) {}

    fn report_finished(&self, _result: &Result<RunReport>) {}
}

/// Controller that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullController;

impl Controller for NullController {
    fn report_progress(&self, _done: usize, _total: usize) {}
}

/// Everything a run needs besides the tool.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Directory the timestamped job root is created in.
    pub base_dir: PathBuf,
    pub context: JobContext,
    pub bits_per_head: OptionSet,
    pub bpw: OptionSet,
    /// Precomputed measurement to reuse, if any.
    pub measurement: Option<PathBuf>,
}

impl RunRequest {
    /// Build a request from stored settings.
    ///
    /// # Errors
    ///
    /// Returns [`AutoquantError::Input`] if a selection holds a non-numeric
    /// value.
    pub fn from_settings(settings: &Settings, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let context = JobContext::new(settings.model_name.trim(), settings.raw_weights_dir.trim())
            .with_author(settings.author())
            .with_device(settings.cuda_device.trim());

        Ok(Self {
            base_dir: base_dir.into(),
            context,
            bits_per_head: OptionSet::parse(&settings.bits_per_head)?,
            bpw: OptionSet::parse(&settings.bpw_values)?,
            measurement: settings.measurement().map(Path::to_path_buf),
        })
    }

    /// Plan the request's jobs without touching the disk.
    pub fn plan(&self) -> Result<Vec<JobSpec>> {
        planner::plan(&self.bits_per_head, &self.bpw, self.context.clone())
    }
}

/// Executor that accepts one run at a time.
#[derive(Debug, Default, Clone)]
pub struct RunSlot {
    busy: Arc<AtomicBool>,
}

/// A run in flight.
#[derive(Debug)]
pub struct RunHandle {
    job_root: PathBuf,
    total_jobs: usize,
    thread: JoinHandle<Result<RunReport>>,
}

impl RunHandle {
    pub fn job_root(&self) -> &Path {
        &self.job_root
    }

    pub fn total_jobs(&self) -> usize {
        self.total_jobs
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the run to finish and return its report.
    pub fn join(self) -> Result<RunReport> {
        let job_root = self.job_root;
        self.thread.join().unwrap_or_else(|_| {
            Err(AutoquantError::Unexpected { path: job_root, reason: "run thread panicked".into() })
        })
    }
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Plan `request` and start it on a worker thread.
    ///
    /// Planning happens before anything else: an invalid request returns
    /// its [`AutoquantError::Input`] without touching the disk or the
    /// controller. Once accepted, `disable_inputs` is called here and
    /// `enable_inputs` on the worker when the run ends.
    ///
    /// # Errors
    ///
    /// [`AutoquantError::Busy`] if another run is in flight, planning
    /// errors, or a failure to spawn the worker.
    pub fn submit(
        &self,
        request: RunRequest,
        tool: Arc<dyn QuantTool>,
        controller: Arc<dyn Controller>,
    ) -> Result<RunHandle> {
        if self.busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_err() {
            return Err(AutoquantError::Busy);
        }

        let jobs = match request.plan() {
            Ok(jobs) => jobs,
            Err(e) => {
                self.busy.store(false, Ordering::Release);
                return Err(e);
            }
        };

        controller.disable_inputs();
        let guard = SlotGuard { busy: Arc::clone(&self.busy), controller: Arc::clone(&controller) };

        let ctx = RunContext::timestamped(&request.base_dir, &request.context.model_name);
        let job_root = ctx.job_root.clone();
        let total_jobs = jobs.len();
        let measurement = request.measurement;

        let thread = thread::Builder::new()
            .name("autoquant-run".into())
            .spawn(move || {
                let _guard = guard;
                let runner = Runner::new(tool.as_ref(), controller.as_ref());
                let result = runner.run(&ctx, &jobs, measurement.as_deref());
                if let Err(e) = &result {
                    error!("run in {} failed: {e}", ctx.job_root.display());
                }
                controller.report_finished(&result);
                result
            })
            .map_err(AutoquantError::io("spawn run thread", &job_root))?;

        Ok(RunHandle { job_root, total_jobs, thread })
    }
}

/// Frees the slot and re-enables inputs when a run ends, including by
/// panic or a failed spawn.
struct SlotGuard {
    busy: Arc<AtomicBool>,
    controller: Arc<dyn Controller>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.controller.enable_inputs();
        self.busy.store(false, Ordering::Release);
    }
}
