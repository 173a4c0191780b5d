//! Job planning: expand two option sets into an ordered list of jobs.

use crate::errors::{AutoquantError, Result};
use crate::options::OptionSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Context shared by every job of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub model_name: String,
    pub raw_weights_dir: PathBuf,
    /// Output-name prefix; `None` when no author is configured.
    pub author: Option<String>,
    /// Value exported as `CUDA_VISIBLE_DEVICES` for each invocation.
    pub device: String,
}

impl JobContext {
    pub fn new(model_name: impl Into<String>, raw_weights_dir: impl Into<PathBuf>) -> Self {
        Self {
            model_name: model_name.into(),
            raw_weights_dir: raw_weights_dir.into(),
            author: None,
            device: "0".to_string(),
        }
    }

    /// Blank or whitespace-only authors count as no author.
    pub fn with_author(mut self, author: Option<&str>) -> Self {
        self.author = author
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    fn validate(&self) -> Result<()> {
        let model = self.model_name.trim();
        if model.is_empty() {
            return Err(AutoquantError::input("model name must not be empty"));
        }
        if model.contains(['/', '\\']) || model == "." || model == ".." {
            return Err(AutoquantError::input(format!(
                "model name '{model}' cannot be used as a directory name"
            )));
        }
        if self.raw_weights_dir.as_os_str().is_empty() {
            return Err(AutoquantError::input("raw weights directory must not be empty"));
        }
        if let Some(author) = &self.author {
            if author.contains(['/', '\\']) {
                return Err(AutoquantError::input(format!(
                    "author name '{author}' cannot be used in a directory name"
                )));
            }
        }
        Ok(())
    }
}

/// One quantization job: a (bits-per-head, bit-width) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub bits_per_head: String,
    pub bpw: String,
    pub context: Arc<JobContext>,
}

impl JobSpec {
    fn suffix(&self) -> String {
        format!("{}bpw_H{}", self.bpw, self.bits_per_head)
    }

    /// `{author_}{model}_EXL2_{bpw}bpw_H{bits_per_head}`
    pub fn output_dir_name(&self) -> String {
        let ctx = &self.context;
        match &ctx.author {
            Some(author) => format!("{}_{}_EXL2_{}", author, ctx.model_name, self.suffix()),
            None => format!("{}_EXL2_{}", ctx.model_name, self.suffix()),
        }
    }

    /// `temp_{model}_{bpw}bpw_H{bits_per_head}`
    pub fn temp_dir_name(&self) -> String {
        format!("temp_{}_{}", self.context.model_name, self.suffix())
    }

    pub fn output_dir(&self, job_root: &Path) -> PathBuf {
        job_root.join(self.output_dir_name())
    }

    pub fn temp_dir(&self, job_root: &Path) -> PathBuf {
        job_root.join(self.temp_dir_name())
    }

    /// Short label for progress and error messages.
    pub fn label(&self) -> String {
        format!("{} bpw / H{}", self.bpw, self.bits_per_head)
    }
}

/// Expand the cross-product of `bits_per_head` × `bpw` into jobs.
///
/// Bits-per-head is the outer loop, bit-width the inner one. Nothing is
/// touched on disk; callers can rely on an `Err` meaning no side effects.
///
/// # Errors
///
/// Returns [`AutoquantError::Input`] if either set is empty or the context
/// cannot produce valid directory names.
pub fn plan(bits_per_head: &OptionSet, bpw: &OptionSet, context: JobContext) -> Result<Vec<JobSpec>> {
    if bpw.is_empty() {
        return Err(AutoquantError::input("select or enter at least one bpw value"));
    }
    if bits_per_head.is_empty() {
        return Err(AutoquantError::input("select at least one bits per head value"));
    }
    context.validate()?;

    let context = Arc::new(context);
    let mut jobs = Vec::with_capacity(bits_per_head.len() * bpw.len());
    for head in bits_per_head.iter() {
        for width in bpw.iter() {
            jobs.push(JobSpec {
                bits_per_head: head.to_string(),
                bpw: width.to_string(),
                context: Arc::clone(&context),
            });
        }
    }
    Ok(jobs)
}
