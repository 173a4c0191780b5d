//! Typed error handling for the autoquant library.
//!
//! All public API functions return [`Result<T>`](type@Result), which uses
//! [`AutoquantError`] as the error type. The CLI binary converts these into
//! `anyhow::Error` automatically via the blanket `From<E: std::error::Error>`
//! impl, so callers that prefer `anyhow` can use `?` without `.map_err()`.

use std::fmt;
use std::path::{Path, PathBuf};

/// Result type alias used throughout the autoquant public API.
pub type Result<T> = std::result::Result<T, AutoquantError>;

/// Errors produced by the autoquant library.
///
/// Which variant a failure maps to decides how far it reaches: an
/// [`Input`](AutoquantError::Input) error blocks a run before anything
/// touches the disk, while tool and I/O failures are scoped to the job or
/// run in which they occur.
#[derive(Debug)]
pub enum AutoquantError {
    /// Missing or invalid user-provided parameters (empty option set,
    /// non-numeric bit width, empty model name, ...).
    Input {
        /// What went wrong.
        reason: String,
    },

    /// The external quantization tool exited unsuccessfully.
    ExternalTool {
        /// Rendered command line that was executed.
        command: String,
        /// Exit code, or `None` when the process was killed by a signal.
        status: Option<i32>,
    },

    /// Any other I/O or filesystem failure.
    Unexpected {
        /// Path the failing operation was working on.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// Settings file parsing or serialization error.
    Config {
        /// What went wrong.
        reason: String,
    },

    /// A run is already in flight on this slot.
    Busy,
}

impl AutoquantError {
    pub fn input(reason: impl Into<String>) -> Self {
        AutoquantError::Input { reason: reason.into() }
    }

    /// Build a `map_err` adapter that tags an I/O error with the path and
    /// the action that was being attempted.
    pub fn io<'a>(action: &'a str, path: &'a Path) -> impl FnOnce(std::io::Error) -> Self + 'a {
        move |e| AutoquantError::Unexpected {
            path: path.to_path_buf(),
            reason: format!("{action}: {e}"),
        }
    }

    /// `true` for errors caused by the caller's parameters rather than by
    /// the environment.
    pub fn is_input(&self) -> bool {
        matches!(self, AutoquantError::Input { .. })
    }
}

impl fmt::Display for AutoquantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoquantError::Input { reason } => {
                write!(f, "input error: {reason}")
            }
            AutoquantError::ExternalTool { command, status: Some(code) } => {
                write!(f, "command failed with exit code {code}: {command}")
            }
            AutoquantError::ExternalTool { command, status: None } => {
                write!(f, "command terminated by signal: {command}")
            }
            AutoquantError::Unexpected { path, reason } => {
                write!(f, "unexpected error at '{}': {reason}", path.display())
            }
            AutoquantError::Config { reason } => {
                write!(f, "config error: {reason}")
            }
            AutoquantError::Busy => {
                write!(f, "a quantization run is already in progress")
            }
        }
    }
}

impl std::error::Error for AutoquantError {}
