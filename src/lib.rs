pub mod errors;
pub mod options;
pub mod config;
pub mod planner;
pub mod tool;
pub mod runner;
pub mod controller;

pub use errors::{AutoquantError, Result};
pub use options::{OptionSet, Selection, restore_selection, BITS_PER_HEAD_PRESETS, BPW_PRESETS};
pub use config::{Settings, LoadOutcome, SCHEMA_VERSION};
pub use planner::{plan, JobContext, JobSpec};
pub use tool::{ConvertScript, MeasureArgs, QuantTool, QuantizeArgs};
pub use runner::{JobOutcome, MeasurementSource, RunContext, RunReport, Runner};
pub use controller::{Controller, NullController, RunHandle, RunRequest, RunSlot};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
