//! Persistent settings store (TOML or YAML).
//!
//! The store remembers the last values entered for a run so the next run can
//! start from them. It carries a schema version; a file written by an older
//! schema is discarded and rebuilt from defaults rather than patched field by
//! field.

use crate::errors::{AutoquantError, Result};
use crate::options::OptionSet;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current settings schema version.
pub const SCHEMA_VERSION: &str = "3.22";

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_SETTINGS_FILE: &str = "autoquant.toml";

/// Typed settings, one field per form entry.
///
/// The two multi-valued selections are stored comma-joined, exactly as the
/// form would write them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Schema version the file was written with.
    pub version: String,

    pub model_name: String,

    /// Directory holding the unquantized model weights.
    pub raw_weights_dir: String,

    /// Comma-joined bits-per-head selection. Defaults to `"6"`.
    pub bits_per_head: String,

    /// Comma-joined bit-width selection, presets and custom values together.
    pub bpw_values: String,

    /// Python virtual environment the tool runs in. Empty uses `python`
    /// from `PATH`.
    pub venv_path: String,

    /// Optional prefix for output directory names.
    pub author_name: String,

    /// exllamav2 checkout containing `convert.py`.
    pub exllamav2_dir: String,

    /// Value exported as `CUDA_VISIBLE_DEVICES`. Defaults to `"0"`.
    pub cuda_device: String,

    /// Optional precomputed `measurement.json`.
    pub measurement_path: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION.to_string(),
            model_name: String::new(),
            raw_weights_dir: String::new(),
            bits_per_head: "6".to_string(),
            bpw_values: String::new(),
            venv_path: String::new(),
            author_name: String::new(),
            exllamav2_dir: String::new(),
            cuda_device: "0".to_string(),
            measurement_path: String::new(),
        }
    }
}

/// What [`Settings::load_or_init`] had to do to produce its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file existed; defaults were written.
    Created,
    /// The file was older than [`SCHEMA_VERSION`] or unreadable and was
    /// rebuilt from defaults.
    Migrated,
    /// The file was current and loaded as-is.
    Current,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Toml,
    Yaml,
}

impl Format {
    fn of(path: &Path) -> Result<Self> {
        let extension = path.extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| AutoquantError::Config { reason: "Settings file has no extension".into() })?;

        match extension {
            "toml" => Ok(Format::Toml),
            "yaml" | "yml" => Ok(Format::Yaml),
            _ => Err(AutoquantError::Config { reason: format!("Unsupported settings format: {}", extension) }),
        }
    }
}

impl Settings {
    /// Parse settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to parse TOML settings: {e}") })
    }

    /// Parse settings from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to parse YAML settings: {e}") })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to serialize TOML settings: {e}") })
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to serialize YAML settings: {e}") })
    }

    /// Load settings from a TOML or YAML file (auto-detected by extension).
    ///
    /// # Errors
    ///
    /// Returns [`AutoquantError::Config`] on I/O, parse, or unsupported format errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = Format::of(path)?;

        let content = std::fs::read_to_string(path)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to read settings file '{}': {e}", path.display()) })?;

        match format {
            Format::Toml => Self::from_toml(&content),
            Format::Yaml => Self::from_yaml(&content),
        }
    }

    /// Write settings to `path`, choosing the format from its extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = match Format::of(path)? {
            Format::Toml => self.to_toml()?,
            Format::Yaml => self.to_yaml()?,
        };

        std::fs::write(path, content)
            .map_err(|e| AutoquantError::Config { reason: format!("Failed to write settings file '{}': {e}", path.display()) })
    }

    /// Load the store at `path`, creating or rebuilding it as needed.
    ///
    /// A missing file, a file older than [`SCHEMA_VERSION`], and a file that
    /// no longer parses all end up as defaults. The current version is
    /// always written back.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<(Self, LoadOutcome)> {
        let path = path.as_ref();
        Format::of(path)?;

        let (mut settings, outcome) = if !path.exists() {
            info!("creating settings file {}", path.display());
            (Settings::default(), LoadOutcome::Created)
        } else {
            match Self::from_file(path) {
                Ok(loaded) => migrate(loaded),
                Err(e) => {
                    warn!("discarding unreadable settings file {}: {e}", path.display());
                    (Settings::default(), LoadOutcome::Migrated)
                }
            }
        };

        settings.version = SCHEMA_VERSION.to_string();
        settings.save(path)?;
        Ok((settings, outcome))
    }

    /// Check that the stored selections are well-formed.
    ///
    /// Empty selections are allowed here; they are rejected when a run is
    /// planned.
    pub fn validate(&self) -> Result<()> {
        OptionSet::parse(&self.bits_per_head)
            .map_err(|e| AutoquantError::Config { reason: format!("bits_per_head: {e}") })?;
        OptionSet::parse(&self.bpw_values)
            .map_err(|e| AutoquantError::Config { reason: format!("bpw_values: {e}") })?;
        Ok(())
    }

    pub fn author(&self) -> Option<&str> {
        let author = self.author_name.trim();
        (!author.is_empty()).then_some(author)
    }

    pub fn measurement(&self) -> Option<&Path> {
        let path = self.measurement_path.trim();
        (!path.is_empty()).then(|| Path::new(path))
    }
}

/// Bring loaded settings up to [`SCHEMA_VERSION`].
///
/// There is no field-level upgrade path: anything older than the current
/// schema is replaced wholesale by defaults.
pub fn migrate(loaded: Settings) -> (Settings, LoadOutcome) {
    if version_is_stale(&loaded.version) {
        info!("settings schema {} is older than {}, rebuilding", loaded.version, SCHEMA_VERSION);
        (Settings::default(), LoadOutcome::Migrated)
    } else {
        (loaded, LoadOutcome::Current)
    }
}

fn version_is_stale(version: &str) -> bool {
    let current: f64 = SCHEMA_VERSION.parse().unwrap_or_default();
    match version.trim().parse::<f64>() {
        Ok(v) => v < current,
        Err(_) => true,
    }
}
