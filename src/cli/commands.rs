//! Command implementations

use anyhow::{Context, Result};
use autoquant::config::LoadOutcome;
use autoquant::options::{restore_selection, OptionSet, BITS_PER_HEAD_PRESETS, BPW_PRESETS};
use autoquant::{ConvertScript, RunRequest, RunSlot, Settings, SCHEMA_VERSION};
use colored::Colorize;
use std::sync::Arc;

use super::console::ConsoleController;
use crate::Overrides;

fn load_settings(path: &str) -> Result<Settings> {
    let (settings, outcome) = Settings::load_or_init(path)
        .with_context(|| format!("Failed to load settings from {path}"))?;

    match outcome {
        LoadOutcome::Created => {
            println!("{} Created settings file {} (version {})", "ℹ".cyan(), path.bold(), SCHEMA_VERSION);
        }
        LoadOutcome::Migrated => {
            println!("{} Settings file updated to version {}", "⚠️ ".yellow(), SCHEMA_VERSION);
        }
        LoadOutcome::Current => {}
    }
    Ok(settings)
}

/// Apply command-line overrides on top of stored settings.
pub fn apply_overrides(settings: &mut Settings, overrides: &Overrides) -> autoquant::Result<()> {
    let replace = |field: &mut String, value: &Option<String>| {
        if let Some(v) = value {
            *field = v.trim().to_string();
        }
    };

    replace(&mut settings.model_name, &overrides.model);
    replace(&mut settings.raw_weights_dir, &overrides.weights);
    replace(&mut settings.venv_path, &overrides.venv);
    replace(&mut settings.author_name, &overrides.author);
    replace(&mut settings.exllamav2_dir, &overrides.exllamav2_dir);
    replace(&mut settings.cuda_device, &overrides.device);
    replace(&mut settings.measurement_path, &overrides.measurement);

    if let Some(list) = &overrides.bits_per_head {
        settings.bits_per_head = OptionSet::parse(list)?.joined();
    }

    if overrides.bpw.is_some() || overrides.custom_bpw.is_some() {
        let current = restore_selection(BPW_PRESETS, &settings.bpw_values);
        let checked: Vec<String> = match &overrides.bpw {
            Some(list) => list.split(',').map(|s| s.trim().to_string()).collect(),
            None => current.checked,
        };
        let custom = overrides.custom_bpw.clone().unwrap_or(current.custom);
        settings.bpw_values = OptionSet::merge(&checked[..], &custom)?.joined();
    }

    Ok(())
}

/// Measure once and quantize every combination. Returns `false` when the
/// run or any of its jobs failed.
pub fn run(settings_path: &str, overrides: &Overrides, base_dir: &str, save: bool) -> Result<bool> {
    let mut settings = load_settings(settings_path)?;
    apply_overrides(&mut settings, overrides)?;
    if save {
        settings.save(settings_path)?;
    }

    let request = RunRequest::from_settings(&settings, base_dir)?;
    let tool = ConvertScript::from_settings(&settings)?;
    let jobs = request.plan()?;

    println!("📦 Model: {}", request.context.model_name.bold());
    println!("  Weights:        {}", request.context.raw_weights_dir.display());
    println!("  Bits per head:  {}", request.bits_per_head);
    println!("  BPW values:     {}", request.bpw);
    println!("  Jobs:           {}", jobs.len());
    println!();

    let controller = Arc::new(ConsoleController::new(jobs.len()));
    let slot = RunSlot::new();
    let handle = slot.submit(request, Arc::new(tool), controller.clone())?;
    controller.println(format!("📁 Job directory: {}", handle.job_root().display()));

    let report = match handle.join() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "✗ Run failed:".red().bold(), e);
            return Ok(false);
        }
    };

    println!();
    println!("📊 Results:");
    for outcome in report.succeeded() {
        println!("  {} {}", "✓".green(), outcome.job.output_dir(&report.job_root).display());
    }
    for outcome in report.failed() {
        if let Some(e) = &outcome.error {
            println!("  {} {}: {}", "✗".red(), outcome.job.label(), e);
        }
    }
    println!();

    let failed = report.failed().count();
    if failed == 0 {
        println!("{}", "✓ All processes completed.".green().bold());
    } else {
        println!(
            "{}",
            format!("⚠️  {} of {} jobs failed", failed, report.outcomes.len()).yellow()
        );
    }

    Ok(report.all_succeeded())
}

/// Print the jobs a run would execute.
pub fn plan(settings_path: &str, overrides: &Overrides) -> Result<()> {
    let mut settings = load_settings(settings_path)?;
    apply_overrides(&mut settings, overrides)?;

    let request = RunRequest::from_settings(&settings, ".")?;
    let jobs = request.plan()?;

    println!("🔍 {} jobs for {}:", jobs.len(), request.context.model_name.bold());
    println!();
    for (idx, job) in jobs.iter().enumerate() {
        println!("  {:>3}. {:<16} → {}", idx + 1, job.label(), job.output_dir_name().cyan());
    }
    println!();

    match settings.measurement() {
        Some(path) if path.is_file() => println!("  Measurement: reuse {}", path.display()),
        Some(path) => println!(
            "  Measurement: {} not found, will be computed",
            path.display().to_string().yellow()
        ),
        None => println!("  Measurement: computed once before the first job"),
    }

    Ok(())
}

pub fn config_show(settings_path: &str) -> Result<()> {
    let settings = load_settings(settings_path)?;
    println!("⚙️  Settings: {}", settings_path.bold());
    println!();
    print!("{}", settings.to_toml()?);

    let bpw = restore_selection(BPW_PRESETS, &settings.bpw_values);
    println!();
    println!("  Checked bpw presets: {}", bpw.checked.join(", "));
    println!("  Custom bpw values:   {}", bpw.custom);
    Ok(())
}

pub fn config_init(settings_path: &str) -> Result<()> {
    Settings::default().save(settings_path)?;
    println!("{} Wrote default settings to {}", "✓".green(), settings_path.bold());
    Ok(())
}

pub fn presets(settings_path: &str) -> Result<()> {
    let settings = load_settings(settings_path)?;

    let show = |title: &str, presets: &[&str], saved: &str| {
        let selection = restore_selection(presets, saved);
        println!("{}:", title.bold());
        let boxes: Vec<String> = presets
            .iter()
            .map(|p| {
                if selection.checked.iter().any(|c| c == p) {
                    format!("[x] {p}").green().to_string()
                } else {
                    format!("[ ] {p}")
                }
            })
            .collect();
        println!("  {}", boxes.join("  "));
        if !selection.custom.is_empty() {
            println!("  custom: {}", selection.custom.cyan());
        }
        println!();
    };

    show("Bits per head", BITS_PER_HEAD_PRESETS, &settings.bits_per_head);
    show("BPW values", BPW_PRESETS, &settings.bpw_values);
    Ok(())
}
