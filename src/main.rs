use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::*;

mod cli;

use cli::commands;

#[derive(Parser)]
#[command(
    name = "autoquant",
    version,
    about = "Batch EXL2 quantization driver",
    long_about = "Run exllamav2's convert.py once per bits-per-head / bpw combination, sharing one measurement pass"
)]
struct Cli {
    /// Settings file (.toml, .yaml or .yml)
    #[arg(short, long, global = true, default_value = autoquant::config::DEFAULT_SETTINGS_FILE)]
    settings: String,

    #[command(subcommand)]
    command: Commands,
}

/// Values that override the stored settings for this invocation.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    #[arg(long)]
    pub model: Option<String>,

    /// Directory with the unquantized weights
    #[arg(long, value_name = "DIR")]
    pub weights: Option<String>,

    /// Comma-separated bits-per-head values (presets: 6, 8)
    #[arg(long, value_name = "LIST")]
    pub bits_per_head: Option<String>,

    /// Comma-separated preset bpw values to check
    #[arg(long, value_name = "LIST")]
    pub bpw: Option<String>,

    /// Comma-separated custom bpw values, added after the presets
    #[arg(long, value_name = "LIST")]
    pub custom_bpw: Option<String>,

    #[arg(long, value_name = "DIR")]
    pub venv: Option<String>,

    #[arg(long)]
    pub author: Option<String>,

    /// exllamav2 checkout containing convert.py
    #[arg(long, value_name = "DIR")]
    pub exllamav2_dir: Option<String>,

    /// Value for CUDA_VISIBLE_DEVICES
    #[arg(long)]
    pub device: Option<String>,

    /// Precomputed measurement.json to reuse
    #[arg(long, value_name = "FILE")]
    pub measurement: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure once, then quantize every combination
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Where the timestamped job directory is created
        #[arg(long, default_value = ".")]
        base_dir: String,

        /// Do not write the effective settings back
        #[arg(long)]
        no_save: bool,
    },

    /// Show the jobs a run would execute without running anything
    Plan {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Inspect or reset the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// List preset values and which ones are selected
    Presets,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Overwrite the settings file with defaults
    Init,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("{}", format!("autoquant v{}", autoquant::VERSION).bold().cyan());
    println!();

    match cli.command {
        Commands::Run { overrides, base_dir, no_save } => {
            let ok = commands::run(&cli.settings, &overrides, &base_dir, !no_save)?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Plan { overrides } => {
            commands::plan(&cli.settings, &overrides)?;
        }
        Commands::Config { action: ConfigAction::Show } => {
            commands::config_show(&cli.settings)?;
        }
        Commands::Config { action: ConfigAction::Init } => {
            commands::config_init(&cli.settings)?;
        }
        Commands::Presets => {
            commands::presets(&cli.settings)?;
        }
    }

    Ok(())
}
