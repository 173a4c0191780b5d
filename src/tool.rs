//! The external quantization tool.
//!
//! [`QuantTool`] is the seam between the runner and the process that does
//! the actual work. [`ConvertScript`] drives exllamav2's `convert.py`; tests
//! substitute their own implementation.

use crate::config::Settings;
use crate::errors::{AutoquantError, Result};
use log::{debug, info};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Inputs of the measurement pass.
#[derive(Debug, Clone, Copy)]
pub struct MeasureArgs<'a> {
    pub weights_dir: &'a Path,
    pub scratch_dir: &'a Path,
    /// Where the measurement artifact is written.
    pub measurement_out: &'a Path,
    pub device: &'a str,
}

/// Inputs of one quantization pass.
#[derive(Debug, Clone, Copy)]
pub struct QuantizeArgs<'a> {
    pub weights_dir: &'a Path,
    pub scratch_dir: &'a Path,
    pub measurement: &'a Path,
    /// Compaction target, the directory that survives the job.
    pub output_dir: &'a Path,
    pub bpw: &'a str,
    pub bits_per_head: &'a str,
    pub device: &'a str,
}

/// An external tool able to measure a model and quantize it.
///
/// Both calls block until the tool has exited.
pub trait QuantTool: Send + Sync {
    fn measure(&self, args: &MeasureArgs<'_>) -> Result<()>;

    fn quantize(&self, args: &QuantizeArgs<'_>) -> Result<()>;
}

/// exllamav2's `convert.py`, run with a virtual environment's interpreter.
#[derive(Debug, Clone)]
pub struct ConvertScript {
    /// Python virtual environment; `None` runs `python` from `PATH`.
    pub venv: Option<PathBuf>,
    /// exllamav2 checkout containing `convert.py`.
    pub exllamav2_dir: PathBuf,
}

impl ConvertScript {
    pub fn new(venv: Option<PathBuf>, exllamav2_dir: impl Into<PathBuf>) -> Self {
        Self { venv, exllamav2_dir: exllamav2_dir.into() }
    }

    /// Build from stored settings. An empty venv path means no venv.
    ///
    /// # Errors
    ///
    /// Returns [`AutoquantError::Input`] if no exllamav2 directory is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let dir = settings.exllamav2_dir.trim();
        if dir.is_empty() {
            return Err(AutoquantError::input("exllamav2 directory is not set"));
        }
        let venv = settings.venv_path.trim();
        let venv = (!venv.is_empty()).then(|| PathBuf::from(venv));
        Ok(Self::new(venv, dir))
    }

    /// Interpreter inside the configured environment.
    ///
    /// Calling the environment's own interpreter is what activating it
    /// would achieve, without going through a shell.
    pub fn python(&self) -> PathBuf {
        match &self.venv {
            Some(venv) if cfg!(windows) => venv.join("Scripts").join("python.exe"),
            Some(venv) => venv.join("bin").join("python"),
            None => PathBuf::from("python"),
        }
    }

    pub fn script(&self) -> PathBuf {
        self.exllamav2_dir.join("convert.py")
    }

    fn base_command(&self, device: &str) -> Command {
        let mut cmd = Command::new(self.python());
        cmd.arg(self.script());
        cmd.env("CUDA_VISIBLE_DEVICES", device);
        if let Some(venv) = &self.venv {
            cmd.env("VIRTUAL_ENV", venv);
        }
        cmd
    }

    /// `convert.py -i W -o S -om M`
    pub fn measure_command(&self, args: &MeasureArgs<'_>) -> Command {
        let mut cmd = self.base_command(args.device);
        cmd.arg("-i").arg(args.weights_dir)
            .arg("-o").arg(args.scratch_dir)
            .arg("-om").arg(args.measurement_out);
        cmd
    }

    /// `convert.py -i W -o T -m M -cf O -b BPW -hb BPH`
    pub fn quantize_command(&self, args: &QuantizeArgs<'_>) -> Command {
        let mut cmd = self.base_command(args.device);
        cmd.arg("-i").arg(args.weights_dir)
            .arg("-o").arg(args.scratch_dir)
            .arg("-m").arg(args.measurement)
            .arg("-cf").arg(args.output_dir)
            .arg("-b").arg(args.bpw)
            .arg("-hb").arg(args.bits_per_head);
        cmd
    }
}

impl QuantTool for ConvertScript {
    fn measure(&self, args: &MeasureArgs<'_>) -> Result<()> {
        info!("measuring {}", args.weights_dir.display());
        execute(self.measure_command(args))
    }

    fn quantize(&self, args: &QuantizeArgs<'_>) -> Result<()> {
        info!("quantizing to {} bpw, head bits {}", args.bpw, args.bits_per_head);
        execute(self.quantize_command(args))
    }
}

/// Render a command the way it would be typed in a shell, for messages.
pub fn render(cmd: &Command) -> String {
    let quote = |s: &OsStr| {
        let s = s.to_string_lossy();
        if s.contains(char::is_whitespace) {
            format!("\"{s}\"")
        } else {
            s.into_owned()
        }
    };

    std::iter::once(quote(cmd.get_program()))
        .chain(cmd.get_args().map(quote))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Run `cmd` to completion, inheriting stdio, and check its exit status.
pub fn execute(mut cmd: Command) -> Result<()> {
    let rendered = render(&cmd);
    debug!("exec: {rendered}");

    let status = cmd.status().map_err(|e| AutoquantError::Unexpected {
        path: PathBuf::from(cmd.get_program()),
        reason: format!("failed to start `{rendered}`: {e}"),
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(AutoquantError::ExternalTool { command: rendered, status: status.code() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn env_of(cmd: &Command, key: &str) -> Option<String> {
        cmd.get_envs()
            .find(|(k, _)| *k == OsStr::new(key))
            .and_then(|(_, v)| v)
            .map(|v| v.to_string_lossy().into_owned())
    }

    #[test]
    fn test_measure_command() {
        let tool = ConvertScript::new(None, "/opt/exllamav2");
        let cmd = tool.measure_command(&MeasureArgs {
            weights_dir: Path::new("/w"),
            scratch_dir: Path::new("/job/temp_measurement"),
            measurement_out: Path::new("/job/measurement.json"),
            device: "1",
        });

        assert_eq!(cmd.get_program(), "python");
        let script = Path::new("/opt/exllamav2").join("convert.py");
        let expected = vec![
            script.to_string_lossy().into_owned(),
            "-i".into(), "/w".into(),
            "-o".into(), "/job/temp_measurement".into(),
            "-om".into(), "/job/measurement.json".into(),
        ];
        assert_eq!(args_of(&cmd), expected);
        assert_eq!(env_of(&cmd, "CUDA_VISIBLE_DEVICES").as_deref(), Some("1"));
        assert_eq!(env_of(&cmd, "VIRTUAL_ENV"), None);
    }

    #[test]
    fn test_quantize_command() {
        let tool = ConvertScript::new(Some(PathBuf::from("/venv")), "/opt/exllamav2");
        let cmd = tool.quantize_command(&QuantizeArgs {
            weights_dir: Path::new("/w"),
            scratch_dir: Path::new("/job/temp_M_4bpw_H6"),
            measurement: Path::new("/job/measurement.json"),
            output_dir: Path::new("/job/M_EXL2_4bpw_H6"),
            bpw: "4",
            bits_per_head: "6",
            device: "0",
        });

        assert_eq!(cmd.get_program(), tool.python().as_os_str());
        let args = args_of(&cmd);
        assert_eq!(
            &args[1..],
            &["-i", "/w", "-o", "/job/temp_M_4bpw_H6", "-m", "/job/measurement.json",
              "-cf", "/job/M_EXL2_4bpw_H6", "-b", "4", "-hb", "6"]
        );
        assert_eq!(env_of(&cmd, "CUDA_VISIBLE_DEVICES").as_deref(), Some("0"));
        assert_eq!(env_of(&cmd, "VIRTUAL_ENV").as_deref(), Some("/venv"));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings::default();
        assert!(ConvertScript::from_settings(&settings).unwrap_err().is_input());

        settings.exllamav2_dir = "/opt/exllamav2".into();
        let tool = ConvertScript::from_settings(&settings).unwrap();
        assert_eq!(tool.venv, None);
        assert_eq!(tool.script(), Path::new("/opt/exllamav2").join("convert.py"));
    }

    #[test]
    fn test_python_inside_venv() {
        let tool = ConvertScript::new(Some(PathBuf::from("/venv")), "/x");
        assert!(tool.python().starts_with("/venv"));
    }

    #[test]
    fn test_render_quotes_whitespace() {
        let mut cmd = Command::new("python");
        cmd.arg("convert.py").arg("-i").arg("/my models/llama");
        assert_eq!(render(&cmd), "python convert.py -i \"/my models/llama\"");
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 3");
        match execute(cmd) {
            Err(AutoquantError::ExternalTool { status, .. }) => assert_eq!(status, Some(3)),
            other => panic!("expected ExternalTool error, got {other:?}"),
        }
    }

    #[test]
    fn test_execute_missing_program() {
        let cmd = Command::new("/definitely/not/a/real/program");
        assert!(matches!(execute(cmd), Err(AutoquantError::Unexpected { .. })));
    }
}
