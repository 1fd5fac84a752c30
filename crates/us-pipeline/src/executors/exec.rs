//! Arbitrary external command executor.

use std::process::Command;

use anyhow::{bail, Context as _};
use serde::Deserialize;

use crate::executor::{Executor, StepContext};
use crate::template::TemplateContext;

/// Per-step configuration for [`ExecExecutor`].
#[derive(Debug, Deserialize)]
struct ExecStepConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    /// Store the command's trimmed stdout as the step's handoff metadata.
    #[serde(default)]
    capture_stdout: bool,
}

/// Run an external command inside the step's data area.
///
/// Arguments support `{data}`, `{prev_data}` and every top-level config key
/// as placeholders. A non-zero exit fails the step; output on stderr from a
/// successful command is raised as a warning.
#[derive(Debug, Default)]
pub struct ExecExecutor {
    allowed_commands: Vec<String>,
}

impl ExecExecutor {
    /// An empty allow-list permits any command.
    pub fn new(allowed_commands: Vec<String>) -> Self {
        Self { allowed_commands }
    }

    fn is_allowed(&self, command: &str) -> bool {
        self.allowed_commands.is_empty() || self.allowed_commands.iter().any(|c| c == command)
    }
}

impl Executor for ExecExecutor {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run `{command}`"
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        let cfg: ExecStepConfig = ctx.config_as()?;
        if !self.is_allowed(&cfg.command) {
            bail!("command `{}` is not in executors.exec.allowed_commands", cfg.command);
        }

        let data = ctx.data_dir().context("failed to create step data area")?;
        let prev_data = ctx.prev_paths().map(|p| p.data());
        let args = TemplateContext::from_config(ctx.config())
            .with_paths(&data, prev_data.as_deref())
            .substitute_all(&cfg.args);

        tracing::info!("exec: {} {}", cfg.command, args.join(" "));

        let output = Command::new(&cfg.command)
            .args(&args)
            .current_dir(&data)
            .output()
            .with_context(|| format!("failed to spawn `{}`", cfg.command))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            bail!(
                "`{}` exited with {}: {}",
                cfg.command,
                output.status,
                stderr.trim()
            );
        }

        if let Some(line) = stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
            ctx.add_warning(format!("`{}` reported: {line}", cfg.command));
        }

        if cfg.capture_stdout {
            let stdout = String::from_utf8_lossy(&output.stdout);
            ctx.set_metadata(stdout.trim());
        }

        Ok(())
    }
}
