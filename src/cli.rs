use clap::{Parser, Subcommand};
use std::path::PathBuf;
use us_core::{MediaType, ProjectId, StepId, WarningId};
use us_pipeline::NewStep;

#[derive(Parser)]
#[command(name = "upload-studio")]
#[command(author, version, about = "Staged processing pipeline for media upload projects")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project with an initial list of steps
    Create {
        /// Project name
        #[arg(long)]
        name: String,

        /// Kind of media being uploaded
        #[arg(long, default_value = "music")]
        media_type: MediaType,

        /// Step as EXECUTOR or EXECUTOR=JSON_CONFIG (repeatable, in order)
        #[arg(long = "step", value_parser = parse_step)]
        steps: Vec<NewStep>,
    },

    /// List projects with their derived status
    List,

    /// Show a project, its steps, warnings and errors
    Show {
        project: ProjectId,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Add a step after the last one
    AppendStep {
        project: ProjectId,
        executor: String,

        /// Executor configuration as a JSON object
        #[arg(long, value_parser = parse_json)]
        step_config: Option<serde_json::Value>,
    },

    /// Insert a step at an index, shifting later steps
    InsertStep {
        project: ProjectId,
        index: usize,
        executor: String,

        /// Executor configuration as a JSON object
        #[arg(long, value_parser = parse_json)]
        step_config: Option<serde_json::Value>,
    },

    /// Remove the step at an index
    RemoveStep { project: ProjectId, index: usize },

    /// Run the step at the project's cursor once
    RunOne { project: ProjectId },

    /// Run steps until one does not complete
    RunAll { project: ProjectId },

    /// Return steps to pending from an index onward
    Reset {
        project: ProjectId,

        /// First step to reset
        #[arg(long, default_value = "0")]
        from: usize,
    },

    /// Acknowledge a step warning
    AckWarning { step: StepId, warning: WarningId },

    /// Mark a project finished (no further changes allowed)
    Finish { project: ProjectId },

    /// Delete a project and its files
    Delete { project: ProjectId },

    /// Move steps left running by a crashed process to errors
    Recover,

    /// List registered executors
    Executors,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

fn parse_json(raw: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {e}"))
}

/// `EXECUTOR` or `EXECUTOR=JSON`.
pub fn parse_step(raw: &str) -> Result<NewStep, String> {
    match raw.split_once('=') {
        Some((executor, json)) => Ok(NewStep::new(executor.trim(), parse_json(json)?)),
        None => Ok(NewStep::bare(raw.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn step_without_config() {
        let step = parse_step("mark_finished").unwrap();
        assert_eq!(step, NewStep::bare("mark_finished"));
    }

    #[test]
    fn step_with_config_keeps_equals_in_json() {
        let step = parse_step(r#"exec={"command":"echo","args":["a=b"]}"#).unwrap();
        assert_eq!(step.executor, "exec");
        assert_eq!(step.config, json!({"command": "echo", "args": ["a=b"]}));
    }

    #[test]
    fn step_with_bad_json() {
        assert!(parse_step("exec={nope").is_err());
    }
}
