//! The [`Executor`] trait and the [`StepContext`] it runs against.
//!
//! An executor performs the work of one step: it reads the configuration and
//! the metadata handed over by the previous step, writes artifacts into the
//! step's own filesystem area, and reports its outcome by mutating the step
//! held by the context. The runner persists whatever the context holds once
//! the executor returns.

use std::io;
use std::path::PathBuf;

use anyhow::Context as _;
use serde::de::DeserializeOwned;
use serde::Serialize;
use us_core::StepStatus;
use us_db::models::{Project, Step};

use crate::layout::StepPaths;

/// A pluggable unit of work run for a single step.
///
/// Executors are registered once at startup and shared between runs, so they
/// hold no per-run state; everything about the current run lives in the
/// [`StepContext`].
pub trait Executor: Send + Sync {
    /// Registry key stored in `project_steps.executor_name`.
    fn name(&self) -> &str;

    /// Human-readable description template. `{key}` placeholders are filled
    /// from the step configuration object.
    fn description(&self) -> &str;

    /// Perform the step.
    ///
    /// Leave the status at `running` to let the runner resolve it (`warnings`
    /// when an unacknowledged warning was raised, `complete` otherwise), or
    /// set it explicitly. Return an error, or panic, to fail the step: the
    /// runner records the diagnostic and marks the step `errors`.
    fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()>;
}

/// Everything an executor may read or change during one run.
pub struct StepContext<'a> {
    project: &'a Project,
    prev_step: Option<&'a Step>,
    step: Step,
    config: serde_json::Value,
    paths: StepPaths,
    prev_paths: Option<StepPaths>,
    warnings: Vec<String>,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(
        project: &'a Project,
        step: Step,
        prev_step: Option<&'a Step>,
        config: serde_json::Value,
        paths: StepPaths,
        prev_paths: Option<StepPaths>,
    ) -> Self {
        Self {
            project,
            prev_step,
            step,
            config,
            paths,
            prev_paths,
            warnings: Vec::new(),
        }
    }

    /// The project being advanced.
    pub fn project(&self) -> &Project {
        self.project
    }

    /// The step being run, including any changes made so far.
    pub fn step(&self) -> &Step {
        &self.step
    }

    /// The step before this one, if any.
    pub fn prev_step(&self) -> Option<&Step> {
        self.prev_step
    }

    pub fn status(&self) -> StepStatus {
        self.step.status
    }

    pub fn set_status(&mut self, status: StepStatus) {
        self.step.status = status;
    }

    /// Raw handoff metadata (copied from the previous step when there is one).
    pub fn metadata(&self) -> &str {
        &self.step.metadata
    }

    /// Replace the handoff metadata verbatim.
    pub fn set_metadata(&mut self, metadata: impl Into<String>) {
        self.step.metadata = metadata.into();
    }

    /// Decode the handoff metadata as JSON.
    pub fn metadata_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_str(&self.step.metadata).context("step metadata is not valid JSON")
    }

    /// Encode `value` as JSON and store it as the handoff metadata.
    pub fn set_metadata_json<T: Serialize>(&mut self, value: &T) -> anyhow::Result<()> {
        self.step.metadata = serde_json::to_string(value).context("failed to encode step metadata")?;
        Ok(())
    }

    /// Step configuration exactly as stored.
    pub fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Decode the step configuration into the executor's own config type.
    pub fn config_as<T: DeserializeOwned>(&self) -> anyhow::Result<T> {
        serde_json::from_value(self.config.clone()).with_context(|| {
            format!(
                "invalid configuration for executor `{}`",
                self.step.executor_name
            )
        })
    }

    /// Raise a warning. The step ends in `warnings` unless an operator has
    /// already acknowledged the same message.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        if !self.warnings.contains(&message) {
            self.warnings.push(message);
        }
    }

    /// Warnings raised so far during this run.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// The step's filesystem areas.
    pub fn paths(&self) -> &StepPaths {
        &self.paths
    }

    /// The previous step's filesystem areas, if there is a previous step.
    pub fn prev_paths(&self) -> Option<&StepPaths> {
        self.prev_paths.as_ref()
    }

    /// The `data` area, created on first use.
    pub fn data_dir(&self) -> io::Result<PathBuf> {
        self.paths.ensure_area(StepPaths::DATA_AREA)
    }

    /// A named area, created on first use.
    pub fn area(&self, name: &str) -> io::Result<PathBuf> {
        self.paths.ensure_area(name)
    }

    pub(crate) fn into_parts(self) -> (Step, Vec<String>) {
        (self.step, self.warnings)
    }
}

impl std::fmt::Debug for StepContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepContext")
            .field("project", &self.project.id)
            .field("step", &self.step.index)
            .field("status", &self.step.status)
            .field("warnings", &self.warnings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory fixtures for exercising executors without a database.

    use super::*;
    use crate::layout::Layout;
    use us_core::{MediaType, ProjectId, StepId};

    pub fn project() -> Project {
        Project {
            id: ProjectId::new(),
            name: "Fixture".into(),
            media_type: MediaType::Music,
            is_finished: false,
            current_step_index: 0,
            locked_by: None,
            locked_at: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn step(project: &Project, index: usize, executor: &str, config: &str) -> Step {
        Step {
            id: StepId::new(),
            project_id: project.id,
            index,
            status: StepStatus::Running,
            executor_name: executor.into(),
            executor_config: config.into(),
            metadata: "{}".into(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn context<'a>(
        layout: &Layout,
        project: &'a Project,
        step: Step,
        prev: Option<&'a Step>,
    ) -> StepContext<'a> {
        let config = serde_json::from_str(&step.executor_config).unwrap();
        let paths = layout.step_paths(project.id, step.id);
        let prev_paths = prev.map(|p| layout.step_paths(project.id, p.id));
        StepContext::new(project, step, prev, config, paths, prev_paths)
    }
}
