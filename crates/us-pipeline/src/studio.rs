//! Project-level operations: creation, inspection, step editing, reset,
//! warning acknowledgment, finishing, deletion and crash recovery.
//!
//! Every mutation of an existing project takes the project lease first, so
//! it cannot interleave with a run in another thread or process.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use us_core::config::RunnerConfig;
use us_core::events::{EventBus, EventPayload};
use us_core::status::{next_step_position, project_status};
use us_core::{Error, MediaType, ProjectId, Result, StepId, StepStatus, WarningId};
use us_db::models::{Project, Step, StepError, StepWarning};
use us_db::pool::{get_conn, DbPool, PooledConnection};
use us_db::queries::{messages, projects, steps};

use crate::layout::{remove_dir_if_exists, Layout};
use crate::lock::{stale_cutoff, ProjectLock};
use crate::registry::ExecutorRegistry;
use crate::runner::StepsRunner;

/// A step to add to a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStep {
    pub executor: String,
    #[serde(default = "empty_config")]
    pub config: serde_json::Value,
}

fn empty_config() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

impl NewStep {
    pub fn new(executor: impl Into<String>, config: serde_json::Value) -> Self {
        Self {
            executor: executor.into(),
            config,
        }
    }

    /// A step with an empty configuration object.
    pub fn bare(executor: impl Into<String>) -> Self {
        Self::new(executor, empty_config())
    }
}

/// A step together with everything recorded against it.
#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    #[serde(flatten)]
    pub step: Step,
    pub description: String,
    pub data_path: PathBuf,
    pub warnings: Vec<StepWarning>,
    pub errors: Vec<StepError>,
}

/// A project with its steps and derived status.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub status: StepStatus,
    /// Position of the next step that needs to run, if any.
    pub next_step: Option<usize>,
    pub root_path: PathBuf,
    pub steps: Vec<StepView>,
}

/// One row of [`Studio::list_projects`].
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    #[serde(flatten)]
    pub project: Project,
    pub status: StepStatus,
    pub step_count: usize,
}

/// Entry point for everything that creates, inspects or edits projects.
pub struct Studio {
    pool: DbPool,
    registry: Arc<ExecutorRegistry>,
    layout: Layout,
    runner_config: RunnerConfig,
    events: Option<Arc<EventBus>>,
}

impl Studio {
    pub fn new(pool: DbPool, registry: Arc<ExecutorRegistry>, layout: Layout) -> Self {
        Self {
            pool,
            registry,
            layout,
            runner_config: RunnerConfig::default(),
            events: None,
        }
    }

    pub fn with_runner_config(mut self, config: &RunnerConfig) -> Self {
        self.runner_config = config.clone();
        self
    }

    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn registry(&self) -> &ExecutorRegistry {
        &self.registry
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// A runner sharing this studio's pool, registry, layout and lease
    /// settings.
    pub fn runner(&self) -> StepsRunner {
        let runner = StepsRunner::new(self.pool.clone(), Arc::clone(&self.registry), self.layout.clone())
            .with_runner_config(&self.runner_config);
        match self.events {
            Some(ref bus) => runner.with_events(Arc::clone(bus)),
            None => runner,
        }
    }

    fn lease(&self) -> Duration {
        self.runner_config.lock_lease()
    }

    fn broadcast(&self, payload: EventPayload) {
        if let Some(ref bus) = self.events {
            bus.broadcast(payload);
        }
    }

    /// Run `f` while holding the project lease.
    fn with_lock<T>(
        &self,
        project_id: ProjectId,
        f: impl FnOnce(&mut PooledConnection, Project) -> Result<T>,
    ) -> Result<T> {
        let lock = ProjectLock::acquire(&self.pool, project_id, &self.runner_config.worker_id, self.lease())?;
        let mut conn = get_conn(&self.pool)?;
        let project = load_project(&conn, project_id)?;
        let value = f(&mut conn, project)?;
        drop(conn);
        lock.release()?;
        Ok(value)
    }

    fn remove_area(&self, project_id: ProjectId, path: &std::path::Path) {
        if let Err(e) = remove_dir_if_exists(path) {
            warn!(%project_id, "Failed to remove {}: {e}", path.display());
        }
    }

    fn check_executor(&self, step: &NewStep) -> Result<String> {
        if !self.registry.contains(&step.executor) {
            return Err(Error::Validation(format!(
                "unknown executor `{}` (registered: {})",
                step.executor,
                self.registry.names().join(", ")
            )));
        }
        serde_json::to_string(&step.config)
            .map_err(|e| Error::Internal(format!("failed to encode step config: {e}")))
    }

    // -----------------------------------------------------------------------
    // Create / read
    // -----------------------------------------------------------------------

    /// Create a project with its steps at indices `0..n`, in one transaction.
    pub fn create_project(
        &self,
        name: &str,
        media_type: MediaType,
        new_steps: &[NewStep],
    ) -> Result<ProjectView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("project name must not be empty".into()));
        }
        let configs = new_steps
            .iter()
            .map(|s| self.check_executor(s))
            .collect::<Result<Vec<_>>>()?;

        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;
        let project = projects::create_project(&tx, name, media_type)?;
        for (index, (step, config)) in new_steps.iter().zip(&configs).enumerate() {
            steps::insert_step(&tx, project.id, index, &step.executor, config)?;
        }
        commit(tx)?;
        drop(conn);

        info!(project_id = %project.id, steps = new_steps.len(), "Created project {name:?}");
        self.broadcast(EventPayload::ProjectCreated {
            project_id: project.id,
            name: project.name.clone(),
        });
        self.get_project(project.id)
    }

    /// Load a project with its steps, messages and derived status.
    pub fn get_project(&self, project_id: ProjectId) -> Result<ProjectView> {
        let conn = get_conn(&self.pool)?;
        let project = load_project(&conn, project_id)?;
        let rows = steps::list_steps(&conn, project_id)?;

        let mut views = Vec::with_capacity(rows.len());
        for step in rows {
            let warnings = messages::list_warnings(&conn, step.id)?;
            let errors = messages::list_errors(&conn, step.id)?;
            views.push(StepView {
                description: self.describe(&step),
                data_path: self.layout.step_paths(project_id, step.id).data(),
                step,
                warnings,
                errors,
            });
        }

        let statuses: Vec<StepStatus> = views.iter().map(|v| v.step.status).collect();
        Ok(ProjectView {
            status: project_status(project.is_finished, statuses.iter().copied()),
            next_step: if project.is_finished {
                None
            } else {
                next_step_position(statuses)
            },
            root_path: self.layout.project_dir(project_id),
            project,
            steps: views,
        })
    }

    /// Every project with its derived status, newest first.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let conn = get_conn(&self.pool)?;
        projects::list_projects(&conn)?
            .into_iter()
            .map(|project| {
                let rows = steps::list_steps(&conn, project.id)?;
                Ok(ProjectSummary {
                    status: project_status(project.is_finished, rows.iter().map(|s| s.status)),
                    step_count: rows.len(),
                    project,
                })
            })
            .collect()
    }

    fn describe(&self, step: &Step) -> String {
        let config = step.config_value().unwrap_or(serde_json::Value::Null);
        self.registry
            .describe(&step.executor_name, &config)
            .unwrap_or_else(|_| format!("{} (unregistered executor)", step.executor_name))
    }

    // -----------------------------------------------------------------------
    // Step editing
    // -----------------------------------------------------------------------

    /// Add a step after the last one.
    pub fn append_step(&self, project_id: ProjectId, new_step: &NewStep) -> Result<Step> {
        let config = self.check_executor(new_step)?;
        let step = self.with_lock(project_id, |conn, project| {
            project.ensure_not_finished()?;
            let count = steps::list_steps(conn, project_id)?.len();
            steps::insert_step(conn, project_id, count, &new_step.executor, &config)
        })?;
        info!(%project_id, step = step.index, executor = %step.executor_name, "Appended step");
        Ok(step)
    }

    /// Insert a step at `at`, shifting later steps up by one.
    ///
    /// `at` may not precede the cursor.
    pub fn insert_step(&self, project_id: ProjectId, at: usize, new_step: &NewStep) -> Result<Step> {
        let config = self.check_executor(new_step)?;
        let step = self.with_lock(project_id, |conn, project| {
            project.ensure_not_finished()?;
            let existing = steps::list_steps(conn, project_id)?;
            if at > existing.len() {
                return Err(Error::Validation(format!(
                    "cannot insert at {at}: project has {} steps",
                    existing.len()
                )));
            }
            if at < project.current_step_index {
                return Err(Error::Validation(format!(
                    "cannot insert at {at}: steps before {} have already run",
                    project.current_step_index
                )));
            }

            let tx = begin(conn)?;
            let mut step = steps::insert_step(&tx, project_id, existing.len(), &new_step.executor, &config)?;
            let mut order: Vec<StepId> = existing.iter().map(|s| s.id).collect();
            order.insert(at, step.id);
            steps::renumber_steps(&tx, project_id, &order)?;
            commit(tx)?;

            step.index = at;
            Ok(step)
        })?;
        info!(%project_id, step = at, executor = %step.executor_name, "Inserted step");
        Ok(step)
    }

    /// Remove the step at `index`, closing the gap. Its filesystem area is
    /// deleted best-effort.
    pub fn remove_step(&self, project_id: ProjectId, index: usize) -> Result<Step> {
        let removed = self.with_lock(project_id, |conn, project| {
            project.ensure_not_finished()?;
            let existing = steps::list_steps(conn, project_id)?;
            let Some(target) = existing.get(index).cloned() else {
                return Err(Error::Validation(format!(
                    "cannot remove step {index}: project has {} steps",
                    existing.len()
                )));
            };
            if index < project.current_step_index {
                return Err(Error::Validation(format!(
                    "cannot remove step {index}: steps before {} have already run",
                    project.current_step_index
                )));
            }

            let tx = begin(conn)?;
            steps::delete_step(&tx, target.id)?;
            let order: Vec<StepId> = existing
                .iter()
                .filter(|s| s.id != target.id)
                .map(|s| s.id)
                .collect();
            steps::renumber_steps(&tx, project_id, &order)?;
            commit(tx)?;
            Ok(target)
        })?;

        let area = self.layout.step_paths(project_id, removed.id);
        if let Err(e) = remove_dir_if_exists(area.root()) {
            warn!(%project_id, step_id = %removed.id, "Failed to remove step area: {e}");
        }
        info!(%project_id, step = index, "Removed step");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Reset / ack / finish / delete
    // -----------------------------------------------------------------------

    /// Return steps from `from_index` onward to `pending`, clearing their
    /// warnings, errors and filesystem areas.
    ///
    /// Steps before `from_index` are untouched. The cursor is rewound to
    /// `from_index` when it was past it. `from_index == 0` also removes the
    /// project's root area.
    pub fn reset(&self, project_id: ProjectId, from_index: usize) -> Result<ProjectView> {
        self.with_lock(project_id, |conn, project| {
            project.ensure_not_finished()?;
            let existing = steps::list_steps(conn, project_id)?;
            if from_index > existing.len() {
                return Err(Error::Validation(format!(
                    "cannot reset from {from_index}: project has {} steps",
                    existing.len()
                )));
            }

            let tx = begin(conn)?;
            for step in &existing[from_index..] {
                steps::update_step_status(&tx, step.id, StepStatus::Pending)?;
                messages::clear_messages(&tx, step.id)?;
            }
            if project.current_step_index > from_index {
                projects::set_current_step(&tx, project_id, from_index)?;
            }
            commit(tx)?;

            // Areas are removed best-effort once the rows are committed.
            for step in &existing[from_index..] {
                self.remove_area(project_id, self.layout.step_paths(project_id, step.id).root());
            }
            if from_index == 0 {
                self.remove_area(project_id, &self.layout.project_dir(project_id));
            }
            Ok(())
        })?;

        info!(%project_id, from_index, "Reset project");
        self.broadcast(EventPayload::ProjectReset {
            project_id,
            from_index,
        });
        self.get_project(project_id)
    }

    /// Mark a warning acknowledged. The step's status does not change; the
    /// next run of the step no longer stops on this warning.
    pub fn ack_warning(&self, step_id: StepId, warning_id: WarningId) -> Result<StepWarning> {
        let conn = get_conn(&self.pool)?;
        let step = steps::get_step(&conn, step_id)?.ok_or_else(|| Error::not_found("step", step_id))?;
        let warning = messages::get_warning(&conn, warning_id)?
            .filter(|w| w.step_id == step_id)
            .ok_or_else(|| Error::not_found("warning", warning_id))?;
        load_project(&conn, step.project_id)?.ensure_not_finished()?;

        messages::ack_warning(&conn, warning_id)?;
        info!(%step_id, %warning_id, "Acknowledged warning");
        self.broadcast(EventPayload::WarningAcked {
            step_id,
            warning_id,
        });
        Ok(StepWarning {
            acked: true,
            ..warning
        })
    }

    /// Make the project immutable.
    pub fn finish_project(&self, project_id: ProjectId) -> Result<Project> {
        let project = self.with_lock(project_id, |conn, project| {
            project.ensure_not_finished()?;
            if !projects::set_finished(conn, project_id)? {
                return Err(Error::finished(project_id));
            }
            load_project(conn, project_id)
        })?;
        info!(%project_id, "Finished project");
        self.broadcast(EventPayload::ProjectFinished { project_id });
        Ok(project)
    }

    /// Delete a project, its steps and messages, and its filesystem area.
    ///
    /// Allowed on finished projects.
    pub fn delete_project(&self, project_id: ProjectId) -> Result<()> {
        self.with_lock(project_id, |conn, _project| {
            projects::delete_project(conn, project_id)?;
            Ok(())
        })?;

        let root = self.layout.project_dir(project_id);
        if let Err(e) = remove_dir_if_exists(&root) {
            warn!(%project_id, "Failed to remove project area {}: {e}", root.display());
        }
        info!(%project_id, "Deleted project");
        self.broadcast(EventPayload::ProjectDeleted { project_id });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Move steps left `running` by a dead runner to `errors`.
    ///
    /// A step counts as interrupted when its project has no lease or the
    /// lease is older than the configured lease length. A live lease is
    /// never overridden, even one carrying this studio's worker id.
    pub fn recover_interrupted(&self) -> Result<Vec<Step>> {
        let mut conn = get_conn(&self.pool)?;
        let cutoff = stale_cutoff(self.lease());
        let mut recovered = Vec::new();

        for mut step in steps::list_steps_with_status(&conn, StepStatus::Running)? {
            let tx = begin(&mut conn)?;
            if !steps::fail_interrupted_step(&tx, step.id, cutoff)? {
                continue;
            }
            messages::clear_errors(&tx, step.id)?;
            messages::record_error(
                &tx,
                step.id,
                "step was interrupted while running (runner exited before recording an outcome)",
            )?;
            projects::clear_stale_lock(&tx, step.project_id, cutoff)?;
            commit(tx)?;

            warn!(
                project_id = %step.project_id,
                step = step.index,
                "Recovered interrupted step"
            );
            step.status = StepStatus::Errors;
            recovered.push(step);
        }

        Ok(recovered)
    }
}

impl std::fmt::Debug for Studio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Studio")
            .field("registry", &self.registry)
            .field("layout", &self.layout)
            .field("runner_config", &self.runner_config)
            .finish_non_exhaustive()
    }
}

fn load_project(conn: &rusqlite::Connection, project_id: ProjectId) -> Result<Project> {
    projects::get_project(conn, project_id)?.ok_or_else(|| Error::not_found("project", project_id))
}

fn begin(conn: &mut PooledConnection) -> Result<rusqlite::Transaction<'_>> {
    conn.transaction().map_err(|e| Error::database(e.to_string()))
}

fn commit(tx: rusqlite::Transaction<'_>) -> Result<()> {
    tx.commit().map_err(|e| Error::database(e.to_string()))
}
