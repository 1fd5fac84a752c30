//! The steps runner: executes a project's steps one at a time.
//!
//! A run marks the step `running` (committed immediately so observers see it),
//! copies the previous step's metadata forward, invokes the executor without
//! holding a database connection, then commits the outcome in one
//! transaction. Any failure, including an executor panic, leaves the step in
//! `errors` with exactly one recorded diagnostic.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tracing::{debug, error, info};
use us_core::config::RunnerConfig;
use us_core::events::{EventBus, EventPayload};
use us_core::{Error, ProjectId, Result, StepStatus};
use us_db::models::{Project, Step};
use us_db::pool::{get_conn, DbPool, PooledConnection};
use us_db::queries::{messages, projects, steps};

use crate::executor::{Executor, StepContext};
use crate::layout::Layout;
use crate::lock::ProjectLock;
use crate::registry::ExecutorRegistry;

/// Why a step run failed, rendered as the diagnostic stored on the step.
#[derive(Debug)]
struct Failure(String);

impl Failure {
    fn from_anyhow(err: &anyhow::Error) -> Self {
        // Debug form carries the cause chain and, when captured, the backtrace.
        Self(format!("{err:?}"))
    }

    fn from_error(err: &Error) -> Self {
        Self(err.to_string())
    }

    fn from_panic(executor: &str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self(format!("executor `{executor}` panicked: {message}"))
    }

    fn summary(&self) -> &str {
        self.0.lines().next().unwrap_or_default()
    }
}

/// Drives steps of a project through their executors.
pub struct StepsRunner {
    pool: DbPool,
    registry: Arc<ExecutorRegistry>,
    layout: Layout,
    worker_id: String,
    lease: Duration,
    events: Option<Arc<EventBus>>,
}

impl StepsRunner {
    pub fn new(pool: DbPool, registry: Arc<ExecutorRegistry>, layout: Layout) -> Self {
        let defaults = RunnerConfig::default();
        Self {
            pool,
            registry,
            layout,
            worker_id: defaults.worker_id.clone(),
            lease: defaults.lock_lease(),
            events: None,
        }
    }

    /// Apply worker identity and lease length.
    pub fn with_runner_config(mut self, config: &RunnerConfig) -> Self {
        self.worker_id = config.worker_id.clone();
        self.lease = config.lock_lease();
        self
    }

    /// Broadcast lifecycle events on `bus`.
    pub fn with_events(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    fn broadcast(&self, payload: EventPayload) {
        if let Some(ref bus) = self.events {
            bus.broadcast(payload);
        }
    }

    /// Run the step at the project's cursor once, without advancing.
    ///
    /// Executor failures are not errors of this call: they are recorded on
    /// the returned step, which ends in `errors`.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the project does not exist.
    /// - [`Error::ProjectFinished`] if the project is finished.
    /// - [`Error::Validation`] if the cursor is past the last step.
    /// - [`Error::Conflict`] if another runner holds the project.
    pub fn run_one(&self, project_id: ProjectId) -> Result<Step> {
        let lock = ProjectLock::acquire(&self.pool, project_id, &self.worker_id, self.lease)?;

        let (project, steps) = self.load(project_id)?;
        let index = project.current_step_index;
        if index >= steps.len() {
            return Err(Error::Validation(format!(
                "project {project_id} has no step to run (cursor {index}, {} steps)",
                steps.len()
            )));
        }
        let step = self.run_step(&project, &steps, index)?;

        lock.release()?;
        Ok(step)
    }

    /// Run steps from the cursor onward, advancing past each step that ends
    /// `complete`.
    ///
    /// Stops at the first step ending in any other status, or when no steps
    /// remain. Returns the steps run by this call in order; the last one is
    /// where execution stopped.
    pub fn run_all(&self, project_id: ProjectId) -> Result<Vec<Step>> {
        let lock = ProjectLock::acquire(&self.pool, project_id, &self.worker_id, self.lease)?;
        let mut ran = Vec::new();

        loop {
            let (project, steps) = self.load(project_id)?;
            let index = project.current_step_index;
            if index >= steps.len() {
                debug!(%project_id, "No steps left to run");
                break;
            }

            let step = self.run_step(&project, &steps, index)?;
            let advance = step.status == StepStatus::Complete;
            ran.push(step);
            if !advance {
                break;
            }

            let conn = get_conn(&self.pool)?;
            projects::set_current_step(&conn, project_id, index + 1)?;
            self.broadcast(EventPayload::ProjectAdvanced {
                project_id,
                current_step_index: index + 1,
            });
        }

        lock.release()?;
        Ok(ran)
    }

    fn load(&self, project_id: ProjectId) -> Result<(Project, Vec<Step>)> {
        let conn = get_conn(&self.pool)?;
        let project = projects::get_project(&conn, project_id)?
            .ok_or_else(|| Error::not_found("project", project_id))?;
        project.ensure_not_finished()?;
        let steps = steps::list_steps(&conn, project_id)?;
        Ok((project, steps))
    }

    fn run_step(&self, project: &Project, steps: &[Step], index: usize) -> Result<Step> {
        let mut step = steps[index].clone();
        let prev = index.checked_sub(1).map(|i| &steps[i]);

        {
            let conn = get_conn(&self.pool)?;
            steps::update_step_status(&conn, step.id, StepStatus::Running)?;
        }
        step.status = StepStatus::Running;

        info!(
            project_id = %project.id,
            step = index,
            executor = %step.executor_name,
            "Running step"
        );
        self.broadcast(EventPayload::StepStarted {
            project_id: project.id,
            step_id: step.id,
            index,
            executor: step.executor_name.clone(),
        });

        match self.execute(project, step.clone(), prev) {
            Ok(done) => {
                info!(
                    project_id = %project.id,
                    step = index,
                    status = %done.status,
                    "Step finished"
                );
                self.broadcast(EventPayload::StepCompleted {
                    project_id: project.id,
                    step_id: done.id,
                    index,
                    status: done.status,
                });
                Ok(done)
            }
            Err(failure) => {
                error!(
                    project_id = %project.id,
                    step = index,
                    executor = %step.executor_name,
                    "Step failed: {}",
                    failure.summary()
                );
                self.record_failure(&mut step, &failure)?;
                self.broadcast(EventPayload::StepFailed {
                    project_id: project.id,
                    step_id: step.id,
                    index,
                    error: failure.summary().to_string(),
                });
                Ok(step)
            }
        }
    }

    /// Invoke the executor and commit its outcome.
    fn execute(
        &self,
        project: &Project,
        mut step: Step,
        prev: Option<&Step>,
    ) -> std::result::Result<Step, Failure> {
        if let Some(prev) = prev {
            step.metadata = prev.metadata.clone();
        }

        let executor = self
            .registry
            .lookup(&step.executor_name)
            .map_err(|e| Failure::from_error(&e))?;
        let config = step
            .config_value()
            .with_context(|| format!("step {} has an invalid executor configuration", step.index))
            .map_err(|e| Failure::from_anyhow(&e))?;

        let paths = self.layout.step_paths(project.id, step.id);
        let prev_paths = prev.map(|p| self.layout.step_paths(project.id, p.id));
        let mut ctx = StepContext::new(project, step, prev, config, paths, prev_paths);

        invoke(executor.as_ref(), &mut ctx)?;

        let (step, warnings) = ctx.into_parts();
        self.persist_success(step, &warnings)
            .map_err(|e| Failure::from_error(&e))
    }

    fn persist_success(&self, mut step: Step, warnings: &[String]) -> Result<Step> {
        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;

        let mut unacked = false;
        for message in warnings {
            let warning = messages::add_warning(&tx, step.id, message)?;
            unacked |= !warning.acked;
        }
        if step.status == StepStatus::Running {
            step.status = if unacked {
                StepStatus::Warnings
            } else {
                StepStatus::Complete
            };
        }

        messages::clear_errors(&tx, step.id)?;
        steps::save_step_result(&tx, step.id, step.status, &step.metadata)?;
        tx.commit().map_err(|e| Error::database(e.to_string()))?;
        Ok(step)
    }

    /// Replace the step's errors with `failure` and mark it `errors`.
    ///
    /// Nothing the executor did is persisted: its status, metadata and
    /// warnings were only ever held in memory.
    fn record_failure(&self, step: &mut Step, failure: &Failure) -> Result<()> {
        let mut conn = get_conn(&self.pool)?;
        let tx = begin(&mut conn)?;
        messages::clear_errors(&tx, step.id)?;
        messages::record_error(&tx, step.id, &failure.0)?;
        steps::update_step_status(&tx, step.id, StepStatus::Errors)?;
        tx.commit().map_err(|e| Error::database(e.to_string()))?;

        step.status = StepStatus::Errors;
        Ok(())
    }
}

fn begin(conn: &mut PooledConnection) -> Result<rusqlite::Transaction<'_>> {
    conn.transaction().map_err(|e| Error::database(e.to_string()))
}

fn invoke(executor: &dyn Executor, ctx: &mut StepContext<'_>) -> std::result::Result<(), Failure> {
    match panic::catch_unwind(AssertUnwindSafe(|| executor.run(ctx))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(Failure::from_anyhow(&err)),
        Err(payload) => Err(Failure::from_panic(executor.name(), payload.as_ref())),
    }
}

impl std::fmt::Debug for StepsRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepsRunner")
            .field("registry", &self.registry)
            .field("layout", &self.layout)
            .field("worker_id", &self.worker_id)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}
