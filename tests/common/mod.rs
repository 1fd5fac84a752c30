//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an [`App`] over an in-memory (or
//! temp-file) database, a temp media root, the built-in executors and the
//! scriptable [`ScriptExecutor`].

#![allow(dead_code)]

use std::path::PathBuf;

use anyhow::bail;
use serde::Deserialize;
use tempfile::TempDir;

use upload_studio::app::App;
use us_core::config::Config;
use us_core::{MediaType, ProjectId, StepStatus};
use us_db::pool::{init_memory_pool, init_pool, DbPool};
use us_pipeline::{
    Executor, ExecutorRegistry, ExecutorRegistryBuilder, NewStep, ProjectView, StepContext,
    StepView, StepsRunner, Studio,
};

/// Test harness wrapping a fully-constructed [`App`].
pub struct TestHarness {
    pub app: App,
    pub db: DbPool,
    pub media: TempDir,
}

impl TestHarness {
    /// In-memory database, built-ins plus [`ScriptExecutor`].
    pub fn new() -> Self {
        Self::with_executors(|_| {})
    }

    /// Like [`TestHarness::new`] with extra executors registered by `extra`.
    pub fn with_executors(extra: impl FnOnce(&mut ExecutorRegistryBuilder)) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        Self::build(db, None, extra)
    }

    /// File-backed database, for tests that share it across threads.
    pub fn with_file_db(extra: impl FnOnce(&mut ExecutorRegistryBuilder)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = init_pool(&dir.path().join("studio.db")).expect("failed to create pool");
        Self::build(db, Some(dir), extra)
    }

    fn build(
        db: DbPool,
        dir: Option<TempDir>,
        extra: impl FnOnce(&mut ExecutorRegistryBuilder),
    ) -> Self {
        let media = match dir {
            Some(dir) => dir,
            None => tempfile::tempdir().expect("failed to create temp dir"),
        };

        let mut config = Config::default();
        config.storage.media_root = media.path().join("media");
        config.runner.worker_id = "test-worker".into();

        let mut builder = ExecutorRegistry::builder();
        builder
            .register_builtins(&config.executors)
            .expect("failed to register built-ins");
        builder
            .register(ScriptExecutor)
            .expect("failed to register script executor");
        extra(&mut builder);

        let app = App::with_parts(config, db.clone(), builder.build());
        Self { app, db, media }
    }

    pub fn studio(&self) -> &Studio {
        &self.app.studio
    }

    pub fn runner(&self) -> StepsRunner {
        self.app.runner()
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> us_db::pool::PooledConnection {
        us_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Create a music project with the given steps.
    pub fn create(&self, steps: &[NewStep]) -> ProjectId {
        self.studio()
            .create_project("Test Album", MediaType::Music, steps)
            .expect("failed to create project")
            .project
            .id
    }

    pub fn view(&self, project_id: ProjectId) -> ProjectView {
        self.studio()
            .get_project(project_id)
            .expect("failed to load project")
    }

    pub fn step(&self, project_id: ProjectId, index: usize) -> StepView {
        self.view(project_id).steps.swap_remove(index)
    }

    pub fn statuses(&self, project_id: ProjectId) -> Vec<StepStatus> {
        self.view(project_id)
            .steps
            .iter()
            .map(|s| s.step.status)
            .collect()
    }

    pub fn project_root(&self, project_id: ProjectId) -> PathBuf {
        self.view(project_id).root_path
    }
}

// ---------------------------------------------------------------------------
// Scriptable executor
// ---------------------------------------------------------------------------

/// What [`ScriptExecutor`] does, decoded from the step configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Script {
    /// `complete` (leave running), `warn`, `fail`, `panic`, `finish`, `errors`.
    pub outcome: String,
    pub warning: Option<String>,
    /// Replace the handoff metadata.
    pub metadata: Option<String>,
    /// Create this file in the data area.
    pub write: Option<String>,
}

/// Test executor whose behaviour is driven entirely by its configuration.
///
/// Always records the metadata it received in `data/seen_metadata`.
pub struct ScriptExecutor;

impl Executor for ScriptExecutor {
    fn name(&self) -> &str {
        "script"
    }

    fn description(&self) -> &str {
        "Script ending in {outcome}"
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        let script: Script = ctx.config_as()?;
        let data = ctx.data_dir()?;
        std::fs::write(data.join("seen_metadata"), ctx.metadata())?;
        if let Some(ref name) = script.write {
            std::fs::write(data.join(name), b"artifact")?;
        }
        if let Some(ref metadata) = script.metadata {
            ctx.set_metadata(metadata.clone());
        }

        match script.outcome.as_str() {
            "" | "complete" => {}
            "warn" => ctx.add_warning(script.warning.unwrap_or_else(|| "check me".into())),
            "fail" => bail!("scripted failure"),
            "panic" => panic!("scripted panic"),
            "finish" => ctx.set_status(StepStatus::Finished),
            "errors" => ctx.set_status(StepStatus::Errors),
            other => bail!("unknown scripted outcome {other}"),
        }
        Ok(())
    }
}

/// A `script` step with the given JSON configuration.
pub fn script(config: serde_json::Value) -> NewStep {
    NewStep::new("script", config)
}

/// A `script` step that completes.
pub fn ok_step() -> NewStep {
    script(serde_json::json!({}))
}
