//! Wiring shared by every CLI command.

use std::sync::Arc;

use anyhow::{Context, Result};
use us_core::config::Config;
use us_core::events::EventBus;
use us_db::pool::{init_pool, DbPool};
use us_pipeline::{ExecutorRegistry, Layout, StepsRunner, Studio};

/// Fully constructed application: database, executors and services.
pub struct App {
    pub config: Config,
    pub db: DbPool,
    pub registry: Arc<ExecutorRegistry>,
    pub events: Arc<EventBus>,
    pub studio: Studio,
}

impl App {
    /// Open the database named by the config and register the built-in
    /// executors.
    pub fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.storage.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        tracing::info!("Opening database at {}", config.storage.db_path.display());
        let db = init_pool(&config.storage.db_path)
            .with_context(|| format!("Failed to open database {:?}", config.storage.db_path))?;

        let registry = ExecutorRegistry::with_builtins(&config.executors)
            .context("Failed to register executors")?;
        Ok(Self::with_parts(config, db, registry))
    }

    /// Assemble from an existing pool and registry.
    pub fn with_parts(config: Config, db: DbPool, registry: ExecutorRegistry) -> Self {
        let registry = Arc::new(registry);
        let events = Arc::new(EventBus::default());
        let studio = Studio::new(
            db.clone(),
            Arc::clone(&registry),
            Layout::new(&config.storage.media_root),
        )
        .with_runner_config(&config.runner)
        .with_events(Arc::clone(&events));

        Self {
            config,
            db,
            registry,
            events,
            studio,
        }
    }

    pub fn runner(&self) -> StepsRunner {
        self.studio.runner()
    }

    /// Move steps left `running` by a previous process to `errors`.
    pub fn recover(&self) -> Result<usize> {
        let recovered = self
            .studio
            .recover_interrupted()
            .context("Failed to recover interrupted steps")?;
        if !recovered.is_empty() {
            tracing::info!(
                "Recovered {} interrupted step(s) from a previous session",
                recovered.len()
            );
        }
        Ok(recovered.len())
    }
}
