//! Executor registry: name to [`Executor`] lookup.
//!
//! Populated once through [`ExecutorRegistryBuilder`] during startup, then
//! frozen and shared read-only (`Arc<ExecutorRegistry>`) by the runner and
//! the service.

use std::collections::HashMap;
use std::sync::Arc;

use us_core::config::ExecutorsConfig;
use us_core::{Error, Result};

use crate::executor::Executor;
use crate::executors::{ExecExecutor, MarkFinishedExecutor};
use crate::template::TemplateContext;

/// Collects executors before the registry is frozen.
#[derive(Default)]
pub struct ExecutorRegistryBuilder {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor under its own name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if the name is empty or already taken.
    pub fn register<E: Executor + 'static>(&mut self, executor: E) -> Result<()> {
        self.register_arc(Arc::new(executor))
    }

    /// Register an already shared executor.
    pub fn register_arc(&mut self, executor: Arc<dyn Executor>) -> Result<()> {
        let name = executor.name().trim();
        if name.is_empty() {
            return Err(Error::Registry("executor has no name".into()));
        }
        if self.executors.contains_key(name) {
            return Err(Error::Registry(format!(
                "executor `{name}` is already registered"
            )));
        }
        let name = name.to_string();
        tracing::debug!(executor = %name, "Registered executor");
        self.executors.insert(name, executor);
        Ok(())
    }

    /// Register the built-in `exec` and `mark_finished` executors.
    pub fn register_builtins(&mut self, config: &ExecutorsConfig) -> Result<()> {
        self.register(ExecExecutor::new(config.exec.allowed_commands.clone()))?;
        self.register(MarkFinishedExecutor)?;
        Ok(())
    }

    /// Freeze the registry.
    pub fn build(self) -> ExecutorRegistry {
        ExecutorRegistry {
            executors: self.executors,
        }
    }
}

/// Read-only executor lookup.
pub struct ExecutorRegistry {
    executors: HashMap<String, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    pub fn builder() -> ExecutorRegistryBuilder {
        ExecutorRegistryBuilder::new()
    }

    /// A registry holding only the built-in executors.
    pub fn with_builtins(config: &ExecutorsConfig) -> Result<Self> {
        let mut builder = Self::builder();
        builder.register_builtins(config)?;
        Ok(builder.build())
    }

    /// Look up an executor by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown names.
    pub fn lookup(&self, name: &str) -> Result<Arc<dyn Executor>> {
        self.executors
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("executor", name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.executors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    /// Describe a step: the executor's description template filled from the
    /// step configuration.
    pub fn describe(&self, name: &str, config: &serde_json::Value) -> Result<String> {
        let executor = self.lookup(name)?;
        Ok(TemplateContext::from_config(config).substitute(executor.description()))
    }
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("executors", &self.names())
            .finish()
    }
}
