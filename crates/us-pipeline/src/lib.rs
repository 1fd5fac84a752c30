//! # us-pipeline
//!
//! The staged execution pipeline behind upload-studio.
//!
//! - **[`Executor`]** trait: one pluggable unit of work, run against a
//!   [`StepContext`].
//! - **[`ExecutorRegistry`]**: name to executor lookup, populated once at
//!   startup and then frozen.
//! - **[`StepsRunner`]**: runs the step at a project's cursor (`run_one`) or
//!   keeps going while steps complete (`run_all`), capturing any executor
//!   failure as a persisted error.
//! - **[`Studio`]**: project creation, inspection, step editing, reset,
//!   warning acknowledgment, finishing, deletion and crash recovery.
//! - **Built-in executors** ([`executors`]): `exec`, `mark_finished`.

pub mod executor;
pub mod executors;
pub mod layout;
pub mod lock;
pub mod registry;
pub mod runner;
pub mod studio;
pub mod template;

// Re-export key types at the crate root.
pub use executor::{Executor, StepContext};
pub use layout::{Layout, StepPaths};
pub use lock::ProjectLock;
pub use registry::{ExecutorRegistry, ExecutorRegistryBuilder};
pub use runner::StepsRunner;
pub use studio::{NewStep, ProjectSummary, ProjectView, StepView, Studio};
pub use template::TemplateContext;
