//! Terminal executor that marks its step `finished`.

use us_core::StepStatus;

use crate::executor::{Executor, StepContext};

/// Ends a pipeline: the step reports `finished`, after which the project
/// reports `finished` regardless of later steps.
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkFinishedExecutor;

impl Executor for MarkFinishedExecutor {
    fn name(&self) -> &str {
        "mark_finished"
    }

    fn description(&self) -> &str {
        "Mark the upload as finished"
    }

    fn run(&self, ctx: &mut StepContext<'_>) -> anyhow::Result<()> {
        tracing::info!(project_id = %ctx.project().id, "Marking upload finished");
        ctx.set_status(StepStatus::Finished);
        Ok(())
    }
}
