//! Built-in executors.

mod exec;
mod mark_finished;

pub use exec::ExecExecutor;
pub use mark_finished::MarkFinishedExecutor;
