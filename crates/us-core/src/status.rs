//! Step status state machine and the derived project status.
//!
//! Enums serialize in lowercase and implement `Display`/`FromStr` so they can
//! be stored as TEXT columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ---------------------------------------------------------------------------
// StepStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a single step.
///
/// `pending → running → {complete | warnings | errors}`. `warnings` and
/// `errors` may be re-run. `finished` marks the end of the pipeline even when
/// more steps are defined after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Warnings,
    Errors,
    Complete,
    Finished,
}

impl StepStatus {
    /// All statuses, in declaration order.
    pub const ALL: [StepStatus; 6] = [
        Self::Pending,
        Self::Running,
        Self::Warnings,
        Self::Errors,
        Self::Complete,
        Self::Finished,
    ];

    /// The lowercase name used for storage and display.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Warnings => "warnings",
            Self::Errors => "errors",
            Self::Complete => "complete",
            Self::Finished => "finished",
        }
    }

    /// Whether a step in this status still needs attention before the
    /// pipeline can move past it.
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Running | Self::Warnings | Self::Errors
        )
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("unknown step status: {s}")))
    }
}

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Kind of media a project carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    #[default]
    Music,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Music => write!(f, "music"),
        }
    }
}

impl FromStr for MediaType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "music" => Ok(Self::Music),
            other => Err(Error::Validation(format!("unknown media type: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Derived project status
// ---------------------------------------------------------------------------

/// Position of the next step that needs to run, scanning in index order.
///
/// `complete` steps are skipped; a `finished` step ends the scan with no
/// next step.
pub fn next_step_position<I>(statuses: I) -> Option<usize>
where
    I: IntoIterator<Item = StepStatus>,
{
    for (pos, status) in statuses.into_iter().enumerate() {
        match status {
            StepStatus::Complete => continue,
            StepStatus::Finished => return None,
            _ => return Some(pos),
        }
    }
    None
}

/// Status reported for a whole project.
///
/// Always recomputed from the current step statuses; there is no persisted
/// project status.
pub fn project_status<I>(is_finished: bool, statuses: I) -> StepStatus
where
    I: IntoIterator<Item = StepStatus>,
{
    if is_finished {
        return StepStatus::Finished;
    }
    let statuses: Vec<StepStatus> = statuses.into_iter().collect();
    match next_step_position(statuses.iter().copied()) {
        Some(pos) => statuses[pos],
        None => StepStatus::Complete,
    }
}
