//! Rust structs mapping to database tables.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use std::str::FromStr;

use serde::Serialize;
use us_core::{MediaType, ProjectId, StepErrorId, StepId, StepStatus, WarningId};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(T::from(uuid))
}

/// Parse a `FromStr` enum (status, media type) from a text column.
fn parse_text<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = us_core::Error>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: us_core::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_index(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<usize> {
    let n: i64 = row.get(idx)?;
    usize::try_from(n).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(e))
    })
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub media_type: MediaType,
    pub is_finished: bool,
    pub current_step_index: usize,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Project {
    /// Build from a row selected as:
    /// id, name, media_type, is_finished, current_step_index, locked_by,
    /// locked_at, created_at, updated_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            name: row.get(1)?,
            media_type: parse_text(row, 2)?,
            is_finished: row.get(3)?,
            current_step_index: parse_index(row, 4)?,
            locked_by: row.get(5)?,
            locked_at: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Fail with [`us_core::Error::ProjectFinished`] once the project is
    /// finished.
    pub fn ensure_not_finished(&self) -> us_core::Result<()> {
        if self.is_finished {
            return Err(us_core::Error::finished(self.id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: StepId,
    pub project_id: ProjectId,
    pub index: usize,
    pub status: StepStatus,
    pub executor_name: String,
    /// Executor configuration, stored exactly as given.
    pub executor_config: String,
    /// Handoff blob forwarded unchanged to the next step.
    pub metadata: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Step {
    /// Build from a row selected as:
    /// id, project_id, step_index, status, executor_name, executor_config,
    /// metadata, created_at, updated_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            project_id: parse_id(row, 1)?,
            index: parse_index(row, 2)?,
            status: parse_text(row, 3)?,
            executor_name: row.get(4)?,
            executor_config: row.get(5)?,
            metadata: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    /// Parse the stored executor configuration.
    pub fn config_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_str(&self.executor_config)
    }
}

// ---------------------------------------------------------------------------
// StepWarning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepWarning {
    pub id: WarningId,
    pub step_id: StepId,
    pub message: String,
    pub acked: bool,
    pub created_at: String,
}

impl StepWarning {
    /// Build from a row selected as: id, step_id, message, acked, created_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            step_id: parse_id(row, 1)?,
            message: row.get(2)?,
            acked: row.get(3)?,
            created_at: row.get(4)?,
        })
    }
}

// ---------------------------------------------------------------------------
// StepError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepError {
    pub id: StepErrorId,
    pub step_id: StepId,
    pub message: String,
    pub created_at: String,
}

impl StepError {
    /// Build from a row selected as: id, step_id, message, created_at
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            step_id: parse_id(row, 1)?,
            message: row.get(2)?,
            created_at: row.get(3)?,
        })
    }
}
