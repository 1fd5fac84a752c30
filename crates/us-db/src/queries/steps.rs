//! Project step operations.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use us_core::{Error, ProjectId, Result, StepId, StepStatus};

use crate::models::Step;

const COLS: &str = "id, project_id, step_index, status, executor_name,
    executor_config, metadata, created_at, updated_at";

/// Insert a new `pending` step at `index`.
///
/// The caller is responsible for keeping indices contiguous (see
/// [`renumber_steps`]).
pub fn insert_step(
    conn: &Connection,
    project_id: ProjectId,
    index: usize,
    executor_name: &str,
    executor_config: &str,
) -> Result<Step> {
    let id = StepId::new();
    let now = super::now();
    let metadata = "{}";

    conn.execute(
        "INSERT INTO project_steps
            (id, project_id, step_index, status, executor_name, executor_config,
             metadata, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?5, ?6, ?7, ?7)",
        rusqlite::params![
            id.to_string(),
            project_id.to_string(),
            index as i64,
            executor_name,
            executor_config,
            metadata,
            &now
        ],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Step {
        id,
        project_id,
        index,
        status: StepStatus::Pending,
        executor_name: executor_name.to_string(),
        executor_config: executor_config.to_string(),
        metadata: metadata.to_string(),
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get a step by ID.
pub fn get_step(conn: &Connection, id: StepId) -> Result<Option<Step>> {
    let q = format!("SELECT {COLS} FROM project_steps WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Step::from_row);
    match result {
        Ok(s) => Ok(Some(s)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List a project's steps ordered by index.
pub fn list_steps(conn: &Connection, project_id: ProjectId) -> Result<Vec<Step>> {
    let q = format!("SELECT {COLS} FROM project_steps WHERE project_id = ?1 ORDER BY step_index");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([project_id.to_string()], Step::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// List steps across all projects that are in `status`.
pub fn list_steps_with_status(conn: &Connection, status: StepStatus) -> Result<Vec<Step>> {
    let q = format!("SELECT {COLS} FROM project_steps WHERE status = ?1 ORDER BY project_id, step_index");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([status.as_str()], Step::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Update only a step's status.
pub fn update_step_status(conn: &Connection, id: StepId, status: StepStatus) -> Result<bool> {
    let now = super::now();
    let n = conn
        .execute(
            "UPDATE project_steps SET status = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![status.as_str(), now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Persist the outcome of a run: status and handoff metadata.
pub fn save_step_result(
    conn: &Connection,
    id: StepId,
    status: StepStatus,
    metadata: &str,
) -> Result<bool> {
    let now = super::now();
    let n = conn
        .execute(
            "UPDATE project_steps SET status = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status.as_str(), metadata, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Move a `running` step to `errors` if no live lease covers its project.
///
/// A lease is live when it is held and was taken at or after
/// `stale_before`. Check and update are one statement, so a run that holds
/// the lease is never touched. Returns whether the step was moved.
pub fn fail_interrupted_step(
    conn: &Connection,
    id: StepId,
    stale_before: DateTime<Utc>,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE project_steps SET status = ?1, updated_at = ?2
             WHERE id = ?3 AND status = ?4
               AND project_id IN (
                   SELECT id FROM projects
                   WHERE locked_by IS NULL OR locked_at IS NULL OR locked_at < ?5
               )",
            rusqlite::params![
                StepStatus::Errors.as_str(),
                super::now(),
                id.to_string(),
                StepStatus::Running.as_str(),
                super::timestamp(stale_before)
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a step. Its warnings and errors cascade.
pub fn delete_step(conn: &Connection, id: StepId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM project_steps WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Rewrite the indices of a project's steps to `0..ordered.len()` following
/// the order of `ordered`.
///
/// Runs in two phases (negative scratch indices first) so the
/// `(project_id, step_index)` uniqueness constraint holds at every statement.
/// Call inside a transaction so the sequence is never observed half-written.
pub fn renumber_steps(conn: &Connection, project_id: ProjectId, ordered: &[StepId]) -> Result<()> {
    let mut stmt = conn
        .prepare("UPDATE project_steps SET step_index = ?1 WHERE id = ?2 AND project_id = ?3")
        .map_err(|e| Error::database(e.to_string()))?;

    for (index, id) in ordered.iter().enumerate() {
        let scratch = -(index as i64) - 1;
        stmt.execute(rusqlite::params![scratch, id.to_string(), project_id.to_string()])
            .map_err(|e| Error::database(e.to_string()))?;
    }
    for (index, id) in ordered.iter().enumerate() {
        stmt.execute(rusqlite::params![index as i64, id.to_string(), project_id.to_string()])
            .map_err(|e| Error::database(e.to_string()))?;
    }

    Ok(())
}
