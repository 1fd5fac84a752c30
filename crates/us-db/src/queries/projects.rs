//! Project operations, including the per-project run lease.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use us_core::{Error, MediaType, ProjectId, Result};

use crate::models::Project;

const COLS: &str = "id, name, media_type, is_finished, current_step_index,
    locked_by, locked_at, created_at, updated_at";

/// Create a new project with no steps.
pub fn create_project(conn: &Connection, name: &str, media_type: MediaType) -> Result<Project> {
    let id = ProjectId::new();
    let now = super::now();

    conn.execute(
        "INSERT INTO projects (id, name, media_type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        rusqlite::params![id.to_string(), name, media_type.to_string(), &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(Project {
        id,
        name: name.to_string(),
        media_type,
        is_finished: false,
        current_step_index: 0,
        locked_by: None,
        locked_at: None,
        created_at: now.clone(),
        updated_at: now,
    })
}

/// Get a project by ID.
pub fn get_project(conn: &Connection, id: ProjectId) -> Result<Option<Project>> {
    let q = format!("SELECT {COLS} FROM projects WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], Project::from_row);
    match result {
        Ok(p) => Ok(Some(p)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List all projects, newest first.
pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let q = format!("SELECT {COLS} FROM projects ORDER BY created_at DESC, rowid DESC");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], Project::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Move the execution cursor.
pub fn set_current_step(conn: &Connection, id: ProjectId, index: usize) -> Result<bool> {
    let now = super::now();
    let n = conn
        .execute(
            "UPDATE projects SET current_step_index = ?1, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![index as i64, now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Mark a project finished. Returns `false` if it was already finished.
pub fn set_finished(conn: &Connection, id: ProjectId) -> Result<bool> {
    let now = super::now();
    let n = conn
        .execute(
            "UPDATE projects SET is_finished = 1, updated_at = ?1
             WHERE id = ?2 AND is_finished = 0",
            rusqlite::params![now, id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Delete a project. Steps, warnings and errors cascade.
pub fn delete_project(conn: &Connection, id: ProjectId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM projects WHERE id = ?1", [id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Atomically claim the run lease on a project.
///
/// Succeeds when the project is unlocked or its lease was taken before
/// `stale_before`. Returns `false` when another worker holds a live lease.
pub fn acquire_lock(
    conn: &Connection,
    id: ProjectId,
    worker: &str,
    stale_before: DateTime<Utc>,
) -> Result<bool> {
    let now = super::now();
    let n = conn
        .execute(
            "UPDATE projects SET locked_by = ?1, locked_at = ?2
             WHERE id = ?3 AND (locked_by IS NULL OR locked_at < ?4)",
            rusqlite::params![worker, now, id.to_string(), super::timestamp(stale_before)],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Release a lease held by `worker`.
pub fn release_lock(conn: &Connection, id: ProjectId, worker: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE projects SET locked_by = NULL, locked_at = NULL
             WHERE id = ?1 AND locked_by = ?2",
            rusqlite::params![id.to_string(), worker],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Clear a lease taken before `stale_before`. A live lease is left alone,
/// whoever holds it.
pub fn clear_stale_lock(conn: &Connection, id: ProjectId, stale_before: DateTime<Utc>) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE projects SET locked_by = NULL, locked_at = NULL
             WHERE id = ?1 AND locked_by IS NOT NULL AND locked_at < ?2",
            rusqlite::params![id.to_string(), super::timestamp(stale_before)],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
