//! Warnings and errors recorded against steps.

use rusqlite::Connection;
use us_core::{Error, Result, StepErrorId, StepId, WarningId};

use crate::models::{StepError, StepWarning};

const WARNING_COLS: &str = "id, step_id, message, acked, created_at";
const ERROR_COLS: &str = "id, step_id, message, created_at";

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Record a warning on a step.
///
/// Messages are unique per step: raising the same message again returns the
/// existing row, keeping its `acked` flag.
pub fn add_warning(conn: &Connection, step_id: StepId, message: &str) -> Result<StepWarning> {
    let now = super::now();
    conn.execute(
        "INSERT INTO step_warnings (id, step_id, message, acked, created_at)
         VALUES (?1, ?2, ?3, 0, ?4)
         ON CONFLICT (step_id, message) DO NOTHING",
        rusqlite::params![WarningId::new().to_string(), step_id.to_string(), message, now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    let q = format!("SELECT {WARNING_COLS} FROM step_warnings WHERE step_id = ?1 AND message = ?2");
    conn.query_row(&q, rusqlite::params![step_id.to_string(), message], StepWarning::from_row)
        .map_err(|e| Error::database(e.to_string()))
}

/// Get a warning by ID.
pub fn get_warning(conn: &Connection, id: WarningId) -> Result<Option<StepWarning>> {
    let q = format!("SELECT {WARNING_COLS} FROM step_warnings WHERE id = ?1");
    let result = conn.query_row(&q, [id.to_string()], StepWarning::from_row);
    match result {
        Ok(w) => Ok(Some(w)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// List a step's warnings, oldest first.
pub fn list_warnings(conn: &Connection, step_id: StepId) -> Result<Vec<StepWarning>> {
    let q = format!("SELECT {WARNING_COLS} FROM step_warnings WHERE step_id = ?1 ORDER BY created_at, rowid");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([step_id.to_string()], StepWarning::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Mark a warning acknowledged.
pub fn ack_warning(conn: &Connection, id: WarningId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE step_warnings SET acked = 1 WHERE id = ?1",
            [id.to_string()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Record an error diagnostic on a step.
pub fn record_error(conn: &Connection, step_id: StepId, message: &str) -> Result<StepError> {
    let id = StepErrorId::new();
    let now = super::now();
    conn.execute(
        "INSERT INTO step_errors (id, step_id, message, created_at) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![id.to_string(), step_id.to_string(), message, &now],
    )
    .map_err(|e| Error::database(e.to_string()))?;

    Ok(StepError {
        id,
        step_id,
        message: message.to_string(),
        created_at: now,
    })
}

/// List a step's errors, oldest first.
pub fn list_errors(conn: &Connection, step_id: StepId) -> Result<Vec<StepError>> {
    let q = format!("SELECT {ERROR_COLS} FROM step_errors WHERE step_id = ?1 ORDER BY created_at, rowid");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([step_id.to_string()], StepError::from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Delete every error recorded on a step. Returns the number removed.
pub fn clear_errors(conn: &Connection, step_id: StepId) -> Result<usize> {
    conn.execute("DELETE FROM step_errors WHERE step_id = ?1", [step_id.to_string()])
        .map_err(|e| Error::database(e.to_string()))
}

/// Delete every warning and error recorded on a step.
pub fn clear_messages(conn: &Connection, step_id: StepId) -> Result<usize> {
    let warnings = conn
        .execute("DELETE FROM step_warnings WHERE step_id = ?1", [step_id.to_string()])
        .map_err(|e| Error::database(e.to_string()))?;
    let errors = clear_errors(conn, step_id)?;
    Ok(warnings + errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use crate::queries::{projects, steps};
    use us_core::MediaType;

    fn setup() -> (crate::pool::DbPool, StepId) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let project = projects::create_project(&conn, "A", MediaType::Music).unwrap();
        let step = steps::insert_step(&conn, project.id, 0, "a", "{}").unwrap();
        drop(conn);
        (pool, step.id)
    }

    #[test]
    fn warnings_are_unique_per_step() {
        let (pool, step_id) = setup();
        let conn = pool.get().unwrap();

        let first = add_warning(&conn, step_id, "low bitrate").unwrap();
        let again = add_warning(&conn, step_id, "low bitrate").unwrap();
        assert_eq!(first.id, again.id);
        add_warning(&conn, step_id, "missing cover").unwrap();

        let all = list_warnings(&conn, step_id).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "low bitrate");
    }

    #[test]
    fn ack_survives_reraise() {
        let (pool, step_id) = setup();
        let conn = pool.get().unwrap();

        let warning = add_warning(&conn, step_id, "low bitrate").unwrap();
        assert!(!warning.acked);
        assert!(ack_warning(&conn, warning.id).unwrap());

        let reraised = add_warning(&conn, step_id, "low bitrate").unwrap();
        assert!(reraised.acked);
        assert!(get_warning(&conn, warning.id).unwrap().unwrap().acked);
    }

    #[test]
    fn errors_record_and_clear() {
        let (pool, step_id) = setup();
        let conn = pool.get().unwrap();

        record_error(&conn, step_id, "first").unwrap();
        record_error(&conn, step_id, "second").unwrap();
        assert_eq!(list_errors(&conn, step_id).unwrap().len(), 2);

        assert_eq!(clear_errors(&conn, step_id).unwrap(), 2);
        assert!(list_errors(&conn, step_id).unwrap().is_empty());
    }

    #[test]
    fn clear_messages_removes_both_kinds() {
        let (pool, step_id) = setup();
        let conn = pool.get().unwrap();

        add_warning(&conn, step_id, "w").unwrap();
        record_error(&conn, step_id, "e").unwrap();
        assert_eq!(clear_messages(&conn, step_id).unwrap(), 2);
        assert!(list_warnings(&conn, step_id).unwrap().is_empty());
        assert!(list_errors(&conn, step_id).unwrap().is_empty());
    }
}
