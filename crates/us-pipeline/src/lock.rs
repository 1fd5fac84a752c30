//! Per-project run lease.
//!
//! At most one runner may drive a project at a time, across threads and
//! processes. The lease lives in the `projects` row so it is visible to every
//! process sharing the database; [`ProjectLock`] holds it for the duration of
//! a run and releases it on drop.

use std::time::Duration;

use chrono::{DateTime, Utc};
use us_core::{Error, ProjectId, Result};
use us_db::pool::{get_conn, DbPool};
use us_db::queries::projects;

/// Instant before which a held lease counts as abandoned.
pub(crate) fn stale_cutoff(lease: Duration) -> DateTime<Utc> {
    let lease = chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::days(365));
    Utc::now() - lease
}

/// RAII guard over a project's run lease.
pub struct ProjectLock {
    pool: DbPool,
    project_id: ProjectId,
    worker_id: String,
    released: bool,
}

impl ProjectLock {
    /// Claim the lease, failing fast when another worker holds a live one.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the project does not exist.
    /// - [`Error::Conflict`] if the project is locked by someone else.
    pub fn acquire(
        pool: &DbPool,
        project_id: ProjectId,
        worker_id: &str,
        lease: Duration,
    ) -> Result<Self> {
        let conn = get_conn(pool)?;
        if !projects::acquire_lock(&conn, project_id, worker_id, stale_cutoff(lease))? {
            let project = projects::get_project(&conn, project_id)?
                .ok_or_else(|| Error::not_found("project", project_id))?;
            let holder = project.locked_by.unwrap_or_else(|| "another worker".into());
            return Err(Error::Conflict(format!(
                "project {project_id} is being run by {holder}"
            )));
        }

        tracing::debug!(%project_id, worker = worker_id, "Acquired project lease");
        Ok(Self {
            pool: pool.clone(),
            project_id,
            worker_id: worker_id.to_string(),
            released: false,
        })
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// Release the lease, reporting database failures.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let conn = get_conn(&self.pool)?;
        projects::release_lock(&conn, self.project_id, &self.worker_id)?;
        tracing::debug!(project_id = %self.project_id, "Released project lease");
        Ok(())
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let result = get_conn(&self.pool)
            .and_then(|conn| projects::release_lock(&conn, self.project_id, &self.worker_id));
        if let Err(e) = result {
            tracing::warn!(
                project_id = %self.project_id,
                "Failed to release project lease: {e}"
            );
        }
    }
}

impl std::fmt::Debug for ProjectLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectLock")
            .field("project_id", &self.project_id)
            .field("worker_id", &self.worker_id)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use us_core::MediaType;
    use us_db::pool::init_memory_pool;

    const LEASE: Duration = Duration::from_secs(3600);

    fn setup() -> (DbPool, ProjectId) {
        let pool = init_memory_pool().unwrap();
        let conn = pool.get().unwrap();
        let project = projects::create_project(&conn, "Album", MediaType::Music).unwrap();
        (pool, project.id)
    }

    #[test]
    fn second_acquire_conflicts() {
        let (pool, id) = setup();
        let _held = ProjectLock::acquire(&pool, id, "w1", LEASE).unwrap();

        let err = ProjectLock::acquire(&pool, id, "w2", LEASE).unwrap_err();
        assert!(matches!(err, Error::Conflict(ref m) if m.contains("w1")));
    }

    #[test]
    fn drop_releases() {
        let (pool, id) = setup();
        {
            let _held = ProjectLock::acquire(&pool, id, "w1", LEASE).unwrap();
        }
        let again = ProjectLock::acquire(&pool, id, "w2", LEASE).unwrap();
        again.release().unwrap();

        let conn = pool.get().unwrap();
        let project = projects::get_project(&conn, id).unwrap().unwrap();
        assert!(project.locked_by.is_none());
    }

    #[test]
    fn zero_lease_is_always_stale() {
        let (pool, id) = setup();
        let _held = ProjectLock::acquire(&pool, id, "w1", LEASE).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(ProjectLock::acquire(&pool, id, "w2", Duration::ZERO).is_ok());
    }

    #[test]
    fn missing_project_is_not_found() {
        let (pool, _) = setup();
        let err = ProjectLock::acquire(&pool, ProjectId::new(), "w1", LEASE).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
