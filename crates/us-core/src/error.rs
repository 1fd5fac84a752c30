//! Unified error type for upload-studio.
//!
//! All library crates funnel their failures into [`Error`], which carries
//! enough context for a presentation layer to derive an HTTP status code via
//! [`Error::http_status`].

use std::fmt;

use crate::ids::ProjectId;

/// Unified error type covering all failure modes of the studio core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "project", "executor").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation conflicts with work already in progress.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The project is finished and can no longer be mutated.
    #[error("Project {project_id} is finished")]
    ProjectFinished {
        /// The finished project.
        project_id: ProjectId,
    },

    /// Executor registration was invalid (empty or duplicate name).
    #[error("Registry error: {0}")]
    Registry(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::ProjectFinished { .. } => 409,
            Error::Registry(_) => 500,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::ProjectFinished`].
    pub fn finished(project_id: ProjectId) -> Self {
        Error::ProjectFinished { project_id }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
