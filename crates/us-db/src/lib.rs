//! us-db: database access and persistence layer.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! embedded migrations, typed models, and query modules for projects, their
//! steps, and the warnings and errors those steps record.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
