//! upload-studio: staged execution pipeline for media upload projects.
//!
//! This library crate exposes the binary's wiring for integration testing.

pub mod app;
pub mod config;
