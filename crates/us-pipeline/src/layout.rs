//! Filesystem layout for project and step artifacts.
//!
//! Every project owns `<media_root>/upload_project_<id>`; every step owns
//! `step_<id>` below it, split into named areas (`data` for working files).

use std::io;
use std::path::{Path, PathBuf};

use us_core::{ProjectId, StepId};

/// Resolves project and step directories under a media root.
#[derive(Debug, Clone)]
pub struct Layout {
    media_root: PathBuf,
}

impl Layout {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Root area of a project.
    pub fn project_dir(&self, project_id: ProjectId) -> PathBuf {
        self.media_root.join(format!("upload_project_{project_id}"))
    }

    /// Areas belonging to one step of a project.
    pub fn step_paths(&self, project_id: ProjectId, step_id: StepId) -> StepPaths {
        StepPaths {
            root: self.project_dir(project_id).join(format!("step_{step_id}")),
        }
    }
}

/// Directories owned by a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPaths {
    root: PathBuf,
}

impl StepPaths {
    /// Area for an executor's working files.
    pub const DATA_AREA: &'static str = "data";

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of a named area (not created).
    pub fn area(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of the `data` area (not created).
    pub fn data(&self) -> PathBuf {
        self.area(Self::DATA_AREA)
    }

    /// Create a named area if needed and return its path.
    pub fn ensure_area(&self, name: &str) -> io::Result<PathBuf> {
        let path = self.area(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Recursively remove `path`, treating a missing directory as success.
///
/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn paths_follow_naming_scheme() {
        let layout = Layout::new("/srv/media");
        let project_id = ProjectId::new();
        let step_id = StepId::new();

        let project_dir = layout.project_dir(project_id);
        assert_eq!(
            project_dir,
            PathBuf::from(format!("/srv/media/upload_project_{project_id}"))
        );

        let paths = layout.step_paths(project_id, step_id);
        assert_eq!(paths.root(), project_dir.join(format!("step_{step_id}")));
        assert_eq!(paths.data(), paths.root().join("data"));
    }

    #[test]
    fn ensure_area_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path());
        let paths = layout.step_paths(ProjectId::new(), StepId::new());

        let data = paths.ensure_area(StepPaths::DATA_AREA).unwrap();
        assert!(data.is_dir());
        // idempotent
        paths.ensure_area(StepPaths::DATA_AREA).unwrap();
    }

    #[test]
    fn remove_is_absence_tolerant() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("gone");
        assert!(!remove_dir_if_exists(&target).unwrap());

        fs::create_dir_all(target.join("nested")).unwrap();
        fs::write(target.join("nested/file.flac"), b"x").unwrap();
        assert!(remove_dir_if_exists(&target).unwrap());
        assert!(!target.exists());
    }
}
