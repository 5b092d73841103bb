use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::layers::LayerNameIndex;
use crate::loader;
use crate::schema::{ProjectInfo, ProjectSettings};

/// Name of the per-project settings file inside the project directory.
pub const SETTINGS_FILE: &str = "access.yaml";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project '{0}' not found")]
    NotFound(String),

    #[error("failed to load settings of project '{project}': {reason}")]
    Invalid { project: String, reason: String },
}

/// Everything the gate needs to know about one project, loaded together.
#[derive(Debug, Clone)]
pub struct ProjectMetadata {
    pub info: ProjectInfo,
    pub settings: ProjectSettings,
    pub layers: LayerNameIndex,
}

impl ProjectMetadata {
    pub fn new(owner: &str, name: &str, settings: ProjectSettings) -> Self {
        let layers = LayerNameIndex::from_settings(&settings.layers);
        let info = ProjectInfo {
            owner: owner.to_string(),
            name: name.to_string(),
            project_file: settings.project_file.clone(),
        };
        Self {
            info,
            settings,
            layers,
        }
    }
}

/// Source of project metadata (settings, layer index, file reference).
pub trait ProjectStore: Send + Sync {
    fn load_project(&self, owner: &str, name: &str) -> Result<ProjectMetadata, StoreError>;
}

/// Reads `{root}/{owner}/{name}/access.yaml` on every call.
#[derive(Debug, Clone)]
pub struct FsProjectStore {
    root: PathBuf,
}

impl FsProjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProjectStore for FsProjectStore {
    fn load_project(&self, owner: &str, name: &str) -> Result<ProjectMetadata, StoreError> {
        let project = format!("{owner}/{name}");
        if !is_safe_segment(owner) || !is_safe_segment(name) {
            return Err(StoreError::NotFound(project));
        }

        let path = self.root.join(owner).join(name).join(SETTINGS_FILE);
        if !path.is_file() {
            debug!(path = %path.display(), "project settings file missing");
            return Err(StoreError::NotFound(project));
        }

        let settings = loader::load_settings(&path).map_err(|e| StoreError::Invalid {
            project: project.clone(),
            reason: format!("{e:#}"),
        })?;
        Ok(ProjectMetadata::new(owner, name, settings))
    }
}

/// A single, non-hidden path component.
fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && !segment.contains(['/', '\\'])
        && segment != ".."
}
