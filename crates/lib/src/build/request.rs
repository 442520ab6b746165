use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::BuildError;

pub const DEFAULT_ENGINE: &str = "pdflatex";

/// A request to build one document.
///
/// `project_root` is trusted. `main_file` is confined to the root when the
/// request is constructed through [`BuildRequest::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
  pub project_root: PathBuf,
  pub main_file: PathBuf,
  pub engine: String,
  #[serde(default)]
  pub clean: bool,
}

impl BuildRequest {
  pub fn new(
    project_root: impl Into<PathBuf>,
    main_file: impl AsRef<Path>,
    engine: impl Into<String>,
  ) -> Result<Self, BuildError> {
    Ok(Self {
      project_root: project_root.into(),
      main_file: confine_main_file(main_file.as_ref())?,
      engine: engine.into(),
      clean: false,
    })
  }

  pub fn with_clean(mut self, clean: bool) -> Self {
    self.clean = clean;
    self
  }

  /// Absolute path of the main file.
  pub fn main_path(&self) -> PathBuf {
    self.project_root.join(&self.main_file)
  }

  /// The main file's base name without extension.
  pub fn stem(&self) -> Result<String, BuildError> {
    self
      .main_file
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .filter(|s| !s.is_empty())
      .ok_or_else(|| BuildError::MainFileMissing(self.main_file.clone()))
  }
}

/// Normalize a main file path and reject anything that could leave the
/// project root: absolute paths, drive prefixes and `..` components.
pub fn confine_main_file(path: &Path) -> Result<PathBuf, BuildError> {
  let mut confined = PathBuf::new();
  for component in path.components() {
    match component {
      Component::Normal(part) => confined.push(part),
      Component::CurDir => {}
      Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
        return Err(BuildError::MainFileOutsideProject(path.to_path_buf()));
      }
    }
  }

  if confined.as_os_str().is_empty() {
    return Err(BuildError::MainFileMissing(path.to_path_buf()));
  }
  Ok(confined)
}
