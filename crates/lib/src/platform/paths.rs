use crate::consts::APP_NAME;
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
}

/// Returns the directory for persistent data (artifact store, lock files).
///
/// `QUIRE_DATA_DIR` overrides the platform default.
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("QUIRE_DATA_DIR") {
    return PathBuf::from(dir);
  }
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for persistent data (artifact store, lock files).
///
/// `QUIRE_DATA_DIR` overrides the XDG default.
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("QUIRE_DATA_DIR") {
    return PathBuf::from(dir);
  }
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Returns the directory for disposable files (build scratch directories).
///
/// `QUIRE_CACHE_DIR` overrides the platform default.
#[cfg(windows)]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("QUIRE_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| std::env::temp_dir())
    .join(APP_NAME)
    .join("Cache")
}

/// Returns the directory for disposable files (build scratch directories).
///
/// `QUIRE_CACHE_DIR` overrides the XDG default.
#[cfg(not(windows))]
pub fn cache_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("QUIRE_CACHE_DIR") {
    return PathBuf::from(dir);
  }
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Default location of the persisted artifact store.
pub fn artifacts_dir() -> PathBuf {
  data_dir().join("artifacts")
}

/// Default parent of per-job scratch directories.
pub fn scratch_dir() -> PathBuf {
  cache_dir().join("scratch")
}
