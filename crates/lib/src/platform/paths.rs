use std::path::PathBuf;

use crate::consts::{APP_NAME, REGISTRY_DIR, ROOT_ENV, SYSTEMS_DIR};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("."))
}

/// Returns the directory for configuration files for the application
#[cfg(windows)]
pub fn config_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for configuration files for the application
#[cfg(not(windows))]
pub fn config_dir() -> PathBuf {
  let config_home = std::env::var("XDG_CONFIG_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".config"));
  config_home.join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir())
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Root of all persisted state: `$TOPO_ROOT` if set, otherwise the data directory.
pub fn root_dir() -> PathBuf {
  match std::env::var(ROOT_ENV) {
    Ok(root) if !root.is_empty() => PathBuf::from(root),
    _ => data_dir(),
  }
}

/// Directory holding per-system revision histories below `root`.
pub fn systems_dir(root: &std::path::Path) -> PathBuf {
  root.join(SYSTEMS_DIR)
}

/// Directory holding the registry document and its change history below `root`.
pub fn registry_dir(root: &std::path::Path) -> PathBuf {
  root.join(REGISTRY_DIR)
}
