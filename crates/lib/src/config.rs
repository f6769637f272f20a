//! User configuration.
//!
//! Read from `{config_dir}/config.json` unless a path is given explicitly:
//!
//! ```json
//! {
//!   "root": "/srv/topo",
//!   "analysis": {"region": "eu-west-1"},
//!   "hooks": {"analyze": "./inspect.sh", "build": "./build.sh", "deploy": "./deploy.sh"},
//!   "shell": "/bin/bash",
//!   "vcs": "journal",
//!   "user": {"name": "ada", "email": "ada@example.com"}
//! }
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::consts::{CONFIG_FILENAME, ROOT_ENV};
use crate::deploy::HookCommands;
use crate::platform::paths::{config_dir, root_dir};
use crate::registry::{Git, Journal, VersionControl};
use crate::types::User;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsBackend {
  #[default]
  Journal,
  Git,
}

impl VcsBackend {
  pub fn backend(self) -> Arc<dyn VersionControl> {
    match self {
      VcsBackend::Journal => Arc::new(Journal),
      VcsBackend::Git => Arc::new(Git),
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Data root; `$TOPO_ROOT` takes precedence.
  pub root: Option<PathBuf>,
  /// Passed verbatim to the analyzer.
  pub analysis: Value,
  pub hooks: HookCommands,
  pub shell: Option<String>,
  pub vcs: VcsBackend,
  pub user: Option<User>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl Config {
  /// Default config file location.
  pub fn default_path() -> PathBuf {
    config_dir().join(CONFIG_FILENAME)
  }

  /// Load an explicitly named config file; it must exist.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    let config = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
      path: path.to_path_buf(),
      source,
    })?;
    debug!(path = ?path, "loaded config");
    Ok(config)
  }

  /// Load the default config file, falling back to defaults when it does not exist.
  pub fn load_default() -> Result<Self, ConfigError> {
    let path = Self::default_path();
    if !path.exists() {
      debug!(path = ?path, "no config file, using defaults");
      return Ok(Self::default());
    }
    Self::load(&path)
  }

  /// The data root: `$TOPO_ROOT`, then `root`, then the platform data directory.
  pub fn root(&self) -> PathBuf {
    match (std::env::var(ROOT_ENV), &self.root) {
      (Ok(env), _) if !env.is_empty() => PathBuf::from(env),
      (_, Some(root)) => root.clone(),
      _ => root_dir(),
    }
  }

  /// The configured user, or the invoking OS user.
  pub fn user(&self) -> User {
    self.user.clone().unwrap_or_else(User::from_env)
  }
}
