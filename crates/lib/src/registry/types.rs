use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vcs::VcsError;

/// Registry record of one system, keyed by system id in the registry document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
  /// Display name.
  pub repo_name: String,
  /// Where the system's revision history is stored.
  pub repo_path: PathBuf,
}

/// A `{name, id}` pair as returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemSummary {
  pub name: String,
  pub id: String,
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("failed to read registry {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write registry {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse registry {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize registry: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("registry commit failed: {0}")]
  Vcs(#[from] VcsError),
}
