//! Version-controlled index of registered systems.
//!
//! The registry is a single JSON document, `systems.json`, mapping system ids
//! to their display name and storage location:
//!
//! ```json
//! { "4f1c...": {"repoName": "web", "repoPath": "/srv/topo/systems/4f1c..."} }
//! ```
//!
//! Entries are never removed. Each registration rewrites the document
//! atomically and records a commit through the configured [`VersionControl`]
//! backend.

mod types;
pub mod vcs;

pub use types::{RegistryEntry, RegistryError, SystemSummary};
pub use vcs::{Git, Journal, VcsError, VersionControl};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::consts::REGISTRY_FILENAME;
use crate::types::User;
use crate::util::fs::{read_optional, write_atomic};

type Entries = IndexMap<String, RegistryEntry>;

pub struct SystemRegistry {
  dir: PathBuf,
  vcs: Arc<dyn VersionControl>,
  /// Held for writing across flush and commit, so registrations never interleave.
  entries: RwLock<Entries>,
}

impl std::fmt::Debug for SystemRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SystemRegistry").field("dir", &self.dir).finish_non_exhaustive()
  }
}

impl SystemRegistry {
  /// Open the registry in `dir`, creating an empty one on first use.
  pub async fn boot(dir: &Path, vcs: Arc<dyn VersionControl>) -> Result<Self, RegistryError> {
    let path = dir.join(REGISTRY_FILENAME);

    let content = read_optional(&path).await.map_err(|source| RegistryError::Read {
      path: path.clone(),
      source,
    })?;

    let entries = match content {
      Some(content) => serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
        path: path.clone(),
        source,
      })?,
      None => {
        info!(dir = ?dir, "initializing system registry");
        vcs.init(dir).await?;
        let entries = Entries::new();
        Self::flush(&path, &entries).await?;
        vcs
          .commit(dir, &User::system(), "initialized registry", &[REGISTRY_FILENAME])
          .await?;
        entries
      }
    };

    debug!(dir = ?dir, systems = entries.len(), "loaded system registry");

    Ok(Self {
      dir: dir.to_path_buf(),
      vcs,
      entries: RwLock::new(entries),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path(&self) -> PathBuf {
    self.dir.join(REGISTRY_FILENAME)
  }

  async fn flush(path: &Path, entries: &Entries) -> Result<(), RegistryError> {
    let content = serde_json::to_string_pretty(entries).map_err(RegistryError::Serialize)?;
    write_atomic(path, content.as_bytes())
      .await
      .map_err(|source| RegistryError::Write {
        path: path.to_path_buf(),
        source,
      })
  }

  /// Register a system. Returns `false` if the id was already registered.
  pub async fn register(
    &self,
    user: &User,
    display_name: &str,
    storage_location: &Path,
    system_id: &str,
  ) -> Result<bool, RegistryError> {
    let mut entries = self.entries.write().await;
    if entries.contains_key(system_id) {
      return Ok(false);
    }

    let mut updated = entries.clone();
    updated.insert(
      system_id.to_string(),
      RegistryEntry {
        repo_name: display_name.to_string(),
        repo_path: storage_location.to_path_buf(),
      },
    );
    Self::flush(&self.path(), &updated).await?;
    *entries = updated;

    let message = format!("registered system: {}", storage_location.display());
    self.vcs.commit(&self.dir, user, &message, &[REGISTRY_FILENAME]).await?;

    info!(system = %system_id, name = %display_name, "registered system");
    Ok(true)
  }

  /// Resolve a human-supplied identifier to a system id.
  ///
  /// Tries, in order: exact id, case-insensitive id prefix, case-insensitive
  /// display-name prefix. Within a tier the first entry in registration order
  /// wins. The identifier is a literal prefix; an empty one matches nothing.
  pub async fn find_system(&self, identifier: &str) -> Option<String> {
    if identifier.is_empty() {
      return None;
    }

    let entries = self.entries.read().await;
    if entries.contains_key(identifier) {
      return Some(identifier.to_string());
    }

    let needle = identifier.to_lowercase();
    entries
      .keys()
      .find(|id| id.to_lowercase().starts_with(&needle))
      .or_else(|| {
        entries
          .iter()
          .find(|(_, entry)| entry.repo_name.to_lowercase().starts_with(&needle))
          .map(|(id, _)| id)
      })
      .cloned()
  }

  pub async fn list_systems(&self) -> Vec<SystemSummary> {
    let entries = self.entries.read().await;
    entries
      .iter()
      .map(|(id, entry)| SystemSummary {
        name: entry.repo_name.clone(),
        id: id.clone(),
      })
      .collect()
  }

  pub async fn storage_location(&self, system_id: &str) -> Option<PathBuf> {
    let entries = self.entries.read().await;
    entries.get(system_id).map(|e| e.repo_path.clone())
  }

  /// Id of the first system registered under exactly `name`.
  pub async fn system_by_name(&self, name: &str) -> Option<String> {
    let entries = self.entries.read().await;
    entries
      .iter()
      .find(|(_, entry)| entry.repo_name == name)
      .map(|(id, _)| id.clone())
  }

  pub async fn contains(&self, system_id: &str) -> bool {
    self.entries.read().await.contains_key(system_id)
  }
}
