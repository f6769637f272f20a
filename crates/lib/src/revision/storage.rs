//! Revision storage.
//!
//! # Storage Layout
//!
//! ```text
//! {root}/systems/
//! └── <system_id>/
//!     ├── index.json        # RevisionIndex: revision list + deployed pointer
//!     ├── revisions/<n>.json
//!     └── timeline.json
//! ```
//!
//! Revision files are written once and never modified. Moving the deployed
//! marker rewrites only `index.json`, atomically.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::system::System;
use crate::util::fs::{read_optional, write_atomic};
use crate::util::locks::KeyedLocks;

use super::types::{REVISION_INDEX_VERSION, Revision, RevisionError, RevisionIndex, TimelineEntry};

/// Index file name.
const INDEX_FILENAME: &str = "index.json";

/// Timeline file name.
const TIMELINE_FILENAME: &str = "timeline.json";

/// Directory (per system) holding the revision documents.
const REVISIONS_DIR: &str = "revisions";

/// Append-only, per-system revision history with a movable deployed pointer.
///
/// Implementations serialise commits and pointer moves per system so that
/// concurrent writers can never produce two revisions with the same number.
#[async_trait]
pub trait RevisionStore: Send + Sync {
  /// Append `system` as the new head of `system_id`'s history.
  async fn commit_revision(&self, system_id: &str, description: &str, system: System)
  -> Result<Revision, RevisionError>;

  async fn head(&self, system_id: &str) -> Result<Option<Revision>, RevisionError>;

  /// A specific revision, or the head when `number` is `None`.
  async fn revision(&self, system_id: &str, number: Option<u64>) -> Result<Option<Revision>, RevisionError>;

  /// Point the deployed marker at revision `number`.
  ///
  /// Fails with [`RevisionError::NotFound`] and leaves the pointer unchanged
  /// when the revision does not exist.
  async fn mark_deployed(&self, system_id: &str, number: u64) -> Result<(), RevisionError>;

  async fn deployed(&self, system_id: &str) -> Result<Option<Revision>, RevisionError>;

  /// All revisions, newest first.
  async fn list_revisions(&self, system_id: &str) -> Result<Vec<Revision>, RevisionError>;

  async fn append_timeline(&self, system_id: &str, entry: TimelineEntry) -> Result<(), RevisionError>;

  /// Timeline entries, oldest first.
  async fn timeline(&self, system_id: &str) -> Result<Vec<TimelineEntry>, RevisionError>;

  /// Resolve a revision number or a case-insensitive revision id prefix.
  async fn find_revision(&self, system_id: &str, identifier: &str) -> Result<Option<u64>, RevisionError> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
      return Ok(None);
    }

    let revisions = self.list_revisions(system_id).await?;

    if let Ok(number) = identifier.parse::<u64>()
      && revisions.iter().any(|r| r.revision == number)
    {
      return Ok(Some(number));
    }

    let needle = identifier.to_lowercase();
    Ok(
      revisions
        .iter()
        .find(|r| r.id.to_lowercase().starts_with(&needle))
        .map(|r| r.revision),
    )
  }

  /// The deployed revision, falling back to the head.
  async fn deployed_or_head(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    match self.deployed(system_id).await? {
      Some(revision) => Ok(Some(revision)),
      None => self.head(system_id).await,
    }
  }
}

/// Reject ids that are not a single, plain path component.
pub(crate) fn check_system_id(system_id: &str) -> Result<(), RevisionError> {
  let valid = !system_id.is_empty()
    && system_id != "."
    && system_id != ".."
    && system_id
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

  if valid {
    Ok(())
  } else {
    Err(RevisionError::InvalidSystemId(system_id.to_string()))
  }
}

/// [`RevisionStore`] persisting JSON documents below a base directory.
#[derive(Debug)]
pub struct FileRevisionStore {
  /// Base path, usually `{root}/systems`.
  base_path: PathBuf,
  locks: KeyedLocks,
}

impl FileRevisionStore {
  pub fn new(base_path: PathBuf) -> Self {
    Self {
      base_path,
      locks: KeyedLocks::new(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn system_dir(&self, system_id: &str) -> Result<PathBuf, RevisionError> {
    check_system_id(system_id)?;
    Ok(self.base_path.join(system_id))
  }

  fn index_path(&self, system_id: &str) -> Result<PathBuf, RevisionError> {
    Ok(self.system_dir(system_id)?.join(INDEX_FILENAME))
  }

  fn revision_path(&self, system_id: &str, number: u64) -> Result<PathBuf, RevisionError> {
    Ok(
      self
        .system_dir(system_id)?
        .join(REVISIONS_DIR)
        .join(format!("{}.json", number)),
    )
  }

  fn timeline_path(&self, system_id: &str) -> Result<PathBuf, RevisionError> {
    Ok(self.system_dir(system_id)?.join(TIMELINE_FILENAME))
  }

  async fn ensure_dir(path: &Path) -> Result<(), RevisionError> {
    tokio::fs::create_dir_all(path)
      .await
      .map_err(|source| RevisionError::CreateDir {
        path: path.to_path_buf(),
        source,
      })
  }

  async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), RevisionError> {
    if let Some(parent) = path.parent() {
      Self::ensure_dir(parent).await?;
    }
    let content = serde_json::to_string_pretty(value).map_err(RevisionError::Serialize)?;
    write_atomic(path, content.as_bytes())
      .await
      .map_err(|source| RevisionError::Write {
        path: path.to_path_buf(),
        source,
      })
  }

  async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, RevisionError> {
    let content = read_optional(path).await.map_err(|source| RevisionError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    match content {
      None => Ok(None),
      Some(content) => serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| RevisionError::Parse {
          path: path.to_path_buf(),
          source,
        }),
    }
  }

  /// Load the revision index, or an empty one if the system has no history yet.
  pub async fn load_index(&self, system_id: &str) -> Result<RevisionIndex, RevisionError> {
    let path = self.index_path(system_id)?;
    let Some(index) = Self::read_json::<RevisionIndex>(&path).await? else {
      return Ok(RevisionIndex::new(system_id));
    };

    if index.version != REVISION_INDEX_VERSION {
      return Err(RevisionError::UnsupportedVersion(index.version));
    }

    Ok(index)
  }

  async fn save_index(&self, index: &RevisionIndex) -> Result<(), RevisionError> {
    let path = self.index_path(&index.system_id)?;
    Self::write_json(&path, index).await
  }

  async fn load_revision(&self, index: &RevisionIndex, number: u64) -> Result<Revision, RevisionError> {
    let path = self.revision_path(&index.system_id, number)?;
    let mut revision = Self::read_json::<Revision>(&path)
      .await?
      .ok_or_else(|| RevisionError::NotFound {
        system_id: index.system_id.clone(),
        revision: number,
      })?;
    revision.deployed = index.deployed == Some(number);
    Ok(revision)
  }
}

#[async_trait]
impl RevisionStore for FileRevisionStore {
  async fn commit_revision(
    &self,
    system_id: &str,
    description: &str,
    system: System,
  ) -> Result<Revision, RevisionError> {
    let _guard = self.locks.lock(system_id).await;

    let mut index = self.load_index(system_id).await?;
    let head = match index.head() {
      Some(meta) => Some(self.load_revision(&index, meta.revision).await?),
      None => None,
    };

    let revision = Revision::next(system_id, description, system, head.as_ref())?;

    // Revision file first: an index never names a revision that is not on disk.
    Self::write_json(&self.revision_path(system_id, revision.revision)?, &revision).await?;
    index.revisions.push(revision.to_metadata());
    self.save_index(&index).await?;

    debug!(system = %system_id, revision = revision.revision, id = %revision.id, "committed revision");
    Ok(revision)
  }

  async fn head(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    self.revision(system_id, None).await
  }

  async fn revision(&self, system_id: &str, number: Option<u64>) -> Result<Option<Revision>, RevisionError> {
    let index = self.load_index(system_id).await?;
    let number = match number {
      Some(n) if index.contains(n) => n,
      Some(_) => return Ok(None),
      None => match index.head() {
        Some(meta) => meta.revision,
        None => return Ok(None),
      },
    };
    self.load_revision(&index, number).await.map(Some)
  }

  async fn mark_deployed(&self, system_id: &str, number: u64) -> Result<(), RevisionError> {
    let _guard = self.locks.lock(system_id).await;

    let mut index = self.load_index(system_id).await?;
    if !index.contains(number) {
      return Err(RevisionError::NotFound {
        system_id: system_id.to_string(),
        revision: number,
      });
    }

    index.deployed = Some(number);
    self.save_index(&index).await?;

    debug!(system = %system_id, revision = number, "moved deployed marker");
    Ok(())
  }

  async fn deployed(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    let index = self.load_index(system_id).await?;
    match index.deployed {
      Some(number) => self.load_revision(&index, number).await.map(Some),
      None => Ok(None),
    }
  }

  async fn list_revisions(&self, system_id: &str) -> Result<Vec<Revision>, RevisionError> {
    let index = self.load_index(system_id).await?;
    let mut revisions = Vec::with_capacity(index.len());
    for meta in index.revisions.iter().rev() {
      revisions.push(self.load_revision(&index, meta.revision).await?);
    }
    Ok(revisions)
  }

  async fn append_timeline(&self, system_id: &str, entry: TimelineEntry) -> Result<(), RevisionError> {
    let _guard = self.locks.lock(system_id).await;

    let path = self.timeline_path(system_id)?;
    let mut entries = Self::read_json::<Vec<TimelineEntry>>(&path).await?.unwrap_or_default();
    entries.push(entry);
    Self::write_json(&path, &entries).await
  }

  async fn timeline(&self, system_id: &str) -> Result<Vec<TimelineEntry>, RevisionError> {
    let path = self.timeline_path(system_id)?;
    Ok(Self::read_json(&path).await?.unwrap_or_default())
  }
}
