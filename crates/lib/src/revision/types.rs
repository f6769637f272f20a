use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::system::System;
use crate::types::User;
use crate::util::hash::Hashable;
use crate::util::unix_now;

/// Current on-disk revision index format version.
pub const REVISION_INDEX_VERSION: u32 = 1;

/// An immutable, numbered snapshot of a system's canonical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Revision {
  /// Content hash of the revision's seed fields.
  pub id: String,
  /// 1-based, increasing by exactly one per commit.
  pub revision: u64,
  pub description: String,
  /// Derived from the store's deployed pointer when read back.
  #[serde(default)]
  pub deployed: bool,
  /// Id of the revision this one supersedes, `None` for revision 1.
  pub previous: Option<String>,
  pub system_id: String,
  pub system: System,
  pub created_at: u64,
}

#[derive(Serialize)]
struct RevisionSeed<'a> {
  system_id: &'a str,
  revision: u64,
  description: &'a str,
  previous: Option<&'a str>,
  created_at: u64,
  system: &'a System,
}

impl Hashable for RevisionSeed<'_> {}

impl Revision {
  /// Build the revision that follows `head` (or revision 1 when there is none).
  pub fn next(
    system_id: &str,
    description: &str,
    system: System,
    head: Option<&Revision>,
  ) -> Result<Self, RevisionError> {
    let revision = head.map_or(1, |h| h.revision + 1);
    let previous = head.map(|h| h.id.clone());
    let created_at = unix_now();

    let id = RevisionSeed {
      system_id,
      revision,
      description,
      previous: previous.as_deref(),
      created_at,
      system: &system,
    }
    .compute_hash()
    .map_err(RevisionError::Serialize)?
    .0;

    Ok(Self {
      id,
      revision,
      description: description.to_string(),
      deployed: false,
      previous,
      system_id: system_id.to_string(),
      system,
      created_at,
    })
  }

  pub fn to_metadata(&self) -> RevisionMetadata {
    RevisionMetadata {
      id: self.id.clone(),
      revision: self.revision,
      description: self.description.clone(),
      created_at: self.created_at,
    }
  }
}

/// Summary of a revision kept in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionMetadata {
  pub id: String,
  pub revision: u64,
  pub description: String,
  pub created_at: u64,
}

/// Per-system index: the revision list (oldest first) and the deployed pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionIndex {
  pub version: u32,
  pub system_id: String,
  pub revisions: Vec<RevisionMetadata>,
  pub deployed: Option<u64>,
}

impl RevisionIndex {
  pub fn new(system_id: &str) -> Self {
    Self {
      version: REVISION_INDEX_VERSION,
      system_id: system_id.to_string(),
      revisions: Vec::new(),
      deployed: None,
    }
  }

  pub fn head(&self) -> Option<&RevisionMetadata> {
    self.revisions.last()
  }

  pub fn contains(&self, number: u64) -> bool {
    self.revisions.iter().any(|r| r.revision == number)
  }

  pub fn is_empty(&self) -> bool {
    self.revisions.is_empty()
  }

  pub fn len(&self) -> usize {
    self.revisions.len()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineKind {
  Create,
  Commit,
  Build,
  Deploy,
  Mark,
}

impl std::fmt::Display for TimelineKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      TimelineKind::Create => "create",
      TimelineKind::Commit => "commit",
      TimelineKind::Build => "build",
      TimelineKind::Deploy => "deploy",
      TimelineKind::Mark => "mark",
    };
    f.pad(s)
  }
}

/// One audit-trail record for a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
  pub timestamp: u64,
  pub user: User,
  pub kind: TimelineKind,
  pub description: String,
}

impl TimelineEntry {
  pub fn new(user: &User, kind: TimelineKind, description: impl Into<String>) -> Self {
    Self {
      timestamp: unix_now(),
      user: user.clone(),
      kind,
      description: description.into(),
    }
  }
}

#[derive(Debug, Error)]
pub enum RevisionError {
  #[error("revision {revision} of system '{system_id}' not found")]
  NotFound { system_id: String, revision: u64 },

  #[error("invalid system id '{0}'")]
  InvalidSystemId(String),

  #[error("failed to create directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize revision data: {0}")]
  Serialize(#[source] serde_json::Error),

  #[error("unsupported revision index version {0}")]
  UnsupportedVersion(u32),
}
