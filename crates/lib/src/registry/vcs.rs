//! Version-control backends for the registry directory.
//!
//! Every registry mutation is recorded as a commit. Two backends exist:
//! [`Journal`], a self-contained append-only `history.json`, and [`Git`],
//! which writes commits into a git repository in the same directory.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use gix::objs::{Tree, tree};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::types::User;
use crate::util::fs::{read_optional, write_atomic};
use crate::util::hash::{Hashable, hash_bytes};
use crate::util::unix_now;

/// Journal file name inside the tracked directory.
pub const JOURNAL_FILENAME: &str = "history.json";

#[derive(Debug, Error)]
pub enum VcsError {
  #[error("git operation in {path} failed: {source}")]
  Git {
    path: PathBuf,
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("version control task panicked: {0}")]
  Task(#[from] tokio::task::JoinError),

  #[error("failed to access {path}: {source}")]
  Io {
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

  #[error("failed to serialize journal: {0}")]
  Serialize(#[source] serde_json::Error),
}

impl VcsError {
  fn git(path: &Path, source: impl std::error::Error + Send + Sync + 'static) -> Self {
    VcsError::Git {
      path: path.to_path_buf(),
      source: Box::new(source),
    }
  }
}

/// Records snapshots of files in a directory.
#[async_trait]
pub trait VersionControl: Send + Sync {
  /// Prepare `dir` for tracking. Must be idempotent.
  async fn init(&self, dir: &Path) -> Result<(), VcsError>;

  /// Commit the current content of `files` (relative to `dir`) and return the commit id.
  async fn commit(&self, dir: &Path, user: &User, message: &str, files: &[&str]) -> Result<String, VcsError>;
}

/// One entry of the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalCommit {
  pub hash: String,
  pub parent: Option<String>,
  pub message: String,
  pub author: User,
  pub timestamp: u64,
  /// sha256 of every committed file, keyed by relative path.
  pub files: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct CommitSeed<'a> {
  parent: Option<&'a str>,
  message: &'a str,
  author: &'a User,
  timestamp: u64,
  files: &'a BTreeMap<String, String>,
}

impl Hashable for CommitSeed<'_> {}

/// Built-in append-only change history.
#[derive(Debug, Clone, Copy, Default)]
pub struct Journal;

impl Journal {
  /// Read the full history of `dir`, oldest first.
  pub async fn log(dir: &Path) -> Result<Vec<JournalCommit>, VcsError> {
    let path = dir.join(JOURNAL_FILENAME);
    let content = read_optional(&path).await.map_err(|source| VcsError::Io {
      path: path.clone(),
      source,
    })?;

    match content {
      None => Ok(Vec::new()),
      Some(content) => serde_json::from_str(&content).map_err(|source| VcsError::Parse { path, source }),
    }
  }

  async fn save(dir: &Path, history: &[JournalCommit]) -> Result<(), VcsError> {
    let path = dir.join(JOURNAL_FILENAME);
    let content = serde_json::to_string_pretty(history).map_err(VcsError::Serialize)?;
    write_atomic(&path, content.as_bytes())
      .await
      .map_err(|source| VcsError::Io { path, source })
  }
}

#[async_trait]
impl VersionControl for Journal {
  async fn init(&self, dir: &Path) -> Result<(), VcsError> {
    tokio::fs::create_dir_all(dir).await.map_err(|source| VcsError::Io {
      path: dir.to_path_buf(),
      source,
    })?;

    if !dir.join(JOURNAL_FILENAME).exists() {
      Self::save(dir, &[]).await?;
    }
    Ok(())
  }

  async fn commit(&self, dir: &Path, user: &User, message: &str, files: &[&str]) -> Result<String, VcsError> {
    let mut history = Self::log(dir).await?;

    let mut digests = BTreeMap::new();
    for file in files {
      let path = dir.join(file);
      let bytes = tokio::fs::read(&path).await.map_err(|source| VcsError::Io { path, source })?;
      digests.insert(file.to_string(), hash_bytes(&bytes).0);
    }

    let parent = history.last().map(|c| c.hash.clone());
    let timestamp = unix_now();
    let hash = CommitSeed {
      parent: parent.as_deref(),
      message,
      author: user,
      timestamp,
      files: &digests,
    }
    .compute_hash()
    .map_err(VcsError::Serialize)?
    .0;

    history.push(JournalCommit {
      hash: hash.clone(),
      parent,
      message: message.to_string(),
      author: user.clone(),
      timestamp,
      files: digests,
    });
    Self::save(dir, &history).await?;

    debug!(dir = ?dir, commit = %hash, "journal commit");
    Ok(hash)
  }
}

/// Backend recording commits in a git repository through `gix`.
///
/// Each commit's tree holds exactly the committed files, which must be plain
/// file names. The index and working tree are not touched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Git;

impl Git {
  fn open(dir: &Path, user: &User) -> Result<gix::Repository, VcsError> {
    let options = gix::open::Options::isolated().config_overrides([
      format!("user.name={}", user.name),
      format!("user.email={}", user.email),
    ]);
    gix::open_opts(dir, options).map_err(|e| VcsError::git(dir, e))
  }

  fn commit_blocking(dir: &Path, user: &User, message: &str, files: &[String]) -> Result<String, VcsError> {
    let repo = Self::open(dir, user)?;

    let mut entries = Vec::with_capacity(files.len());
    for file in files {
      let path = dir.join(file);
      let bytes = std::fs::read(&path).map_err(|source| VcsError::Io { path, source })?;
      let blob = repo.write_blob(&bytes).map_err(|e| VcsError::git(dir, e))?;
      entries.push(tree::Entry {
        mode: tree::EntryKind::Blob.into(),
        filename: file.as_str().into(),
        oid: blob.detach(),
      });
    }
    entries.sort_by(|a, b| a.filename.cmp(&b.filename));
    entries.dedup_by(|a, b| a.filename == b.filename);

    let tree_id = repo
      .write_object(&Tree { entries })
      .map_err(|e| VcsError::git(dir, e))?
      .detach();
    let parent = repo
      .head()
      .map_err(|e| VcsError::git(dir, e))?
      .id()
      .map(|id| id.detach());

    let commit = repo
      .commit("HEAD", message, tree_id, parent)
      .map_err(|e| VcsError::git(dir, e))?;
    Ok(commit.detach().to_string())
  }
}

#[async_trait]
impl VersionControl for Git {
  async fn init(&self, dir: &Path) -> Result<(), VcsError> {
    tokio::fs::create_dir_all(dir).await.map_err(|source| VcsError::Io {
      path: dir.to_path_buf(),
      source,
    })?;

    if !dir.join(".git").exists() {
      let dir = dir.to_path_buf();
      tokio::task::spawn_blocking(move || gix::init(&dir).map(drop).map_err(|e| VcsError::git(&dir, e))).await??;
    }
    Ok(())
  }

  async fn commit(&self, dir: &Path, user: &User, message: &str, files: &[&str]) -> Result<String, VcsError> {
    let dir = dir.to_path_buf();
    let user = user.clone();
    let message = message.to_string();
    let files: Vec<String> = files.iter().map(|f| f.to_string()).collect();

    let hash =
      tokio::task::spawn_blocking(move || Self::commit_blocking(&dir, &user, &message, &files)).await??;
    debug!(commit = %hash, "git commit");
    Ok(hash)
  }
}
