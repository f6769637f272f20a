//! Cross-process locking of the topo root.
//!
//! Commands that mutate the registry or revision histories hold an exclusive
//! lock on `{root}/.lock`; read-only commands hold a shared one. The holder of
//! an exclusive lock writes its pid and command into the file so contention
//! errors can name it.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::unix_now;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  Shared,
  Exclusive,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub root: PathBuf,
}

#[derive(Debug, Error)]
pub enum StoreLockError {
  #[error(
    "topo root is locked by another process: {command} (PID {pid}, started {started_at})\n\
             If you're sure no topo process is running, remove the lock file:\n  {lock_path}",
    lock_path = .lock_path.display()
  )]
  Contention {
    command: String,
    pid: u32,
    started_at: String,
    lock_path: PathBuf,
  },

  #[error(
    "topo root is locked (could not read lock metadata)\n\
             If you're sure no topo process is running, remove the lock file:\n  {lock_path}",
    lock_path = .lock_path.display()
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create root directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// A held lock on a topo root, released on drop.
#[derive(Debug)]
pub struct StoreLock {
  file: File,
  lock_path: PathBuf,
}

impl StoreLock {
  /// Reads the lock metadata through the held file handle.
  ///
  /// Opening a second handle would fail on Windows, where locks are mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  /// Take the lock on `root` without blocking.
  pub fn acquire(root: &Path, mode: LockMode, command: &str) -> Result<Self, StoreLockError> {
    let lock_path = root.join(LOCK_FILENAME);

    if !root.exists() {
      std::fs::create_dir_all(root).map_err(StoreLockError::CreateDir)?;
    }

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(StoreLockError::OpenFile)?;

    if let Err(err) = try_lock(&file, mode) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(StoreLockError::LockFailed(err));
    }

    if mode == LockMode::Exclusive {
      Self::write_metadata(&file, command, root)?;
    }

    debug!(lock = ?lock_path, mode = ?mode, "acquired root lock");
    Ok(StoreLock { file, lock_path })
  }

  fn write_metadata(file: &File, command: &str, root: &Path) -> Result<(), StoreLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: unix_now(),
      command: command.to_string(),
      root: root.to_path_buf(),
    };

    file.set_len(0).map_err(StoreLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata)
      .map_err(|e| StoreLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(StoreLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> StoreLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return StoreLockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at: format!("Unix timestamp {}", metadata.started_at_unix),
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    StoreLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  let operation = match mode {
    LockMode::Shared => FlockOperation::NonBlockingLockShared,
    LockMode::Exclusive => FlockOperation::NonBlockingLockExclusive,
  };

  flock(file.as_fd(), operation).map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;
  let flags = match mode {
    LockMode::Shared => LOCKFILE_FAIL_IMMEDIATELY,
    LockMode::Exclusive => LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
  };

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized.
  // LockFileEx is safe to call with a valid file handle and zeroed OVERLAPPED.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(handle, flags, 0, 1, 0, &mut overlapped)
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
