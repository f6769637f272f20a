//! Per-key async mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A set of async mutexes keyed by string, created on first use.
///
/// Holders of the guard for one key never block holders of another key.
#[derive(Debug, Default)]
pub struct KeyedLocks {
  locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wait for exclusive access to `key`.
  pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
    let mutex = {
      let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
      locks.entry(key.to_string()).or_default().clone()
    };
    mutex.lock_owned().await
  }
}
