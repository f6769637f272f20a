//! Shared utilities.
//!
//! Common utilities used across the crate including hashing, atomic writes,
//! per-key async locks and test helpers.

pub mod fs;
pub mod hash;
pub mod locks;

#[cfg(test)]
pub mod testutil;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_secs()
}
