mod container;
mod deploy;
mod revision;
mod system;
mod timeline;

use std::future::Future;
use std::path::Path;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tracing::debug;

use topo_lib::config::Config;
use topo_lib::deploy::Orchestrator;
use topo_lib::store_lock::{LockMode, StoreLock};
use topo_lib::types::User;

pub use container::{ContainerCommand, cmd_container};
pub use deploy::{cmd_analyze, cmd_check, cmd_deploy};
pub use revision::{RevisionCommand, cmd_revision};
pub use system::{SystemCommand, cmd_system};
pub use timeline::cmd_timeline;

/// Everything a command needs: configuration, the root lock and a wired orchestrator.
///
/// The lock is held until the session is dropped.
pub struct Session {
  pub user: User,
  pub orchestrator: Orchestrator,
  runtime: Runtime,
  _lock: StoreLock,
}

impl Session {
  pub fn open(config_path: Option<&Path>, mode: LockMode, command: &str) -> Result<Self> {
    let config = match config_path {
      Some(path) => Config::load(path)?,
      None => Config::load_default()?,
    };
    let root = config.root();
    debug!(root = ?root, command, "opening session");

    let lock = StoreLock::acquire(&root, mode, command).context("Failed to acquire root lock")?;
    let runtime = Runtime::new().context("Failed to create async runtime")?;
    let orchestrator = runtime
      .block_on(Orchestrator::open(&config))
      .context("Failed to open topo root")?;

    Ok(Self {
      user: config.user(),
      orchestrator,
      runtime,
      _lock: lock,
    })
  }

  pub fn block_on<F: Future>(&self, future: F) -> F::Output {
    self.runtime.block_on(future)
  }
}
