use std::path::Path;

use anyhow::Result;

use topo_lib::store_lock::LockMode;

use super::Session;
use crate::output::{OutputFormat, format_timestamp, print_info, print_json};

pub fn cmd_timeline(config: Option<&Path>, system: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "timeline")?;
  let entries = session.block_on(session.orchestrator.timeline(system))?;

  if output.is_json() {
    return print_json(&entries);
  }

  if entries.is_empty() {
    print_info("No timeline entries");
    return Ok(());
  }
  for entry in &entries {
    println!(
      "{:<8} {} - {} ({})",
      entry.kind,
      entry.description,
      entry.user.name,
      format_timestamp(entry.timestamp)
    );
  }
  Ok(())
}
