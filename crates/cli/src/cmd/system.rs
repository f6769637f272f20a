//! `topo system`: register, import and inspect systems.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;

use topo_lib::revision::Revision;
use topo_lib::store_lock::LockMode;
use topo_lib::system::System;

use super::Session;
use crate::output::{OutputFormat, format_timestamp, print_info, print_json, print_stat, print_success, truncate_id};

#[derive(Subcommand, Debug)]
pub enum SystemCommand {
  /// List registered systems
  List {
    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Register a new, empty system
  Create {
    /// Display name of the system
    name: String,

    /// Namespace the system belongs to
    #[arg(long, default_value = "default")]
    namespace: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the head (or deployed) document of a system
  Show {
    /// System id, id prefix or name prefix
    system: String,

    /// Show the deployed revision instead of the head
    #[arg(long)]
    deployed: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Commit a complete system document read from a JSON file
  Put {
    /// Path to the system document
    file: PathBuf,

    /// Revision description
    #[arg(short, long)]
    message: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

pub fn cmd_system(config: Option<&Path>, command: SystemCommand) -> Result<()> {
  match command {
    SystemCommand::List { output } => cmd_list(config, output),
    SystemCommand::Create {
      name,
      namespace,
      output,
    } => cmd_create(config, &name, &namespace, output),
    SystemCommand::Show {
      system,
      deployed,
      output,
    } => cmd_show(config, &system, deployed, output),
    SystemCommand::Put { file, message, output } => cmd_put(config, &file, message.as_deref(), output),
  }
}

fn cmd_list(config: Option<&Path>, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "system list")?;
  let systems = session.block_on(session.orchestrator.list_systems());

  if output.is_json() {
    return print_json(&systems);
  }

  if systems.is_empty() {
    print_info("No systems registered");
    return Ok(());
  }
  for system in &systems {
    println!("{}  {}", system.id, system.name);
  }
  print_info(&format!("{} system(s) total", systems.len()));
  Ok(())
}

fn cmd_create(config: Option<&Path>, name: &str, namespace: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Exclusive, "system create")?;
  let revision = session
    .block_on(session.orchestrator.create_system(&session.user, name, namespace))
    .with_context(|| format!("Failed to create system '{}'", name))?;

  if output.is_json() {
    return print_json(&revision);
  }
  print_success(&format!("Created system {} ({})", name, revision.system_id));
  Ok(())
}

fn cmd_show(config: Option<&Path>, system: &str, deployed: bool, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "system show")?;
  let revision = if deployed {
    match session.block_on(session.orchestrator.deployed_system(system))? {
      Some(revision) => revision,
      None => {
        print_info(&format!("System '{}' has no deployed revision", system));
        return Ok(());
      }
    }
  } else {
    session.block_on(session.orchestrator.head_system(system))?
  };

  if output.is_json() {
    return print_json(&revision);
  }
  print_revision_summary(&revision);
  Ok(())
}

fn cmd_put(config: Option<&Path>, file: &Path, message: Option<&str>, output: OutputFormat) -> Result<()> {
  let content =
    std::fs::read_to_string(file).with_context(|| format!("Failed to read system document: {}", file.display()))?;
  let document: System =
    serde_json::from_str(&content).with_context(|| format!("Failed to parse system document: {}", file.display()))?;

  let session = Session::open(config, LockMode::Exclusive, "system put")?;
  let revision = session.block_on(session.orchestrator.put_system(&session.user, document, message))?;

  if output.is_json() {
    return print_json(&revision);
  }
  let deployed = if revision.deployed { " (deployed)" } else { "" };
  print_success(&format!(
    "Committed revision {} of {}{}",
    revision.revision, revision.system.name, deployed
  ));
  Ok(())
}

pub(super) fn print_revision_summary(revision: &Revision) {
  let system = &revision.system;
  let deployed = if revision.deployed { " (deployed)" } else { "" };
  print_success(&format!("{} revision {}{}", system.name, revision.revision, deployed));
  print_stat("Id", &system.id);
  print_stat("Namespace", &system.namespace);
  print_stat("Revision id", truncate_id(&revision.id));
  print_stat("Description", &revision.description);
  print_stat("Created", &format_timestamp(revision.created_at));
  print_stat("Containers", &system.topology.len().to_string());
  print_stat("Definitions", &system.container_definitions.len().to_string());
}
