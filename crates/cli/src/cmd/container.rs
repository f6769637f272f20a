//! `topo container`: container definitions of a system.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;

use topo_lib::plan::{Mode, PlanRecorder};
use topo_lib::store_lock::LockMode;

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_plan, print_success};

#[derive(Subcommand, Debug)]
pub enum ContainerCommand {
  /// List the container definitions of a system's head revision
  List {
    /// System id, id prefix or name prefix
    system: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Synchronise and build one definition, committing the new image id
  Build {
    /// System id, id prefix or name prefix
    system: String,

    /// Definition id, id prefix or name prefix
    container: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

pub fn cmd_container(config: Option<&Path>, verbose: bool, command: ContainerCommand) -> Result<()> {
  match command {
    ContainerCommand::List { system, output } => cmd_list(config, &system, output),
    ContainerCommand::Build {
      system,
      container,
      output,
    } => cmd_build(config, verbose, &system, &container, output),
  }
}

fn cmd_list(config: Option<&Path>, system: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "container list")?;
  let definitions = session.block_on(session.orchestrator.list_containers(system))?;

  if output.is_json() {
    return print_json(&definitions);
  }

  if definitions.is_empty() {
    print_info("No container definitions");
    return Ok(());
  }
  for definition in &definitions {
    let name = definition.name.as_deref().unwrap_or("-");
    let image = definition.docker_image_id().unwrap_or("-");
    println!("{}  {}  {}  {}", definition.id, definition.spec.kind(), name, image);
  }
  Ok(())
}

fn cmd_build(config: Option<&Path>, verbose: bool, system: &str, container: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Exclusive, "container build")?;
  let mut recorder = PlanRecorder::new(Mode::Live);
  let report = session
    .block_on(
      session
        .orchestrator
        .build_container(&session.user, system, container, &mut recorder),
    )
    .with_context(|| format!("Failed to build container '{}'", container))?;

  if output.is_json() {
    return print_json(&report);
  }
  print_plan(&report.plan, verbose);
  print_success(&format!(
    "Built {} as {} (revision {})",
    report.image.definition_id, report.image.docker_image_id, report.committed.revision
  ));
  Ok(())
}
