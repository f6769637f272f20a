//! `topo revision`: browse a system's history and move the deployed marker.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use serde::Serialize;

use topo_lib::store_lock::LockMode;

use super::Session;
use super::system::print_revision_summary;
use crate::output::{OutputFormat, format_timestamp, print_info, print_json, print_success};
use crate::prompts::confirm;

#[derive(Subcommand, Debug)]
pub enum RevisionCommand {
  /// List revisions, newest first
  List {
    /// System id, id prefix or name prefix
    system: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show one revision (default: the head)
  Show {
    /// System id, id prefix or name prefix
    system: String,

    /// Revision number or id prefix
    revision: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Record a revision as deployed without deploying it
  Mark {
    /// System id, id prefix or name prefix
    system: String,

    /// Revision number or id prefix
    revision: String,

    /// Skip confirmation prompt
    #[arg(long)]
    force: bool,
  },
}

pub fn cmd_revision(config: Option<&Path>, command: RevisionCommand) -> Result<()> {
  match command {
    RevisionCommand::List { system, output } => cmd_list(config, &system, output),
    RevisionCommand::Show {
      system,
      revision,
      output,
    } => cmd_show(config, &system, revision.as_deref(), output),
    RevisionCommand::Mark {
      system,
      revision,
      force,
    } => cmd_mark(config, &system, &revision, force),
  }
}

fn cmd_list(config: Option<&Path>, system: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "revision list")?;
  let revisions = session.block_on(session.orchestrator.list_revisions(system))?;

  if output.is_json() {
    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct RevisionListItem<'a> {
      revision: u64,
      id: &'a str,
      description: &'a str,
      deployed: bool,
      created_at: u64,
    }

    let items: Vec<RevisionListItem> = revisions
      .iter()
      .map(|r| RevisionListItem {
        revision: r.revision,
        id: &r.id,
        description: &r.description,
        deployed: r.deployed,
        created_at: r.created_at,
      })
      .collect();
    return print_json(&items);
  }

  if revisions.is_empty() {
    print_info("No revisions");
    return Ok(());
  }
  for revision in &revisions {
    let marker = if revision.deployed { " (deployed)" } else { "" };
    println!(
      "{:>4}{}  {} - {}",
      revision.revision,
      marker,
      revision.description,
      format_timestamp(revision.created_at)
    );
  }
  Ok(())
}

fn cmd_show(config: Option<&Path>, system: &str, revision: Option<&str>, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "revision show")?;
  let revision = session.block_on(session.orchestrator.get_revision(system, revision))?;

  if output.is_json() {
    return print_json(&revision);
  }
  print_revision_summary(&revision);
  Ok(())
}

fn cmd_mark(config: Option<&Path>, system: &str, revision: &str, force: bool) -> Result<()> {
  let question = format!(
    "Record revision {} of '{}' as deployed without deploying it?",
    revision, system
  );
  if !confirm(&question, force)? {
    print_info("Aborted");
    return Ok(());
  }

  let session = Session::open(config, LockMode::Exclusive, "revision mark")?;
  let marked = session.block_on(session.orchestrator.mark_revision(&session.user, system, revision))?;
  print_success(&format!(
    "Revision {} of {} is now marked as deployed",
    marked.revision, marked.system.name
  ));
  Ok(())
}
