//! `topo deploy`, `topo preview`, `topo check` and `topo analyze`.

use std::path::Path;

use anyhow::{Context, Result};

use topo_lib::deploy::DeployReport;
use topo_lib::plan::{Mode, PlanRecorder};
use topo_lib::reconcile::ReconcileReport;
use topo_lib::store_lock::LockMode;

use super::Session;
use crate::output::{OutputFormat, print_info, print_json, print_plan, print_stat, print_success, print_warning};

/// Deploy a revision, or preview the deployment when `preview` is set.
pub fn cmd_deploy(
  config: Option<&Path>,
  verbose: bool,
  system: &str,
  revision: Option<&str>,
  preview: bool,
  output: OutputFormat,
) -> Result<()> {
  let (mode, lock) = if preview {
    (Mode::Preview, LockMode::Shared)
  } else {
    (Mode::Live, LockMode::Exclusive)
  };
  let session = Session::open(config, lock, &format!("deploy {}", system))?;

  let mut recorder = PlanRecorder::new(mode);
  let result = session.block_on(
    session
      .orchestrator
      .deploy_revision(&session.user, system, revision, mode, &mut recorder),
  );
  let report = match result {
    Ok(report) => report,
    Err(err) => {
      if !output.is_json() {
        print_plan(recorder.plan(), verbose);
      }
      return Err(err).with_context(|| format!("Deployment of '{}' failed", system));
    }
  };

  if output.is_json() {
    return print_json(&report);
  }
  print_deploy_report(&report, verbose);
  Ok(())
}

/// Compare the live environment with the deployed revision.
pub fn cmd_check(config: Option<&Path>, verbose: bool, system: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "check")?;
  let report = session.block_on(session.orchestrator.check_system(&session.user, system))?;

  if output.is_json() {
    return print_json(&report);
  }
  print_reconcile(&report.reconcile);
  print_plan(&report.plan, verbose);
  if report.plan.operations.is_empty() {
    print_success(&format!("Revision {} matches the live environment", report.revision));
  } else {
    print_info(&format!(
      "{} operation(s) needed to converge revision {}",
      report.plan.operations.len(),
      report.revision
    ));
  }
  Ok(())
}

/// Inspect the live environment and print it with canonical ids.
pub fn cmd_analyze(config: Option<&Path>, system: &str, output: OutputFormat) -> Result<()> {
  let session = Session::open(config, LockMode::Shared, "analyze")?;
  let report = session.block_on(session.orchestrator.analyze_system(system))?;

  if output.is_json() {
    return print_json(&report);
  }
  print_reconcile(&report.reconcile);
  print_success(&format!(
    "Analyzed {} against revision {}",
    report.analyzed.name, report.revision
  ));
  print_stat("Containers", &report.analyzed.topology.len().to_string());
  print_stat("Definitions", &report.analyzed.container_definitions.len().to_string());
  Ok(())
}

fn print_deploy_report(report: &DeployReport, verbose: bool) {
  print_reconcile(&report.reconcile);
  print_plan(&report.plan, verbose);
  println!();

  match &report.committed {
    Some(committed) => print_success(&format!(
      "Deployed revision {} (recorded as revision {})",
      report.revision, committed.revision
    )),
    None => print_info(&format!("Preview of revision {}, nothing was changed", report.revision)),
  }
  for image in &report.images {
    print_stat(&image.definition_id, &image.docker_image_id);
  }
}

fn print_reconcile(report: &ReconcileReport) {
  for relabel in &report.containers_relabeled {
    print_stat("container", &format!("{} -> {}", relabel.from, relabel.to));
  }
  for relabel in &report.definitions_relabeled {
    print_stat("definition", &format!("{} -> {}", relabel.from, relabel.to));
  }
  for warning in collision_warnings(report) {
    print_warning(&warning);
  }
}

fn collision_warnings(report: &ReconcileReport) -> Vec<String> {
  report
    .collisions
    .iter()
    .map(|c| format!("container {} could not take id {} (image {})", c.from, c.to, c.docker_image_id))
    .collect()
}
