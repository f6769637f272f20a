//! Identity reconciliation between a canonical and an analyzed system.
//!
//! Inspection of a live environment assigns fresh, ephemeral ids to every
//! container and definition it discovers. Before the analyzed document can be
//! compared with the canonical one, ids are mapped back using the only
//! identity that survives independent inspections: the content-derived docker
//! image id.
//!
//! Two passes run independently:
//!
//! 1. [`reconcile_topology`]: docker containers *directly* hosted by a
//!    virtualization host (`virtualbox` / `aws-ami`) are moved to the key of
//!    the first canonical hosted container running the same image.
//! 2. [`reconcile_definitions`]: docker definitions take the id of the first
//!    canonical docker definition with the same image.
//!
//! Anything that cannot be matched keeps its ephemeral id. Nothing is ever
//! created, dropped or merged, only renamed.
//!
//! # Collisions
//!
//! A move whose target key is already taken (by a container that stays in
//! place, or by an earlier move in the same pass) is skipped and reported in
//! [`ReconcileReport::collisions`]: the first claim wins and no container is
//! overwritten.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::system::System;

/// One id rewrite performed (or refused) during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Relabel {
  pub from: String,
  pub to: String,
  pub docker_image_id: String,
}

/// What a reconciliation run changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
  /// Hosted containers moved onto canonical keys.
  pub containers_relabeled: Vec<Relabel>,
  /// Hosted docker containers whose image matched nothing canonical.
  pub containers_unmatched: Vec<String>,
  /// Moves skipped because the canonical key was already taken.
  pub collisions: Vec<Relabel>,
  /// Docker definitions renamed to canonical ids.
  pub definitions_relabeled: Vec<Relabel>,
  /// Docker definitions whose image matched nothing canonical.
  pub definitions_unmatched: Vec<String>,
}

impl ReconcileReport {
  /// True if no id was rewritten.
  pub fn is_unchanged(&self) -> bool {
    self.containers_relabeled.is_empty() && self.definitions_relabeled.is_empty()
  }

  fn merge(&mut self, other: ReconcileReport) {
    self.containers_relabeled.extend(other.containers_relabeled);
    self.containers_unmatched.extend(other.containers_unmatched);
    self.collisions.extend(other.collisions);
    self.definitions_relabeled.extend(other.definitions_relabeled);
    self.definitions_unmatched.extend(other.definitions_unmatched);
  }
}

/// Flat view of one hosted docker container used for matching.
#[derive(Debug, Clone)]
struct CompareRecord {
  id: String,
  contained_by: String,
  docker_image_id: String,
}

/// Hosted docker containers of `system`, hosts in topology order, children in `contains` order.
///
/// The image id comes from the child's definition, falling back to the
/// container's own `specific.dockerImageId` when the definition has none.
fn compare_records(system: &System) -> Vec<CompareRecord> {
  let mut records = Vec::new();

  for host in system.hosts() {
    for child_id in &host.contains {
      let Some(child) = system.topology.get(child_id) else {
        continue;
      };
      let Some(def) = system.definition_of(child) else {
        continue;
      };
      if !def.spec.is_docker() {
        continue;
      }
      let Some(image) = def.docker_image_id().or(child.specific.docker_image_id.as_deref()) else {
        continue;
      };

      records.push(CompareRecord {
        id: child_id.clone(),
        contained_by: host.id.clone(),
        docker_image_id: image.to_string(),
      });
    }
  }

  records
}

/// Index records by image id, keeping the first record per image (scan order).
fn first_by_image(records: &[CompareRecord]) -> HashMap<&str, &CompareRecord> {
  let mut index = HashMap::new();
  for record in records {
    index.entry(record.docker_image_id.as_str()).or_insert(record);
  }
  index
}

/// Move hosted containers of `analyzed` onto the ids of their canonical counterparts.
pub fn reconcile_topology(canonical: &System, analyzed: &mut System) -> ReconcileReport {
  let mut report = ReconcileReport::default();

  let canonical_records = compare_records(canonical);
  let index = first_by_image(&canonical_records);

  let mut candidates: Vec<(CompareRecord, String)> = Vec::new();
  for record in compare_records(analyzed) {
    match index.get(record.docker_image_id.as_str()) {
      Some(target) if target.id == record.id => {}
      Some(target) => {
        let to = target.id.clone();
        candidates.push((record, to));
      }
      None => {
        debug!(container = %record.id, image = %record.docker_image_id, "no canonical match");
        report.containers_unmatched.push(record.id);
      }
    }
  }

  // A move may target a key that is itself moving away; a key that stays, or
  // one already claimed earlier in scan order, blocks it. Rejections can free
  // no key, so iterate until the accepted set is stable.
  let mut accepted = candidates;
  loop {
    let rejected: Vec<usize> = {
      let moving: HashSet<&str> = accepted.iter().map(|(r, _)| r.id.as_str()).collect();
      let mut claimed: HashSet<&str> = HashSet::new();
      accepted
        .iter()
        .enumerate()
        .filter(|(_, (_, to))| {
          let occupied = analyzed.topology.containers.contains_key(to) && !moving.contains(to.as_str());
          occupied || !claimed.insert(to.as_str())
        })
        .map(|(i, _)| i)
        .collect()
    };

    if rejected.is_empty() {
      break;
    }

    for i in rejected.into_iter().rev() {
      let (record, to) = accepted.remove(i);
      warn!(
        container = %record.id,
        target = %to,
        image = %record.docker_image_id,
        "canonical id already taken, keeping ephemeral id"
      );
      report.collisions.push(Relabel {
        from: record.id,
        to,
        docker_image_id: record.docker_image_id,
      });
    }
  }

  // Sources leave every parent list before any target is appended so that
  // chained moves never see each other's keys.
  let containers = &mut analyzed.topology.containers;
  for (record, _) in &accepted {
    if let Some(parent) = containers.get_mut(&record.contained_by) {
      parent.contains.retain(|c| c != &record.id);
    }
  }

  let mut moved = Vec::with_capacity(accepted.len());
  for (record, to) in &accepted {
    if let Some(container) = containers.shift_remove(&record.id) {
      moved.push((record, to, container));
    }
  }

  for (record, to, mut container) in moved {
    container.id = to.clone();
    let grandchildren = container.contains.clone();
    containers.insert(to.clone(), container);

    if let Some(parent) = containers.get_mut(&record.contained_by) {
      parent.contains.push(to.clone());
    }
    for grandchild in grandchildren {
      if let Some(c) = containers.get_mut(&grandchild) {
        c.contained_by = Some(to.clone());
      }
    }

    debug!(from = %record.id, to = %to, image = %record.docker_image_id, "relabeled container");
    report.containers_relabeled.push(Relabel {
      from: record.id.clone(),
      to: to.clone(),
      docker_image_id: record.docker_image_id.clone(),
    });
  }

  report
}

/// Rename docker definitions of `analyzed` to the ids of canonical definitions with the same image.
///
/// Containers referencing a renamed definition follow the rename. Definitions
/// are never merged, so two analyzed definitions of one image can end up
/// sharing the canonical id.
pub fn reconcile_definitions(canonical: &System, analyzed: &mut System) -> ReconcileReport {
  let mut report = ReconcileReport::default();

  let mut index: HashMap<&str, &str> = HashMap::new();
  for def in canonical.container_definitions.iter().filter(|d| d.spec.is_docker()) {
    if let Some(image) = def.docker_image_id() {
      index.entry(image).or_insert(def.id.as_str());
    }
  }

  let mut renamed: HashMap<String, String> = HashMap::new();
  for def in analyzed
    .container_definitions
    .iter_mut()
    .filter(|d| d.spec.is_docker())
  {
    let matched = def.docker_image_id().and_then(|image| index.get(image).map(|id| (image, *id)));
    match matched {
      Some((_, canonical_id)) if canonical_id == def.id => {}
      Some((image, canonical_id)) => {
        debug!(from = %def.id, to = %canonical_id, image = %image, "relabeled definition");
        report.definitions_relabeled.push(Relabel {
          from: def.id.clone(),
          to: canonical_id.to_string(),
          docker_image_id: image.to_string(),
        });
        renamed.entry(def.id.clone()).or_insert_with(|| canonical_id.to_string());
        def.id = canonical_id.to_string();
      }
      None => report.definitions_unmatched.push(def.id.clone()),
    }
  }

  if !renamed.is_empty() {
    for container in analyzed.topology.containers.values_mut() {
      if let Some(new_id) = renamed.get(&container.container_definition_id) {
        container.container_definition_id = new_id.clone();
      }
    }
  }

  report
}

/// Run both passes: topology first, then definitions.
pub fn reconcile(canonical: &System, mut analyzed: System) -> (System, ReconcileReport) {
  let mut report = reconcile_topology(canonical, &mut analyzed);
  report.merge(reconcile_definitions(canonical, &mut analyzed));

  info!(
    system = %canonical.id,
    containers_relabeled = report.containers_relabeled.len(),
    containers_unmatched = report.containers_unmatched.len(),
    collisions = report.collisions.len(),
    definitions_relabeled = report.definitions_relabeled.len(),
    "reconciled analyzed topology"
  );

  (analyzed, report)
}
