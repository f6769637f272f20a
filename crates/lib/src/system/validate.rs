//! Structural checks for canonical system documents.

use std::collections::HashSet;
use std::fmt;

use thiserror::Error;

use super::types::System;

/// A single broken invariant in a system document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
  /// A topology key differs from the `id` of the container stored under it.
  KeyMismatch { key: String, id: String },
  /// Two definitions share an id.
  DuplicateDefinition(String),
  /// A container references a definition that does not exist.
  UnknownDefinition { container: String, definition: String },
  /// `containedBy` names a container that does not exist.
  MissingParent { container: String, parent: String },
  /// `contains` names a container that does not exist.
  MissingChild { container: String, child: String },
  /// `containedBy` and the parent's `contains` disagree.
  ContainmentMismatch { parent: String, child: String },
}

impl fmt::Display for Violation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Violation::KeyMismatch { key, id } => write!(f, "container stored under '{}' has id '{}'", key, id),
      Violation::DuplicateDefinition(id) => write!(f, "duplicate container definition '{}'", id),
      Violation::UnknownDefinition { container, definition } => {
        write!(f, "container '{}' references unknown definition '{}'", container, definition)
      }
      Violation::MissingParent { container, parent } => {
        write!(f, "container '{}' is contained by missing container '{}'", container, parent)
      }
      Violation::MissingChild { container, child } => {
        write!(f, "container '{}' contains missing container '{}'", container, child)
      }
      Violation::ContainmentMismatch { parent, child } => {
        write!(f, "containment of '{}' in '{}' is not recorded on both sides", child, parent)
      }
    }
  }
}

/// A system document broke one or more invariants.
#[derive(Debug, Error)]
#[error("system '{system}' is invalid: {}", format_violations(.violations))]
pub struct ValidationError {
  pub system: String,
  pub violations: Vec<Violation>,
}

fn format_violations(violations: &[Violation]) -> String {
  violations.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

/// Check containment consistency and definition references, collecting every violation.
pub fn validate(system: &System) -> Result<(), ValidationError> {
  let mut violations = Vec::new();

  let mut seen = HashSet::new();
  for def in &system.container_definitions {
    if !seen.insert(def.id.as_str()) {
      violations.push(Violation::DuplicateDefinition(def.id.clone()));
    }
  }

  let containers = &system.topology.containers;
  for (key, container) in containers {
    if key != &container.id {
      violations.push(Violation::KeyMismatch {
        key: key.clone(),
        id: container.id.clone(),
      });
    }

    if !seen.contains(container.container_definition_id.as_str()) {
      violations.push(Violation::UnknownDefinition {
        container: key.clone(),
        definition: container.container_definition_id.clone(),
      });
    }

    if let Some(parent_id) = &container.contained_by {
      match containers.get(parent_id) {
        None => violations.push(Violation::MissingParent {
          container: key.clone(),
          parent: parent_id.clone(),
        }),
        Some(parent) if !parent.contains.contains(key) => violations.push(Violation::ContainmentMismatch {
          parent: parent_id.clone(),
          child: key.clone(),
        }),
        Some(_) => {}
      }
    }

    for child_id in &container.contains {
      match containers.get(child_id) {
        None => violations.push(Violation::MissingChild {
          container: key.clone(),
          child: child_id.clone(),
        }),
        Some(child) if child.contained_by.as_deref() != Some(key.as_str()) => {
          violations.push(Violation::ContainmentMismatch {
            parent: key.clone(),
            child: child_id.clone(),
          })
        }
        Some(_) => {}
      }
    }
  }

  if violations.is_empty() {
    Ok(())
  } else {
    Err(ValidationError {
      system: system.id.clone(),
      violations,
    })
  }
}
