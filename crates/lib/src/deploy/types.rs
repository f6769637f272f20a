use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::plan::OperationPlan;
use crate::reconcile::ReconcileReport;
use crate::registry::RegistryError;
use crate::revision::{Revision, RevisionError};
use crate::system::{System, ValidationError};

use super::collab::CollaboratorError;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
  ResolveTarget,
  ObtainSystemDocument,
  Inspect,
  Reconcile,
  Synchronize,
  Build,
  Deploy,
  CommitRevision,
}

impl Stage {
  /// Number of stages a full run reports progress for.
  pub const COUNT: u32 = 8;
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      Stage::ResolveTarget => "resolve-target",
      Stage::ObtainSystemDocument => "obtain-system-document",
      Stage::Inspect => "inspect",
      Stage::Reconcile => "reconcile",
      Stage::Synchronize => "synchronize",
      Stage::Build => "build",
      Stage::Deploy => "deploy",
      Stage::CommitRevision => "commit-revision",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Error)]
pub enum DeployError {
  #[error("system '{0}' not found")]
  SystemNotFound(String),

  #[error("revision '{revision}' of system '{system}' not found")]
  RevisionNotFound { system: String, revision: String },

  #[error("container '{container}' not found in system '{system}'")]
  ContainerNotFound { system: String, container: String },

  #[error("system '{0}' has no revisions")]
  EmptyHistory(String),

  #[error(transparent)]
  InvalidSystem(#[from] ValidationError),

  #[error("container definition '{definition}' is still used by: {}", .containers.join(", "))]
  DefinitionInUse { definition: String, containers: Vec<String> },

  #[error(transparent)]
  Revision(#[from] RevisionError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Collaborator(#[from] CollaboratorError),
}

impl DeployError {
  /// True for the "something named by the caller does not exist" family.
  pub fn is_not_found(&self) -> bool {
    matches!(
      self,
      DeployError::SystemNotFound(_)
        | DeployError::RevisionNotFound { .. }
        | DeployError::ContainerNotFound { .. }
        | DeployError::EmptyHistory(_)
    )
  }
}

/// An image produced for one container definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltImage {
  pub definition_id: String,
  pub docker_image_id: String,
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployReport {
  pub system_id: String,
  /// The revision that was deployed (or previewed).
  pub revision: u64,
  /// Revision committed by a live run.
  pub committed: Option<Revision>,
  pub images: Vec<BuiltImage>,
  pub reconcile: ReconcileReport,
  pub plan: OperationPlan,
}

/// Outcome of inspecting a live environment.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
  pub system_id: String,
  /// Revision the analyzed document was reconciled against.
  pub revision: u64,
  pub analyzed: System,
  pub reconcile: ReconcileReport,
}

/// Outcome of building a single container definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
  pub image: BuiltImage,
  pub committed: Revision,
  pub plan: OperationPlan,
}
