//! Boundaries to the external collaborators of the pipeline.
//!
//! Inspection, image synchronisation, image builds and the actual deployment
//! are performed by collaborators behind these traits. The crate ships one
//! implementation, [`HookCollaborators`](super::HookCollaborators), which runs
//! operator-configured shell commands.

use std::error::Error as StdError;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::plan::{Mode, PlanRecorder};
use crate::revision::RevisionStore;
use crate::system::{ContainerDefinition, System};
use crate::types::User;

/// A failure reported by a collaborator, passed through unchanged.
pub struct CollaboratorError(Box<dyn StdError + Send + Sync>);

impl CollaboratorError {
  pub fn new(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
    Self(err.into())
  }

  pub fn into_inner(self) -> Box<dyn StdError + Send + Sync> {
    self.0
  }
}

impl fmt::Debug for CollaboratorError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Debug::fmt(&self.0, f)
  }
}

impl fmt::Display for CollaboratorError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0, f)
  }
}

impl StdError for CollaboratorError {
  fn source(&self) -> Option<&(dyn StdError + 'static)> {
    self.0.source()
  }
}

impl From<String> for CollaboratorError {
  fn from(message: String) -> Self {
    Self::new(message)
  }
}

impl From<&str> for CollaboratorError {
  fn from(message: &str) -> Self {
    Self::new(message)
  }
}

/// Result of building one container definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
  pub docker_image_id: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl BuildOutput {
  pub fn new(docker_image_id: impl Into<String>) -> Self {
    Self {
      docker_image_id: docker_image_id.into(),
      extra: Map::new(),
    }
  }
}

/// Everything a [`Deployer`] needs to converge the live environment.
pub struct DeployRequest<'a> {
  pub user: &'a User,
  pub system_id: &'a str,
  /// Id of the revision being deployed.
  pub revision_id: &'a str,
  /// Reconciled result of inspecting the live environment.
  pub analyzed: &'a System,
  /// Target document with freshly built image ids.
  pub target: &'a System,
  pub revisions: &'a dyn RevisionStore,
  pub mode: Mode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployOutcome {
  #[serde(default)]
  pub message: Option<String>,
}

/// Inspects the live environment of a system.
#[async_trait]
pub trait Analyzer: Send + Sync {
  /// Return the live state as an analyzed [`System`], with ephemeral ids.
  async fn analyze(&self, config: &Value, canonical: &System) -> Result<System, CollaboratorError>;
}

/// Brings a definition's sources up to date before it is built.
#[async_trait]
pub trait Synchronizer: Send + Sync {
  async fn synch(
    &self,
    system: &System,
    definition: &mut ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait Builder: Send + Sync {
  async fn build(
    &self,
    mode: Mode,
    system: &System,
    definition: &ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<BuildOutput, CollaboratorError>;
}

#[async_trait]
pub trait Deployer: Send + Sync {
  /// Converge the environment; every action taken or planned goes into `recorder`.
  async fn deploy(&self, request: DeployRequest<'_>, recorder: &mut PlanRecorder)
  -> Result<DeployOutcome, CollaboratorError>;
}
