//! Deployment orchestration.
//!
//! [`Orchestrator`] drives the inspect / reconcile / build / deploy / commit
//! pipeline against pluggable collaborators (see [`collab`]) and exposes the
//! system, container-definition and revision operations built on the same
//! stores.

pub mod collab;
mod hooks;
mod orchestrator;
mod types;

pub use collab::{
  Analyzer, BuildOutput, Builder, CollaboratorError, DeployOutcome, DeployRequest, Deployer, Synchronizer,
};
pub use hooks::{HookCollaborators, HookCommands, HookError};
pub use orchestrator::{Collaborators, Orchestrator};
pub use types::{AnalysisReport, BuildReport, BuiltImage, DeployError, DeployReport, Stage};
