//! The deployment pipeline and the system/revision operations around it.
//!
//! A deployment runs these stages strictly in order, short-circuiting on the
//! first error and never rolling back:
//!
//! 1. resolve the system and target revision
//! 2. obtain the canonical document (deployed, else head)
//! 3. inspect the live environment
//! 4. reconcile analyzed ids onto canonical ones
//! 5. synchronise, then
//! 6. build every docker definition of the target, recording image ids
//! 7. deploy
//! 8. (live only) commit the deployed document and move the deployed marker
//!
//! Mutations of one system are serialised: two deployments (or a deployment
//! and an edit) of the same system never overlap.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::plan::{Level, Mode, PlanRecorder};
use crate::platform::paths::{registry_dir, systems_dir};
use crate::reconcile::reconcile;
use crate::registry::{SystemRegistry, SystemSummary};
use crate::revision::{
  FileRevisionStore, Revision, RevisionStore, TimelineEntry, TimelineKind, check_system_id,
};
use crate::system::{ContainerDefinition, System, validate};
use crate::types::User;
use crate::util::locks::KeyedLocks;

use super::collab::{Analyzer, Builder, CollaboratorError, DeployRequest, Deployer, Synchronizer};
use super::hooks::HookCollaborators;
use super::types::{AnalysisReport, BuildReport, BuiltImage, DeployError, DeployReport, Stage};

/// The four collaborators a pipeline run talks to.
#[derive(Clone)]
pub struct Collaborators {
  pub analyzer: Arc<dyn Analyzer>,
  pub synchronizer: Arc<dyn Synchronizer>,
  pub builder: Arc<dyn Builder>,
  pub deployer: Arc<dyn Deployer>,
}

impl Collaborators {
  /// Use one value for every stage.
  pub fn uniform<C>(collaborator: Arc<C>) -> Self
  where
    C: Analyzer + Synchronizer + Builder + Deployer + 'static,
  {
    Self {
      analyzer: collaborator.clone(),
      synchronizer: collaborator.clone(),
      builder: collaborator.clone(),
      deployer: collaborator,
    }
  }
}

fn collaborator_failed(stage: Stage, err: CollaboratorError) -> DeployError {
  error!(stage = %stage, error = %err, "collaborator failed");
  DeployError::Collaborator(err)
}

/// Resolve a definition by exact id, then id prefix, then name prefix (case-insensitive).
fn find_definition<'a>(system: &'a System, identifier: &str) -> Option<&'a ContainerDefinition> {
  if identifier.is_empty() {
    return None;
  }
  if let Some(def) = system.definition(identifier) {
    return Some(def);
  }

  let needle = identifier.to_lowercase();
  let defs = &system.container_definitions;
  defs
    .iter()
    .find(|d| d.id.to_lowercase().starts_with(&needle))
    .or_else(|| {
      defs
        .iter()
        .find(|d| d.name.as_deref().is_some_and(|n| n.to_lowercase().starts_with(&needle)))
    })
}

fn label(definition: &ContainerDefinition) -> &str {
  definition.name.as_deref().unwrap_or(&definition.id)
}

pub struct Orchestrator {
  registry: Arc<SystemRegistry>,
  revisions: Arc<dyn RevisionStore>,
  collaborators: Collaborators,
  analysis: Value,
  systems_dir: PathBuf,
  locks: KeyedLocks,
}

impl Orchestrator {
  pub fn new(
    registry: Arc<SystemRegistry>,
    revisions: Arc<dyn RevisionStore>,
    collaborators: Collaborators,
    systems_dir: PathBuf,
  ) -> Self {
    Self {
      registry,
      revisions,
      collaborators,
      analysis: Value::Null,
      systems_dir,
      locks: KeyedLocks::new(),
    }
  }

  /// Analysis configuration handed to the analyzer on every inspection.
  pub fn with_analysis(mut self, analysis: Value) -> Self {
    self.analysis = analysis;
    self
  }

  /// Wire up on-disk stores and hook collaborators below the configured root.
  pub async fn open(config: &Config) -> Result<Self, DeployError> {
    let root = config.root();
    info!(root = ?root, vcs = ?config.vcs, "opening topo root");

    let registry = SystemRegistry::boot(&registry_dir(&root), config.vcs.backend()).await?;
    let systems = systems_dir(&root);
    let revisions = Arc::new(FileRevisionStore::new(systems.clone()));
    let hooks = Arc::new(HookCollaborators::new(config.hooks.clone(), config.shell.clone()));

    Ok(
      Self::new(Arc::new(registry), revisions, Collaborators::uniform(hooks), systems)
        .with_analysis(config.analysis.clone()),
    )
  }

  pub fn registry(&self) -> &SystemRegistry {
    &self.registry
  }

  pub fn revisions(&self) -> &dyn RevisionStore {
    self.revisions.as_ref()
  }

  // Resolution helpers

  async fn resolve_system(&self, identifier: &str) -> Result<String, DeployError> {
    self
      .registry
      .find_system(identifier)
      .await
      .ok_or_else(|| DeployError::SystemNotFound(identifier.to_string()))
  }

  /// An explicit revision identifier, or the deployed-or-head revision.
  async fn resolve_revision(&self, system_id: &str, identifier: Option<&str>) -> Result<Revision, DeployError> {
    let Some(identifier) = identifier else {
      return self
        .revisions
        .deployed_or_head(system_id)
        .await?
        .ok_or_else(|| DeployError::EmptyHistory(system_id.to_string()));
    };

    let not_found = || DeployError::RevisionNotFound {
      system: system_id.to_string(),
      revision: identifier.to_string(),
    };
    let number = self
      .revisions
      .find_revision(system_id, identifier)
      .await?
      .ok_or_else(not_found)?;
    self.revisions.revision(system_id, Some(number)).await?.ok_or_else(not_found)
  }

  async fn head_of(&self, system_id: &str) -> Result<Revision, DeployError> {
    self
      .revisions
      .head(system_id)
      .await?
      .ok_or_else(|| DeployError::EmptyHistory(system_id.to_string()))
  }

  async fn commit(
    &self,
    user: &User,
    system_id: &str,
    description: &str,
    system: System,
    kind: TimelineKind,
  ) -> Result<Revision, DeployError> {
    let revision = self.revisions.commit_revision(system_id, description, system).await?;
    self
      .revisions
      .append_timeline(system_id, TimelineEntry::new(user, kind, description))
      .await?;
    info!(system = %system_id, revision = revision.revision, "{}", description);
    Ok(revision)
  }

  // Pipeline

  /// Deploy (or preview) a revision of a system.
  ///
  /// Without `revision_identifier` the deployed revision is redeployed, or the
  /// head when nothing was deployed yet.
  pub async fn deploy_revision(
    &self,
    user: &User,
    system_identifier: &str,
    revision_identifier: Option<&str>,
    mode: Mode,
    recorder: &mut PlanRecorder,
  ) -> Result<DeployReport, DeployError> {
    recorder.init_progress(Stage::COUNT);

    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let target = self.resolve_revision(&system_id, revision_identifier).await?;
    info!(
      stage = %Stage::ResolveTarget,
      system = %system_id,
      revision = target.revision,
      mode = %mode,
      "resolved deployment target"
    );
    recorder.progress();

    self.run_pipeline(user, &system_id, target, mode, true, recorder).await
  }

  /// Preview a deployment. Nothing is committed and the deployed marker stays put.
  pub async fn preview_revision(
    &self,
    user: &User,
    system_identifier: &str,
    revision_identifier: Option<&str>,
  ) -> Result<DeployReport, DeployError> {
    let mut recorder = PlanRecorder::new(Mode::Preview);
    self
      .deploy_revision(user, system_identifier, revision_identifier, Mode::Preview, &mut recorder)
      .await
  }

  /// Compare the live environment with the deployed-or-head revision without building anything.
  pub async fn check_system(&self, user: &User, system_identifier: &str) -> Result<DeployReport, DeployError> {
    let mut recorder = PlanRecorder::new(Mode::Preview);
    recorder.init_progress(Stage::COUNT);

    let system_id = self.resolve_system(system_identifier).await?;
    let target = self.resolve_revision(&system_id, None).await?;
    recorder.progress();

    self
      .run_pipeline(user, &system_id, target, Mode::Preview, false, &mut recorder)
      .await
  }

  /// Inspect and reconcile only.
  pub async fn analyze_system(&self, system_identifier: &str) -> Result<AnalysisReport, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let canonical = self.resolve_revision(&system_id, None).await?;

    let analyzed = self
      .collaborators
      .analyzer
      .analyze(&self.analysis, &canonical.system)
      .await
      .map_err(|e| collaborator_failed(Stage::Inspect, e))?;
    let (analyzed, reconcile_report) = reconcile(&canonical.system, analyzed);

    Ok(AnalysisReport {
      system_id,
      revision: canonical.revision,
      analyzed,
      reconcile: reconcile_report,
    })
  }

  async fn run_pipeline(
    &self,
    user: &User,
    system_id: &str,
    target: Revision,
    mode: Mode,
    build: bool,
    recorder: &mut PlanRecorder,
  ) -> Result<DeployReport, DeployError> {
    let canonical = match self.revisions.deployed(system_id).await? {
      Some(deployed) => deployed.system,
      None => self.head_of(system_id).await?.system,
    };
    info!(stage = %Stage::ObtainSystemDocument, system = %system_id, "obtained canonical document");
    recorder.progress();

    info!(stage = %Stage::Inspect, system = %system_id, "inspecting live environment");
    let analyzed = self
      .collaborators
      .analyzer
      .analyze(&self.analysis, &canonical)
      .await
      .map_err(|e| collaborator_failed(Stage::Inspect, e))?;
    recorder.progress();

    let (analyzed, reconcile_report) = reconcile(&canonical, analyzed);
    for collision in &reconcile_report.collisions {
      recorder.stdout(
        format!(
          "container {} could not take id {} (image {})",
          collision.from, collision.to, collision.docker_image_id
        ),
        Level::Warn,
      );
    }
    recorder.progress();

    let Revision {
      id: revision_id,
      revision: revision_number,
      system: mut document,
      ..
    } = target;

    let images = if build {
      self.synch_and_build(mode, &mut document, None, recorder).await?
    } else {
      recorder.progress();
      recorder.progress();
      Vec::new()
    };

    info!(stage = %Stage::Deploy, system = %system_id, revision = revision_number, mode = %mode, "deploying");
    let request = DeployRequest {
      user,
      system_id,
      revision_id: &revision_id,
      analyzed: &analyzed,
      target: &document,
      revisions: self.revisions.as_ref(),
      mode,
    };
    let outcome = self
      .collaborators
      .deployer
      .deploy(request, recorder)
      .await
      .map_err(|e| collaborator_failed(Stage::Deploy, e))?;
    if let Some(message) = outcome.message {
      recorder.stdout(message, Level::Info);
    }
    recorder.progress();

    let committed = if mode.is_live() {
      let description = format!("deployed revision {}", revision_number);
      match self.commit_deployment(user, system_id, &description, document).await {
        Ok(revision) => Some(revision),
        Err(err) => {
          let built = images
            .iter()
            .map(|i| i.docker_image_id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
          error!(
            stage = %Stage::CommitRevision,
            system = %system_id,
            revision = revision_number,
            images = %built,
            error = %err,
            "deployment applied but not recorded"
          );
          recorder.stdout(
            format!(
              "revision {} was deployed but could not be recorded (built images: {}): {}",
              revision_number, built, err
            ),
            Level::Error,
          );
          return Err(err);
        }
      }
    } else {
      None
    };
    recorder.progress();

    Ok(DeployReport {
      system_id: system_id.to_string(),
      revision: revision_number,
      committed,
      images,
      reconcile: reconcile_report,
      plan: recorder.plan().clone(),
    })
  }

  async fn commit_deployment(
    &self,
    user: &User,
    system_id: &str,
    description: &str,
    document: System,
  ) -> Result<Revision, DeployError> {
    let mut revision = self
      .commit(user, system_id, description, document, TimelineKind::Deploy)
      .await?;
    self.revisions.mark_deployed(system_id, revision.revision).await?;
    revision.deployed = true;
    Ok(revision)
  }

  /// Synchronise, then build, the docker definitions of `document` (or only `only`).
  ///
  /// Built image ids are written back into the document. Reports two progress steps.
  async fn synch_and_build(
    &self,
    mode: Mode,
    document: &mut System,
    only: Option<&str>,
    recorder: &mut PlanRecorder,
  ) -> Result<Vec<BuiltImage>, DeployError> {
    let ids: Vec<String> = document
      .container_definitions
      .iter()
      .filter(|d| only.map_or(d.spec.is_docker(), |id| d.id == id))
      .map(|d| d.id.clone())
      .collect();

    info!(stage = %Stage::Synchronize, definitions = ids.len(), "synchronizing definitions");
    for id in &ids {
      let Some(mut definition) = document.definition(id).cloned() else {
        continue;
      };
      self
        .collaborators
        .synchronizer
        .synch(document, &mut definition, recorder)
        .await
        .map_err(|e| collaborator_failed(Stage::Synchronize, e))?;
      // The definition keeps its id whatever the synchronizer returns.
      definition.id = id.clone();
      if let Some(slot) = document.definition_mut(id) {
        *slot = definition;
      }
    }
    recorder.progress();

    info!(stage = %Stage::Build, definitions = ids.len(), mode = %mode, "building images");
    let mut images = Vec::with_capacity(ids.len());
    for id in &ids {
      let Some(definition) = document.definition(id).cloned() else {
        continue;
      };
      let output = self
        .collaborators
        .builder
        .build(mode, document, &definition, recorder)
        .await
        .map_err(|e| collaborator_failed(Stage::Build, e))?;

      if let Some(slot) = document.definition_mut(id) {
        slot.spec.set_docker_image_id(output.docker_image_id.clone());
      }
      images.push(BuiltImage {
        definition_id: id.clone(),
        docker_image_id: output.docker_image_id,
      });
    }
    recorder.progress();

    Ok(images)
  }

  // Systems

  pub async fn list_systems(&self) -> Vec<SystemSummary> {
    self.registry.list_systems().await
  }

  /// Register a new, empty system and commit it as revision 1.
  pub async fn create_system(&self, user: &User, name: &str, namespace: &str) -> Result<Revision, DeployError> {
    let system_id = Uuid::new_v4().simple().to_string();
    let location = self.systems_dir.join(&system_id);
    self.registry.register(user, name, &location, &system_id).await?;

    let system = System::blank(&system_id, namespace, name);
    self
      .commit(user, &system_id, "created system", system, TimelineKind::Create)
      .await
  }

  /// Store a complete canonical document.
  ///
  /// A system that is not registered yet is registered, committed and marked
  /// deployed, as it describes an environment that already exists.
  pub async fn put_system(
    &self,
    user: &User,
    document: System,
    description: Option<&str>,
  ) -> Result<Revision, DeployError> {
    validate(&document)?;
    check_system_id(&document.id)?;

    let system_id = document.id.clone();
    let _guard = self.locks.lock(&system_id).await;

    if self.registry.contains(&system_id).await {
      return self
        .commit(
          user,
          &system_id,
          description.unwrap_or("updated system"),
          document,
          TimelineKind::Commit,
        )
        .await;
    }

    let location = self.systems_dir.join(&system_id);
    self
      .registry
      .register(user, &document.name, &location, &system_id)
      .await?;
    let mut revision = self
      .commit(
        user,
        &system_id,
        description.unwrap_or("imported system"),
        document,
        TimelineKind::Create,
      )
      .await?;
    self.revisions.mark_deployed(&system_id, revision.revision).await?;
    revision.deployed = true;
    Ok(revision)
  }

  pub async fn head_system(&self, system_identifier: &str) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    self.head_of(&system_id).await
  }

  pub async fn deployed_system(&self, system_identifier: &str) -> Result<Option<Revision>, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    Ok(self.revisions.deployed(&system_id).await?)
  }

  // Container definitions

  pub async fn list_containers(&self, system_identifier: &str) -> Result<Vec<ContainerDefinition>, DeployError> {
    Ok(self.head_system(system_identifier).await?.system.container_definitions)
  }

  pub async fn find_container(
    &self,
    system_identifier: &str,
    container_identifier: &str,
  ) -> Result<ContainerDefinition, DeployError> {
    let head = self.head_system(system_identifier).await?;
    find_definition(&head.system, container_identifier)
      .cloned()
      .ok_or_else(|| DeployError::ContainerNotFound {
        system: head.system_id.clone(),
        container: container_identifier.to_string(),
      })
  }

  /// Add a definition; an empty id is replaced by a generated one.
  pub async fn add_container(
    &self,
    user: &User,
    system_identifier: &str,
    mut definition: ContainerDefinition,
  ) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let mut system = self.head_of(&system_id).await?.system;

    if definition.id.is_empty() {
      definition.id = Uuid::new_v4().simple().to_string();
    }
    let description = format!("added container {}", label(&definition));
    system.container_definitions.push(definition);
    validate(&system)?;

    self
      .commit(user, &system_id, &description, system, TimelineKind::Commit)
      .await
  }

  /// Replace the definition with the same id.
  pub async fn put_container(
    &self,
    user: &User,
    system_identifier: &str,
    definition: ContainerDefinition,
  ) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let mut system = self.head_of(&system_id).await?.system;

    let description = format!("updated container {}", label(&definition));
    let Some(slot) = system.definition_mut(&definition.id) else {
      return Err(DeployError::ContainerNotFound {
        system: system_id,
        container: definition.id,
      });
    };
    *slot = definition;
    validate(&system)?;

    self
      .commit(user, &system_id, &description, system, TimelineKind::Commit)
      .await
  }

  /// Remove a definition no container instantiates.
  pub async fn delete_container(
    &self,
    user: &User,
    system_identifier: &str,
    container_identifier: &str,
  ) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let mut system = self.head_of(&system_id).await?.system;

    let Some(definition) = find_definition(&system, container_identifier).cloned() else {
      return Err(DeployError::ContainerNotFound {
        system: system_id,
        container: container_identifier.to_string(),
      });
    };

    let users: Vec<String> = system
      .topology
      .containers
      .values()
      .filter(|c| c.container_definition_id == definition.id)
      .map(|c| c.id.clone())
      .collect();
    if !users.is_empty() {
      return Err(DeployError::DefinitionInUse {
        definition: definition.id,
        containers: users,
      });
    }

    system.container_definitions.retain(|d| d.id != definition.id);
    let description = format!("deleted container {}", label(&definition));
    self
      .commit(user, &system_id, &description, system, TimelineKind::Commit)
      .await
  }

  /// Synchronise and build one definition for real, then commit the new image id.
  pub async fn build_container(
    &self,
    user: &User,
    system_identifier: &str,
    container_identifier: &str,
    recorder: &mut PlanRecorder,
  ) -> Result<BuildReport, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let mut system = self.head_of(&system_id).await?.system;

    let Some(definition_id) = find_definition(&system, container_identifier).map(|d| d.id.clone()) else {
      return Err(DeployError::ContainerNotFound {
        system: system_id,
        container: container_identifier.to_string(),
      });
    };

    recorder.init_progress(2);
    let mut images = self
      .synch_and_build(Mode::Live, &mut system, Some(&definition_id), recorder)
      .await?;
    let Some(image) = images.pop() else {
      return Err(DeployError::ContainerNotFound {
        system: system_id,
        container: definition_id,
      });
    };

    let description = format!("built container: {}", image.docker_image_id);
    let committed = self
      .commit(user, &system_id, &description, system, TimelineKind::Build)
      .await?;

    Ok(BuildReport {
      image,
      committed,
      plan: recorder.plan().clone(),
    })
  }

  // Revisions

  pub async fn list_revisions(&self, system_identifier: &str) -> Result<Vec<Revision>, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    Ok(self.revisions.list_revisions(&system_id).await?)
  }

  /// A specific revision, or the head.
  pub async fn get_revision(
    &self,
    system_identifier: &str,
    revision_identifier: Option<&str>,
  ) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    match revision_identifier {
      Some(_) => self.resolve_revision(&system_id, revision_identifier).await,
      None => self.head_of(&system_id).await,
    }
  }

  /// Move the deployed marker without deploying anything.
  pub async fn mark_revision(
    &self,
    user: &User,
    system_identifier: &str,
    revision_identifier: &str,
  ) -> Result<Revision, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    let _guard = self.locks.lock(&system_id).await;
    let mut revision = self.resolve_revision(&system_id, Some(revision_identifier)).await?;

    self.revisions.mark_deployed(&system_id, revision.revision).await?;
    let description = format!("marked revision {} as deployed", revision.revision);
    self
      .revisions
      .append_timeline(&system_id, TimelineEntry::new(user, TimelineKind::Mark, &description))
      .await?;
    info!(system = %system_id, revision = revision.revision, "{}", description);

    revision.deployed = true;
    Ok(revision)
  }

  pub async fn timeline(&self, system_identifier: &str) -> Result<Vec<TimelineEntry>, DeployError> {
    let system_id = self.resolve_system(system_identifier).await?;
    Ok(self.revisions.timeline(&system_id).await?)
  }
}
