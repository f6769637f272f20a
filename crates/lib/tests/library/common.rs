//! Shared fixtures: an orchestrator over a temp root and scriptable collaborators.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::TempDir;
use topo_lib::deploy::{
  Analyzer, BuildOutput, Builder, CollaboratorError, Collaborators, DeployOutcome, DeployRequest, Deployer,
  Orchestrator, Synchronizer,
};
use topo_lib::plan::{Level, Mode, PlanRecorder};
use topo_lib::registry::{Journal, SystemRegistry};
use topo_lib::revision::{
  FileRevisionStore, MemoryRevisionStore, Revision, RevisionError, RevisionStore, TimelineEntry,
};
use topo_lib::system::{Container, ContainerDefinition, DefinitionSpec, MachineImage, System};
use topo_lib::types::User;

pub const SYSTEM_ID: &str = "5f0c2d9a";

pub fn user() -> User {
  User::new("ada", "ada@example.com")
}

fn host(id: &str, definition: &str, children: &[&str]) -> Container {
  let mut container = Container::new(id, definition);
  container.contains = children.iter().map(|c| c.to_string()).collect();
  container
}

fn child(id: &str, definition: &str, image: &str) -> Container {
  let mut container = Container::new(id, definition);
  container.contained_by = Some("vm1".to_string());
  container.specific.docker_image_id = Some(image.to_string());
  container
}

/// `vm1` (aws-ami) hosting `c1`, built from docker definition `cd2`.
pub fn canonical_system() -> System {
  let mut system = System::blank(SYSTEM_ID, "acme", "web");
  system.container_definitions = vec![
    ContainerDefinition::new("cd1", DefinitionSpec::AwsAmi(MachineImage::default())),
    ContainerDefinition::new("cd2", DefinitionSpec::docker("img123")).with_name("frontend"),
  ];
  system.topology.insert(host("vm1", "cd1", &["c1"]));
  system.topology.insert(child("c1", "cd2", "img123"));
  system
}

/// The live view of [`canonical_system`], with the ids inspection would invent.
pub fn live_system() -> System {
  let mut system = System::blank(SYSTEM_ID, "acme", "web");
  system.container_definitions = vec![
    ContainerDefinition::new("cd1", DefinitionSpec::AwsAmi(MachineImage::default())),
    ContainerDefinition::new("def-9f2", DefinitionSpec::docker("img123")),
  ];
  system.topology.insert(host("vm1", "cd1", &["xyz"]));
  system.topology.insert(child("xyz", "def-9f2", "img123"));
  system
}

/// Collaborator that serves a fixed live system and logs every call.
pub struct FakeCollaborator {
  live: System,
  fail_at: Option<&'static str>,
  calls: Mutex<Vec<String>>,
}

impl FakeCollaborator {
  pub fn new() -> Self {
    Self {
      live: live_system(),
      fail_at: None,
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Fail the named stage (`analyze`, `synch`, `build` or `deploy`).
  pub fn failing_at(stage: &'static str) -> Self {
    Self {
      fail_at: Some(stage),
      ..Self::new()
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn called(&self, stage: &str) -> bool {
    self.calls().iter().any(|c| c.starts_with(stage))
  }

  fn enter(&self, stage: &'static str, detail: impl AsRef<str>) -> Result<(), CollaboratorError> {
    self.calls.lock().unwrap().push(format!("{}:{}", stage, detail.as_ref()));
    if self.fail_at == Some(stage) {
      return Err(format!("{} exploded", stage).into());
    }
    Ok(())
  }
}

#[async_trait]
impl Analyzer for FakeCollaborator {
  async fn analyze(&self, _config: &Value, canonical: &System) -> Result<System, CollaboratorError> {
    self.enter("analyze", &canonical.id)?;
    Ok(self.live.clone())
  }
}

#[async_trait]
impl Synchronizer for FakeCollaborator {
  async fn synch(
    &self,
    _system: &System,
    definition: &mut ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<(), CollaboratorError> {
    self.enter("synch", &definition.id)?;
    recorder.stdout(format!("synchronized {}", definition.id), Level::Debug);
    Ok(())
  }
}

#[async_trait]
impl Builder for FakeCollaborator {
  async fn build(
    &self,
    mode: Mode,
    _system: &System,
    definition: &ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<BuildOutput, CollaboratorError> {
    self.enter("build", format!("{}:{}", mode, definition.id))?;
    recorder.record("build", &definition.id, "docker build");
    Ok(BuildOutput::new(format!("built-{}", definition.id)))
  }
}

#[async_trait]
impl Deployer for FakeCollaborator {
  async fn deploy(
    &self,
    request: DeployRequest<'_>,
    recorder: &mut PlanRecorder,
  ) -> Result<DeployOutcome, CollaboratorError> {
    self.enter("deploy", format!("{}:{}", request.mode, request.system_id))?;
    for id in request.target.topology.containers.keys() {
      if request.analyzed.topology.get(id).is_none() {
        recorder.record("start", id, "start container");
      }
    }
    Ok(DeployOutcome {
      message: Some(format!("converged {} containers", request.target.topology.len())),
    })
  }
}

/// In-memory store whose commits start failing once [`BrokenCommits::break_commits`] is called.
#[derive(Default)]
pub struct BrokenCommits {
  inner: MemoryRevisionStore,
  broken: AtomicBool,
}

impl BrokenCommits {
  pub fn break_commits(&self) {
    self.broken.store(true, Ordering::SeqCst);
  }
}

#[async_trait]
impl RevisionStore for BrokenCommits {
  async fn commit_revision(
    &self,
    system_id: &str,
    description: &str,
    system: System,
  ) -> Result<Revision, RevisionError> {
    if self.broken.load(Ordering::SeqCst) {
      return Err(RevisionError::InvalidSystemId("disk full".to_string()));
    }
    self.inner.commit_revision(system_id, description, system).await
  }

  async fn head(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    self.inner.head(system_id).await
  }

  async fn revision(&self, system_id: &str, number: Option<u64>) -> Result<Option<Revision>, RevisionError> {
    self.inner.revision(system_id, number).await
  }

  async fn mark_deployed(&self, system_id: &str, number: u64) -> Result<(), RevisionError> {
    self.inner.mark_deployed(system_id, number).await
  }

  async fn deployed(&self, system_id: &str) -> Result<Option<Revision>, RevisionError> {
    self.inner.deployed(system_id).await
  }

  async fn list_revisions(&self, system_id: &str) -> Result<Vec<Revision>, RevisionError> {
    self.inner.list_revisions(system_id).await
  }

  async fn append_timeline(&self, system_id: &str, entry: TimelineEntry) -> Result<(), RevisionError> {
    self.inner.append_timeline(system_id, entry).await
  }

  async fn timeline(&self, system_id: &str) -> Result<Vec<TimelineEntry>, RevisionError> {
    self.inner.timeline(system_id).await
  }
}

pub async fn orchestrator_with(
  root: &Path,
  collaborator: Arc<FakeCollaborator>,
  revisions: Arc<dyn RevisionStore>,
) -> Orchestrator {
  let registry = SystemRegistry::boot(&root.join("registry"), Arc::new(Journal))
    .await
    .unwrap();
  Orchestrator::new(
    Arc::new(registry),
    revisions,
    Collaborators::uniform(collaborator),
    root.join("systems"),
  )
}

/// An orchestrator over on-disk stores below a fresh temp dir.
pub async fn file_orchestrator(collaborator: Arc<FakeCollaborator>) -> (TempDir, Orchestrator) {
  let temp = TempDir::new().unwrap();
  let revisions = Arc::new(FileRevisionStore::new(temp.path().join("systems")));
  let orchestrator = orchestrator_with(temp.path(), collaborator, revisions).await;
  (temp, orchestrator)
}

pub async fn memory_orchestrator(collaborator: Arc<FakeCollaborator>) -> (TempDir, Orchestrator) {
  let temp = TempDir::new().unwrap();
  let orchestrator = orchestrator_with(temp.path(), collaborator, Arc::new(MemoryRevisionStore::new())).await;
  (temp, orchestrator)
}

/// Imports [`canonical_system`] (revision 1, deployed) and commits an edit on top (revision 2).
pub async fn seeded(orchestrator: &Orchestrator) {
  orchestrator.put_system(&user(), canonical_system(), None).await.unwrap();

  let mut edited = canonical_system();
  edited.container_definitions[1] =
    ContainerDefinition::new("cd2", DefinitionSpec::docker("img456")).with_name("frontend");
  orchestrator
    .put_system(&user(), edited, Some("bump frontend"))
    .await
    .unwrap();
}
