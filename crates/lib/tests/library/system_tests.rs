//! System, container and revision operations outside the pipeline.

use std::sync::Arc;

use topo_lib::deploy::DeployError;
use topo_lib::plan::{Mode, PlanRecorder};
use topo_lib::revision::TimelineKind;
use topo_lib::system::{Container, ContainerDefinition, DefinitionSpec};

use super::common::{FakeCollaborator, SYSTEM_ID, canonical_system, file_orchestrator, seeded, user};

#[tokio::test]
async fn create_system_starts_an_undeployed_history() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;

  let created = orchestrator.create_system(&user(), "billing", "acme").await.unwrap();

  assert_eq!(created.revision, 1);
  assert_eq!(created.description, "created system");
  assert!(!created.deployed);
  assert_eq!(created.system.name, "billing");
  assert!(created.system.topology.is_empty());
  assert_eq!(created.system_id.len(), 32);

  let summaries = orchestrator.list_systems().await;
  assert_eq!(summaries.len(), 1);
  assert_eq!(summaries[0].id, created.system_id);
  assert!(orchestrator.deployed_system("BILL").await.unwrap().is_none());

  let timeline = orchestrator.timeline("billing").await.unwrap();
  assert_eq!(timeline.len(), 1);
  assert_eq!(timeline[0].kind, TimelineKind::Create);
}

#[tokio::test]
async fn importing_a_system_marks_it_deployed() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;

  let imported = orchestrator.put_system(&user(), canonical_system(), None).await.unwrap();
  assert_eq!(imported.description, "imported system");
  assert!(imported.deployed);

  let updated = orchestrator.put_system(&user(), canonical_system(), None).await.unwrap();
  assert_eq!(updated.revision, 2);
  assert_eq!(updated.description, "updated system");
  assert!(!updated.deployed);
  assert_eq!(orchestrator.deployed_system(SYSTEM_ID).await.unwrap().unwrap().revision, 1);
}

#[tokio::test]
async fn invalid_documents_are_rejected() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;

  let mut broken = canonical_system();
  broken.topology.insert(Container::new("orphan", "missing-definition"));
  let err = orchestrator.put_system(&user(), broken, None).await.unwrap_err();
  assert!(matches!(err, DeployError::InvalidSystem(_)));

  let mut escaping = canonical_system();
  escaping.id = "../etc".to_string();
  assert!(orchestrator.put_system(&user(), escaping, None).await.is_err());

  assert!(orchestrator.list_systems().await.is_empty());
}

#[tokio::test]
async fn container_definitions_round_trip_through_revisions() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;
  seeded(&orchestrator).await;

  let added = orchestrator
    .add_container(
      &user(),
      "web",
      ContainerDefinition::new("", DefinitionSpec::docker("img9")).with_name("worker"),
    )
    .await
    .unwrap();
  assert_eq!(added.revision, 3);
  assert_eq!(added.description, "added container worker");

  let worker = orchestrator.find_container("web", "work").await.unwrap();
  assert_eq!(worker.id.len(), 32);

  let renamed = worker.clone().with_name("queue-worker");
  let updated = orchestrator.put_container(&user(), "web", renamed).await.unwrap();
  assert_eq!(updated.description, "updated container queue-worker");
  assert_eq!(orchestrator.find_container("web", "queue").await.unwrap().id, worker.id);

  let deleted = orchestrator.delete_container(&user(), "web", &worker.id).await.unwrap();
  assert_eq!(deleted.revision, 5);
  assert_eq!(orchestrator.list_containers("web").await.unwrap().len(), 2);
}

#[tokio::test]
async fn definitions_in_use_cannot_be_deleted() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;
  seeded(&orchestrator).await;

  match orchestrator.delete_container(&user(), "web", "frontend").await {
    Err(DeployError::DefinitionInUse { definition, containers }) => {
      assert_eq!(definition, "cd2");
      assert_eq!(containers, vec!["c1".to_string()]);
    }
    other => panic!("expected DefinitionInUse, got {:?}", other.map(|r| r.revision)),
  }
  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_containers_are_not_found() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;
  seeded(&orchestrator).await;

  let err = orchestrator.find_container("web", "nope").await.unwrap_err();
  assert!(err.is_not_found());

  let ghost = ContainerDefinition::new("ghost", DefinitionSpec::docker("img0"));
  let err = orchestrator.put_container(&user(), "web", ghost).await.unwrap_err();
  assert!(matches!(err, DeployError::ContainerNotFound { .. }));
}

#[tokio::test]
async fn build_container_commits_the_new_image() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let report = orchestrator
    .build_container(&user(), "web", "front", &mut recorder)
    .await
    .unwrap();

  assert_eq!(report.image.docker_image_id, "built-cd2");
  assert_eq!(report.committed.revision, 3);
  assert_eq!(report.committed.description, "built container: built-cd2");
  assert_eq!(report.plan.progress.done, 2);
  assert_eq!(fake.calls(), vec!["synch:cd2".to_string(), "build:live:cd2".to_string()]);

  let head = orchestrator.head_system("web").await.unwrap();
  assert_eq!(head.system.definition("cd2").unwrap().docker_image_id(), Some("built-cd2"));
  assert_eq!(orchestrator.deployed_system("web").await.unwrap().unwrap().revision, 1);

  let timeline = orchestrator.timeline("web").await.unwrap();
  assert_eq!(timeline.last().unwrap().kind, TimelineKind::Build);
}

#[tokio::test]
async fn revisions_resolve_by_number_and_id_prefix() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;
  seeded(&orchestrator).await;

  let head = orchestrator.get_revision("web", None).await.unwrap();
  assert_eq!(head.revision, 2);

  let first = orchestrator.get_revision("web", Some("1")).await.unwrap();
  let by_prefix = orchestrator
    .get_revision("web", Some(&first.id[..8].to_uppercase()))
    .await
    .unwrap();
  assert_eq!(by_prefix.revision, 1);

  let listed: Vec<u64> = orchestrator
    .list_revisions("web")
    .await
    .unwrap()
    .iter()
    .map(|r| r.revision)
    .collect();
  assert_eq!(listed, vec![2, 1]);
}

#[tokio::test]
async fn mark_revision_moves_the_marker_only() {
  let (_temp, orchestrator) = file_orchestrator(Arc::new(FakeCollaborator::new())).await;
  seeded(&orchestrator).await;

  let marked = orchestrator.mark_revision(&user(), "web", "2").await.unwrap();
  assert!(marked.deployed);
  assert_eq!(orchestrator.deployed_system("web").await.unwrap().unwrap().revision, 2);
  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);

  let timeline = orchestrator.timeline("web").await.unwrap();
  let last = timeline.last().unwrap();
  assert_eq!(last.kind, TimelineKind::Mark);
  assert_eq!(last.description, "marked revision 2 as deployed");

  let err = orchestrator.mark_revision(&user(), "web", "no-such-rev").await.unwrap_err();
  assert!(err.is_not_found());
}
