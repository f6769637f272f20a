//! Pipeline runs against scripted collaborators.

use std::sync::Arc;

use topo_lib::deploy::DeployError;
use topo_lib::plan::{Level, Mode, PlanRecorder};
use topo_lib::reconcile::Relabel;
use topo_lib::revision::TimelineKind;

use super::common::{
  BrokenCommits, FakeCollaborator, file_orchestrator, memory_orchestrator, orchestrator_with, seeded, user,
};

#[tokio::test]
async fn preview_changes_nothing() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let report = orchestrator.preview_revision(&user(), "web", Some("2")).await.unwrap();

  assert_eq!(report.revision, 2);
  assert!(report.committed.is_none());
  assert_eq!(report.plan.mode, Mode::Preview);
  assert_eq!(report.images.len(), 1);
  assert_eq!(report.images[0].definition_id, "cd2");
  assert_eq!(report.images[0].docker_image_id, "built-cd2");
  assert!(fake.calls().contains(&"build:preview:cd2".to_string()));
  assert!(fake.called("deploy:preview"));

  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);
  let deployed = orchestrator.deployed_system("web").await.unwrap().unwrap();
  assert_eq!(deployed.revision, 1);
  assert_eq!(orchestrator.timeline("web").await.unwrap().len(), 2);
}

#[tokio::test]
async fn live_deploy_commits_and_moves_marker() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let report = orchestrator
    .deploy_revision(&user(), "web", Some("2"), Mode::Live, &mut recorder)
    .await
    .unwrap();

  let committed = report.committed.unwrap();
  assert_eq!(committed.revision, 3);
  assert_eq!(committed.description, "deployed revision 2");
  assert!(committed.deployed);
  let head_before = orchestrator.get_revision("web", Some("2")).await.unwrap();
  assert_eq!(committed.previous, Some(head_before.id));
  assert_eq!(committed.system.definition("cd2").unwrap().docker_image_id(), Some("built-cd2"));

  let deployed = orchestrator.deployed_system("web").await.unwrap().unwrap();
  assert_eq!(deployed.revision, 3);

  let timeline = orchestrator.timeline("web").await.unwrap();
  let last = timeline.last().unwrap();
  assert_eq!(last.kind, TimelineKind::Deploy);
  assert_eq!(last.description, "deployed revision 2");
  assert_eq!(last.user, user());
}

#[tokio::test]
async fn full_run_reports_every_stage() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let report = orchestrator
    .deploy_revision(&user(), "web", None, Mode::Live, &mut recorder)
    .await
    .unwrap();

  assert_eq!(report.plan.progress.total, 8);
  assert_eq!(report.plan.progress.done, 8);
  assert!(
    report
      .plan
      .output
      .iter()
      .any(|l| l.level == Level::Info && l.message == "converged 2 containers")
  );
  assert_eq!(report.plan.operations[0].kind, "build");
}

#[tokio::test]
async fn default_target_is_the_deployed_revision() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let report = orchestrator.preview_revision(&user(), "web", None).await.unwrap();
  assert_eq!(report.revision, 1);
}

#[tokio::test]
async fn live_ids_are_reconciled_before_deploy() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let report = orchestrator.preview_revision(&user(), "web", Some("2")).await.unwrap();

  assert_eq!(
    report.reconcile.containers_relabeled,
    vec![Relabel {
      from: "xyz".to_string(),
      to: "c1".to_string(),
      docker_image_id: "img123".to_string(),
    }]
  );
  assert!(report.reconcile.collisions.is_empty());
  // Both containers already run, so nothing needs starting.
  assert!(report.plan.operations.iter().all(|op| op.kind != "start"));
}

#[tokio::test]
async fn failing_build_stops_the_pipeline() {
  let fake = Arc::new(FakeCollaborator::failing_at("build"));
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let err = orchestrator
    .deploy_revision(&user(), "web", Some("2"), Mode::Live, &mut recorder)
    .await
    .unwrap_err();

  assert!(matches!(err, DeployError::Collaborator(_)));
  assert_eq!(err.to_string(), "build exploded");
  assert!(fake.called("synch"));
  assert!(!fake.called("deploy"));
  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);
  assert_eq!(orchestrator.deployed_system("web").await.unwrap().unwrap().revision, 1);
}

#[tokio::test]
async fn failing_inspection_runs_no_later_stage() {
  let fake = Arc::new(FakeCollaborator::failing_at("analyze"));
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let result = orchestrator.preview_revision(&user(), "web", None).await;

  assert!(matches!(result, Err(DeployError::Collaborator(_))));
  assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn failing_deploy_commits_nothing() {
  let fake = Arc::new(FakeCollaborator::failing_at("deploy"));
  let (_temp, orchestrator) = file_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let result = orchestrator
    .deploy_revision(&user(), "web", Some("2"), Mode::Live, &mut recorder)
    .await;

  assert!(result.is_err());
  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);
  assert_eq!(recorder.plan().progress.done, 6);
}

#[tokio::test]
async fn unrecorded_deployment_reports_built_images() {
  let fake = Arc::new(FakeCollaborator::new());
  let store = Arc::new(BrokenCommits::default());
  let temp = tempfile::TempDir::new().unwrap();
  let orchestrator = orchestrator_with(temp.path(), fake.clone(), store.clone()).await;
  seeded(&orchestrator).await;
  store.break_commits();

  let mut recorder = PlanRecorder::new(Mode::Live);
  let err = orchestrator
    .deploy_revision(&user(), "web", Some("2"), Mode::Live, &mut recorder)
    .await
    .unwrap_err();

  assert!(err.to_string().contains("disk full"));
  assert!(fake.called("deploy"));
  let errors: Vec<&str> = recorder
    .plan()
    .output
    .iter()
    .filter(|line| line.level == Level::Error)
    .map(|line| line.message.as_str())
    .collect();
  assert_eq!(errors.len(), 1);
  assert!(errors[0].contains("revision 2 was deployed but could not be recorded"));
  assert!(errors[0].contains("built-cd2"));

  let deployed = orchestrator.deployed_system("web").await.unwrap().unwrap();
  assert_eq!(deployed.revision, 1);
  assert_eq!(orchestrator.list_revisions("web").await.unwrap().len(), 2);
}

#[tokio::test]
async fn unknown_targets_are_not_found() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let err = orchestrator.preview_revision(&user(), "nope", None).await.unwrap_err();
  assert!(matches!(err, DeployError::SystemNotFound(_)));
  assert!(err.is_not_found());

  let err = orchestrator.preview_revision(&user(), "web", Some("no-such-rev")).await.unwrap_err();
  assert!(matches!(err, DeployError::RevisionNotFound { .. }));
  assert!(err.is_not_found());

  assert!(fake.calls().is_empty());
}

#[tokio::test]
async fn check_builds_nothing() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let report = orchestrator.check_system(&user(), "web").await.unwrap();

  assert!(report.images.is_empty());
  assert!(report.committed.is_none());
  assert!(!fake.called("synch"));
  assert!(!fake.called("build"));
  assert!(fake.called("deploy:preview"));
  assert_eq!(report.plan.progress.done, 8);
}

#[tokio::test]
async fn analyze_reconciles_without_deploying() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake.clone()).await;
  seeded(&orchestrator).await;

  let report = orchestrator.analyze_system("web").await.unwrap();

  assert_eq!(report.revision, 1);
  assert!(report.analyzed.topology.get("c1").is_some());
  assert!(report.analyzed.definition("cd2").is_some());
  assert_eq!(report.reconcile.definitions_relabeled.len(), 1);
  assert_eq!(fake.calls(), vec![format!("analyze:{}", super::common::SYSTEM_ID)]);
}

#[tokio::test]
async fn concurrent_deploys_of_one_system_are_serialized() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = file_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let user = user();
  let mut first = PlanRecorder::new(Mode::Live);
  let mut second = PlanRecorder::new(Mode::Live);
  let (a, b) = tokio::join!(
    orchestrator.deploy_revision(&user, "web", Some("2"), Mode::Live, &mut first),
    orchestrator.deploy_revision(&user, "web", Some("2"), Mode::Live, &mut second),
  );

  let mut numbers = vec![
    a.unwrap().committed.unwrap().revision,
    b.unwrap().committed.unwrap().revision,
  ];
  numbers.sort();
  assert_eq!(numbers, vec![3, 4]);
  assert_eq!(orchestrator.deployed_system("web").await.unwrap().unwrap().revision, 4);
}

#[tokio::test]
async fn pipeline_runs_over_memory_store() {
  let fake = Arc::new(FakeCollaborator::new());
  let (_temp, orchestrator) = memory_orchestrator(fake).await;
  seeded(&orchestrator).await;

  let mut recorder = PlanRecorder::new(Mode::Live);
  let report = orchestrator
    .deploy_revision(&user(), "web", Some("2"), Mode::Live, &mut recorder)
    .await
    .unwrap();

  assert_eq!(report.committed.unwrap().revision, 3);
  assert_eq!(orchestrator.deployed_system("web").await.unwrap().unwrap().revision, 3);
}
