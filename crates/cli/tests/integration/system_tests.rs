//! System, container and revision command integration tests.

use predicates::prelude::*;

use super::common::{TestEnv, web_system};

#[test]
fn create_then_list() {
  let env = TestEnv::new();

  env
    .topo_cmd()
    .args(["system", "create", "billing", "--namespace", "acme"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Created system billing"));

  env
    .topo_cmd()
    .args(["system", "list"])
    .assert()
    .success()
    .stdout(predicate::str::contains("billing"))
    .stdout(predicate::str::contains("1 system(s) total"));

  let head = env.json(&["system", "show", "bill"]);
  assert_eq!(head["revision"], 1);
  assert_eq!(head["system"]["namespace"], "acme");
  assert_eq!(head["deployed"], false);
}

#[test]
fn put_imports_as_deployed() {
  let env = TestEnv::new();
  env.import_web();

  let deployed = env.json(&["system", "show", "web", "--deployed"]);
  assert_eq!(deployed["revision"], 1);
  assert_eq!(deployed["description"], "imported system");
  assert_eq!(deployed["system"]["topology"]["containers"]["c1"]["containedBy"], "vm1");
}

#[test]
fn put_again_commits_a_new_head() {
  let env = TestEnv::new();
  env.import_web();

  let mut edited = web_system();
  edited["containerDefinitions"][1]["specific"]["dockerImageId"] = "img456".into();
  let file = env.write_json("edited.json", &edited);

  env
    .topo_cmd()
    .args(["system", "put"])
    .arg(&file)
    .args(["-m", "bump frontend"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Committed revision 2 of web"));

  let revisions = env.json(&["revision", "list", "web"]);
  assert_eq!(revisions[0]["revision"], 2);
  assert_eq!(revisions[0]["description"], "bump frontend");
  assert_eq!(revisions[0]["deployed"], false);
  assert_eq!(revisions[1]["deployed"], true);
}

#[test]
fn put_rejects_inconsistent_documents() {
  let env = TestEnv::new();
  let mut broken = web_system();
  broken["topology"]["containers"]["c1"]["containerDefinitionId"] = "missing".into();
  let file = env.write_json("broken.json", &broken);

  env
    .topo_cmd()
    .args(["system", "put"])
    .arg(&file)
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing"));

  assert_eq!(env.json(&["system", "list"]), serde_json::json!([]));
}

#[test]
fn container_list_shows_definitions() {
  let env = TestEnv::new();
  env.import_web();

  env
    .topo_cmd()
    .args(["container", "list", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("cd2  docker  frontend  img123"));
}

#[test]
fn revision_show_by_number() {
  let env = TestEnv::new();
  env.import_web();

  env
    .topo_cmd()
    .args(["revision", "show", "web", "1"])
    .assert()
    .success()
    .stdout(predicate::str::contains("web revision 1 (deployed)"));

  env
    .topo_cmd()
    .args(["revision", "show", "web", "zz"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("not found"));
}

#[test]
fn revision_mark_with_force() {
  let env = TestEnv::new();
  env.import_web();

  let file = env.write_json("again.json", &web_system());
  env.topo_cmd().args(["system", "put"]).arg(&file).assert().success();

  env
    .topo_cmd()
    .args(["revision", "mark", "web", "2", "--force"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Revision 2 of web is now marked as deployed"));

  assert_eq!(env.json(&["system", "show", "web", "--deployed"])["revision"], 2);

  let timeline = env.json(&["timeline", "web"]);
  let kinds: Vec<&str> = timeline
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["kind"].as_str().unwrap())
    .collect();
  assert_eq!(kinds, vec!["create", "commit", "mark"]);
  assert_eq!(timeline[2]["user"]["name"], "tester");
}
