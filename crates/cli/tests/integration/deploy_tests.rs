//! Deployment command integration tests.

use predicates::prelude::*;
use serde_json::json;

use super::common::TestEnv;

#[test]
fn preview_commits_nothing() {
  let env = TestEnv::new();
  env.import_web();

  env
    .topo_cmd()
    .args(["preview", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Preview of revision 1, nothing was changed"));

  assert_eq!(env.json(&["revision", "list", "web"]).as_array().unwrap().len(), 1);
}

#[test]
fn deploy_without_hooks_reuses_images() {
  let env = TestEnv::new();
  env.import_web();

  env
    .topo_cmd()
    .args(["deploy", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Deployed revision 1 (recorded as revision 2)"))
    .stdout(predicate::str::contains("img123"));

  let deployed = env.json(&["system", "show", "web", "--deployed"]);
  assert_eq!(deployed["revision"], 2);
  assert_eq!(deployed["description"], "deployed revision 1");
}

#[test]
fn deploy_json_report() {
  let env = TestEnv::new();
  env.import_web();

  let report = env.json(&["deploy", "web", "1", "--preview"]);
  assert_eq!(report["revision"], 1);
  assert_eq!(report["committed"], serde_json::Value::Null);
  assert_eq!(report["plan"]["mode"], "preview");
  assert_eq!(report["plan"]["progress"]["done"], 8);
  assert_eq!(report["images"][0]["dockerImageId"], "img123");
}

#[test]
fn check_and_analyze_without_hooks() {
  let env = TestEnv::new();
  env.import_web();

  env
    .topo_cmd()
    .args(["check", "web"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Revision 1 matches the live environment"));

  let report = env.json(&["analyze", "web"]);
  assert_eq!(report["revision"], 1);
  assert_eq!(report["analyzed"]["name"], "web");
}

#[cfg(unix)]
mod hooks {
  use super::*;

  /// Write a config whose hooks are the given shell snippets; each drains stdin first.
  fn hook_config(env: &TestEnv, hooks: serde_json::Value) -> std::path::PathBuf {
    let mut wrapped = serde_json::Map::new();
    for (stage, command) in hooks.as_object().unwrap() {
      wrapped.insert(
        stage.clone(),
        json!(format!("cat > /dev/null; {}", command.as_str().unwrap())),
      );
    }
    env.write_json("topo.json", &json!({"hooks": wrapped}))
  }

  #[test]
  fn deploy_runs_hooks_and_records_images() {
    let env = TestEnv::new();
    env.import_web();
    let config = hook_config(
      &env,
      json!({
        "build": r#"printf '{"dockerImageId": "sha-%s"}' "$TOPO_MODE""#,
        "deploy": r#"printf '{"message": "rolled out", "operations": [{"kind": "restart", "target": "c1", "description": "new image"}]}'"#,
      }),
    );

    env
      .topo_cmd()
      .arg("--config")
      .arg(&config)
      .args(["deploy", "web"])
      .assert()
      .success()
      .stdout(predicate::str::contains("rolled out"))
      .stdout(predicate::str::contains("restart"))
      .stdout(predicate::str::contains("sha-live"));

    let head = env.json(&["revision", "show", "web"]);
    assert_eq!(head["system"]["containerDefinitions"][1]["specific"]["dockerImageId"], "sha-live");
  }

  #[test]
  fn failing_hook_fails_the_deployment() {
    let env = TestEnv::new();
    env.import_web();
    let config = hook_config(&env, json!({"build": "echo 'registry down' >&2; exit 3"}));

    env
      .topo_cmd()
      .arg("--config")
      .arg(&config)
      .args(["deploy", "web"])
      .assert()
      .failure()
      .stderr(predicate::str::contains("build hook failed"))
      .stderr(predicate::str::contains("registry down"));

    assert_eq!(env.json(&["revision", "list", "web"]).as_array().unwrap().len(), 1);
  }

  #[test]
  fn container_build_commits_hook_image() {
    let env = TestEnv::new();
    env.import_web();
    let config = hook_config(&env, json!({"build": r#"printf '{"dockerImageId": "sha-built"}'"#}));

    env
      .topo_cmd()
      .arg("--config")
      .arg(&config)
      .args(["container", "build", "web", "front"])
      .assert()
      .success()
      .stdout(predicate::str::contains("Built cd2 as sha-built (revision 2)"));

    let timeline = env.json(&["timeline", "web"]);
    assert_eq!(timeline[1]["kind"], "build");
    assert_eq!(timeline[1]["description"], "built container: sha-built");
  }
}
