//! Collaborators backed by operator-configured shell commands.
//!
//! Each stage runs its hook through a shell with a JSON payload on stdin and
//! reads a JSON answer from stdout. `TOPO_STAGE` names the stage; `TOPO_MODE`
//! is `live` or `preview` for every stage except `analyze`.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::plan::{Level, Mode, Operation, PlanRecorder};
use crate::system::{ContainerDefinition, System};

use super::collab::{
  Analyzer, BuildOutput, Builder, CollaboratorError, DeployOutcome, DeployRequest, Deployer, Synchronizer,
};

/// Shell commands run for each collaborator stage. Unset stages fall back to built-in behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookCommands {
  pub analyze: Option<String>,
  pub synch: Option<String>,
  pub build: Option<String>,
  pub deploy: Option<String>,
}

#[derive(Debug, Error)]
pub enum HookError {
  #[error("{stage} hook could not be started: {source}")]
  Spawn {
    stage: &'static str,
    #[source]
    source: std::io::Error,
  },

  #[error("{stage} hook failed with exit code {code:?}: {stderr}")]
  Failed {
    stage: &'static str,
    code: Option<i32>,
    stderr: String,
  },

  #[error("{stage} hook produced invalid output: {source}")]
  InvalidOutput {
    stage: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to encode {stage} hook payload: {source}")]
  Payload {
    stage: &'static str,
    #[source]
    source: serde_json::Error,
  },

  #[error("no build hook configured and definition '{definition}' has no docker image id")]
  MissingHook { definition: String },
}

impl From<HookError> for CollaboratorError {
  fn from(err: HookError) -> Self {
    CollaboratorError::new(err)
  }
}

/// What a deploy hook prints on stdout.
#[derive(Debug, Default, Deserialize)]
struct DeployHookOutput {
  #[serde(default)]
  message: Option<String>,
  #[serde(default)]
  operations: Vec<Operation>,
}

/// Runs one shell command per collaborator stage.
#[derive(Debug, Clone, Default)]
pub struct HookCollaborators {
  hooks: HookCommands,
  shell: Option<String>,
}

impl HookCollaborators {
  pub fn new(hooks: HookCommands, shell: Option<String>) -> Self {
    Self { hooks, shell }
  }

  /// Run `cmd` with `payload` on stdin and return its trimmed stdout.
  async fn run(
    &self,
    stage: &'static str,
    cmd: &str,
    mode: Option<Mode>,
    payload: &Value,
  ) -> Result<String, HookError> {
    info!(stage = stage, cmd = %cmd, "running hook");

    let input = serde_json::to_vec(payload).map_err(|source| HookError::Payload { stage, source })?;
    let (shell_cmd, shell_args) = get_shell(self.shell.as_deref());

    let mut command = Command::new(&shell_cmd);
    command
      .args(&shell_args)
      .arg(cmd)
      .env("TOPO_STAGE", stage)
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped());
    if let Some(mode) = mode {
      command.env("TOPO_MODE", mode.to_string());
    }

    debug!(shell = %shell_cmd, "spawning hook process");
    let mut child = command.spawn().map_err(|source| HookError::Spawn { stage, source })?;

    let stdin = child.stdin.take();
    let write = async move {
      if let Some(mut stdin) = stdin {
        // A hook that ignores its input may close stdin early.
        let _ = stdin.write_all(&input).await;
      }
    };
    let ((), output) = tokio::join!(write, child.wait_with_output());
    let output = output.map_err(|source| HookError::Spawn { stage, source })?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !stderr.is_empty() {
      debug!(stage = stage, stderr = %stderr, "hook stderr");
    }

    if !output.status.success() {
      return Err(HookError::Failed {
        stage,
        code: output.status.code(),
        stderr,
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !stdout.is_empty() {
      debug!(stage = stage, stdout = %stdout, "hook output");
    }
    Ok(stdout)
  }
}

fn parse<T: serde::de::DeserializeOwned>(stage: &'static str, stdout: &str) -> Result<T, HookError> {
  serde_json::from_str(stdout).map_err(|source| HookError::InvalidOutput { stage, source })
}

#[async_trait]
impl Analyzer for HookCollaborators {
  async fn analyze(&self, config: &Value, canonical: &System) -> Result<System, CollaboratorError> {
    let Some(cmd) = &self.hooks.analyze else {
      debug!(system = %canonical.id, "no analyze hook, assuming environment matches canonical");
      return Ok(canonical.clone());
    };

    let stdout = self
      .run("analyze", cmd, None, &json!({"config": config, "system": canonical}))
      .await?;
    Ok(parse("analyze", &stdout)?)
  }
}

#[async_trait]
impl Synchronizer for HookCollaborators {
  async fn synch(
    &self,
    system: &System,
    definition: &mut ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<(), CollaboratorError> {
    let Some(cmd) = &self.hooks.synch else {
      return Ok(());
    };

    let payload = json!({"system": system, "definition": &*definition});
    let stdout = self.run("synch", cmd, Some(recorder.mode()), &payload).await?;
    if !stdout.is_empty() {
      *definition = parse("synch", &stdout)?;
    }
    recorder.stdout(format!("synchronized {}", definition.id), Level::Info);
    Ok(())
  }
}

#[async_trait]
impl Builder for HookCollaborators {
  async fn build(
    &self,
    mode: Mode,
    system: &System,
    definition: &ContainerDefinition,
    recorder: &mut PlanRecorder,
  ) -> Result<BuildOutput, CollaboratorError> {
    let Some(cmd) = &self.hooks.build else {
      return match definition.docker_image_id() {
        Some(image) => {
          recorder.stdout(format!("reusing image {} for {}", image, definition.id), Level::Info);
          Ok(BuildOutput::new(image))
        }
        None => Err(
          HookError::MissingHook {
            definition: definition.id.clone(),
          }
          .into(),
        ),
      };
    };

    let payload = json!({"mode": mode, "system": system, "definition": definition});
    let stdout = self.run("build", cmd, Some(mode), &payload).await?;
    let output: BuildOutput = parse("build", &stdout)?;

    recorder.record(
      "build",
      &definition.id,
      format!("build image {} for {}", output.docker_image_id, definition.id),
    );
    Ok(output)
  }
}

#[async_trait]
impl Deployer for HookCollaborators {
  async fn deploy(
    &self,
    request: DeployRequest<'_>,
    recorder: &mut PlanRecorder,
  ) -> Result<DeployOutcome, CollaboratorError> {
    let Some(cmd) = &self.hooks.deploy else {
      recorder.stdout("no deploy hook configured, nothing to do", Level::Warn);
      return Ok(DeployOutcome::default());
    };

    let payload = json!({
      "user": request.user,
      "systemId": request.system_id,
      "revisionId": request.revision_id,
      "analyzed": request.analyzed,
      "target": request.target,
      "mode": request.mode,
    });
    let stdout = self.run("deploy", cmd, Some(request.mode), &payload).await?;

    let output: DeployHookOutput = if stdout.is_empty() {
      DeployHookOutput::default()
    } else {
      parse("deploy", &stdout)?
    };

    for op in output.operations {
      recorder.record(op.kind, op.target, op.description);
    }
    Ok(DeployOutcome {
      message: output.message,
    })
  }
}

/// Get the shell command and arguments for the current platform.
///
/// `override_shell` comes from the config; otherwise `/bin/sh -c` on Unix and
/// PowerShell on Windows.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  if let Some(shell) = override_shell {
    let args = if shell.contains("powershell") || shell.contains("pwsh") {
      vec!["-NoProfile".to_string(), "-Command".to_string()]
    } else if shell.contains("cmd") {
      vec!["/C".to_string()]
    } else {
      vec!["-c".to_string()]
    };
    return (shell.to_string(), args);
  }

  #[cfg(unix)]
  {
    ("/bin/sh".to_string(), vec!["-c".to_string()])
  }

  #[cfg(windows)]
  {
    (
      "powershell.exe".to_string(),
      vec![
        "-NoProfile".to_string(),
        "-ExecutionPolicy".to_string(),
        "Bypass".to_string(),
        "-Command".to_string(),
      ],
    )
  }
}
