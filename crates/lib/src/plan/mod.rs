//! Operation plans and the recorder that builds them.
//!
//! A single [`PlanRecorder`] is threaded through every stage of a pipeline
//! run. Stages report progress, human-readable output lines and the concrete
//! operations they performed (live) or would perform (preview). Both modes
//! produce the same shape of [`OperationPlan`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Whether a pipeline run changes anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
  Live,
  Preview,
}

impl Mode {
  pub fn is_live(self) -> bool {
    self == Mode::Live
  }
}

impl fmt::Display for Mode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Mode::Live => f.write_str("live"),
      Mode::Preview => f.write_str("preview"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
  Debug,
  Info,
  Warn,
  Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputLine {
  pub level: Level,
  pub message: String,
}

/// A concrete action taken (or planned) against the live environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
  pub kind: String,
  pub target: String,
  pub description: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  pub total: u32,
  pub done: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationPlan {
  pub mode: Mode,
  pub progress: Progress,
  pub operations: Vec<Operation>,
  pub output: Vec<OutputLine>,
}

impl OperationPlan {
  pub fn new(mode: Mode) -> Self {
    Self {
      mode,
      progress: Progress::default(),
      operations: Vec::new(),
      output: Vec::new(),
    }
  }
}

#[derive(Debug, Clone)]
pub struct PlanRecorder {
  plan: OperationPlan,
}

impl PlanRecorder {
  pub fn new(mode: Mode) -> Self {
    Self {
      plan: OperationPlan::new(mode),
    }
  }

  pub fn mode(&self) -> Mode {
    self.plan.mode
  }

  /// Reset progress to `0 / total`.
  pub fn init_progress(&mut self, total: u32) {
    self.plan.progress = Progress { total, done: 0 };
  }

  /// Mark one more step as done.
  pub fn progress(&mut self) {
    let progress = &mut self.plan.progress;
    progress.done = progress.done.saturating_add(1);
    debug!(done = progress.done, total = progress.total, "progress");
  }

  /// Append an output line; it is also emitted as a tracing event.
  pub fn stdout(&mut self, message: impl Into<String>, level: Level) {
    let message = message.into();
    match level {
      Level::Debug => debug!(mode = %self.plan.mode, "{}", message),
      Level::Info => info!(mode = %self.plan.mode, "{}", message),
      Level::Warn => warn!(mode = %self.plan.mode, "{}", message),
      Level::Error => error!(mode = %self.plan.mode, "{}", message),
    }
    self.plan.output.push(OutputLine { level, message });
  }

  pub fn record(&mut self, kind: impl Into<String>, target: impl Into<String>, description: impl Into<String>) {
    self.plan.operations.push(Operation {
      kind: kind.into(),
      target: target.into(),
      description: description.into(),
    });
  }

  pub fn plan(&self) -> &OperationPlan {
    &self.plan
  }

  pub fn operations(&self) -> &[Operation] {
    &self.plan.operations
  }

  pub fn into_plan(self) -> OperationPlan {
    self.plan
  }
}
