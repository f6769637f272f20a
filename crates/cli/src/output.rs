//! CLI output formatting utilities.
//!
//! Colored status lines on the terminal, relative timestamps, and rendering of
//! operation plans produced by pipeline runs.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};
use topo_lib::plan::{Level, OperationPlan};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const WARNING: &str = "⚠";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

/// Shorten a revision or system id for display.
pub fn truncate_id(id: &str) -> &str {
  let len = id.len().min(12);
  &id[..len]
}

pub fn format_timestamp(timestamp: u64) -> String {
  let datetime = UNIX_EPOCH + Duration::from_secs(timestamp);
  match SystemTime::now().duration_since(datetime) {
    Ok(duration) => {
      let secs = duration.as_secs();
      if secs < 60 {
        format!("{} seconds ago", secs)
      } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
      } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
      } else {
        format!("{} days ago", secs / 86400)
      }
    }
    Err(_) => format!("timestamp: {}", timestamp),
  }
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_warning(message: &str) {
  eprintln!(
    "{} {}",
    symbols::WARNING.if_supports_color(Stream::Stderr, |s| s.yellow()),
    message.if_supports_color(Stream::Stderr, |s| s.yellow())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}

/// Print the output lines and operations of a pipeline run.
///
/// Debug lines are only shown with `verbose`.
pub fn print_plan(plan: &OperationPlan, verbose: bool) {
  for line in &plan.output {
    match line.level {
      Level::Debug if verbose => print_stat("debug", &line.message),
      Level::Debug => {}
      Level::Info => print_info(&line.message),
      Level::Warn => print_warning(&line.message),
      Level::Error => print_error(&line.message),
    }
  }

  if plan.operations.is_empty() {
    return;
  }
  println!();
  println!("Operations ({}):", plan.mode);
  for op in &plan.operations {
    println!(
      "  {} {} {} {}",
      symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
      op.kind.if_supports_color(Stream::Stdout, |s| s.bold()),
      op.target,
      op.description.if_supports_color(Stream::Stdout, |s| s.dimmed())
    );
  }
}
