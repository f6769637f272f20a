mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{ContainerCommand, RevisionCommand, SystemCommand};
use crate::output::{OutputFormat, print_error};

/// topo - versioned system topologies and their deployment
#[derive(Parser)]
#[command(name = "topo")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Configuration file (default: {config_dir}/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Manage systems
  #[command(subcommand)]
  System(SystemCommand),

  /// Manage container definitions
  #[command(subcommand)]
  Container(ContainerCommand),

  /// Browse revisions
  #[command(subcommand)]
  Revision(RevisionCommand),

  /// Deploy a revision (default: the deployed revision, else the head)
  Deploy {
    /// System id, id prefix or name prefix
    system: String,

    /// Revision number or id prefix
    revision: Option<String>,

    /// Compute the plan without changing anything
    #[arg(long)]
    preview: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show what a deployment would do
  Preview {
    /// System id, id prefix or name prefix
    system: String,

    /// Revision number or id prefix
    revision: Option<String>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Compare the live environment with the deployed revision
  Check {
    /// System id, id prefix or name prefix
    system: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Inspect the live environment and reconcile its ids
  Analyze {
    /// System id, id prefix or name prefix
    system: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the audit trail of a system
  Timeline {
    /// System id, id prefix or name prefix
    system: String,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn init_tracing(verbose: bool) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
    if verbose {
      EnvFilter::new("debug")
    } else {
      EnvFilter::new("warn")
    }
  });

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<()> {
  let config = cli.config.as_deref();
  let verbose = cli.verbose;

  match cli.command {
    Commands::System(command) => cmd::cmd_system(config, command),
    Commands::Container(command) => cmd::cmd_container(config, verbose, command),
    Commands::Revision(command) => cmd::cmd_revision(config, command),
    Commands::Deploy {
      system,
      revision,
      preview,
      output,
    } => cmd::cmd_deploy(config, verbose, &system, revision.as_deref(), preview, output),
    Commands::Preview {
      system,
      revision,
      output,
    } => cmd::cmd_deploy(config, verbose, &system, revision.as_deref(), true, output),
    Commands::Check { system, output } => cmd::cmd_check(config, verbose, &system, output),
    Commands::Analyze { system, output } => cmd::cmd_analyze(config, &system, output),
    Commands::Timeline { system, output } => cmd::cmd_timeline(config, &system, output),
  }
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::FAILURE
    }
  }
}
