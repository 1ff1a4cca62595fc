mod cmd;
mod output;
mod prompts;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::OutputFormat;

/// aigogo - content-addressed package store and import linker
#[derive(Parser)]
#[command(name = "aigogo")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Inspect and modify the local package store
  #[command(subcommand)]
  Store(cmd::StoreCommand),

  /// Link stored packages into a project and register its imports with Python
  Link {
    /// Project root
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Package to link, as NAME=HASH:LANGUAGE (repeatable)
    #[arg(short, long = "package", value_name = "NAME=HASH:LANGUAGE")]
    packages: Vec<String>,
  },

  /// Remove a project's Python registration and its imports directory
  Unlink {
    /// Project root
    #[arg(default_value = ".")]
    project: PathBuf,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let filter = if cli.verbose {
    EnvFilter::new("debug")
  } else {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
  };

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Store(command) => cmd::cmd_store(command, cli.output),
    Commands::Link { project, packages } => cmd::cmd_link(&project, &packages, cli.output),
    Commands::Unlink { project } => cmd::cmd_unlink(&project, cli.output),
  }
}
