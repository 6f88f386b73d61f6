//! TaskForge CLI - Main entry point

mod cli;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use taskforge_foundation::ServiceConfig;
use taskforge_task::{absolutize, TaskServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// TaskForge - run workspace tasks and report the diagnostics they print
#[derive(Parser, Debug)]
#[command(name = "taskforge")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Workspace root (defaults to the current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the task labels defined for the workspace
    List,

    /// Run a defined task by label
    Run {
        label: String,
    },

    /// Run a command that is not in the task definitions
    Exec {
        /// Run inside a pseudo-terminal
        #[arg(long)]
        pty: bool,

        /// Diagnostic matcher applied to the output
        #[arg(short, long)]
        matcher: Option<String>,

        /// Working directory, relative to the workspace root
        #[arg(long)]
        cwd: Option<PathBuf>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Append a task definition to the workspace tasks file
    Add {
        #[arg(short, long)]
        label: String,

        #[arg(long)]
        pty: bool,

        #[arg(short, long)]
        matcher: Option<String>,

        #[arg(long)]
        cwd: Option<PathBuf>,

        /// Mark the task as a build task
        #[arg(long)]
        build: bool,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Show the registered diagnostic matchers
    Matchers,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so task diagnostics on stdout stay parseable
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let root = match args.workspace {
        Some(path) => absolutize(&path)?,
        None => std::env::current_dir()?,
    };
    let config = ServiceConfig::load(&root)?;
    tracing::debug!(root = %root.display(), "Starting task server");

    let server = TaskServer::builder(root).with_config(config).build().await?;
    let output = cli::Output::new(args.json);

    let status = match args.command {
        Command::List => cli::list(&server, &output).map(|_| 0),
        Command::Matchers => cli::matchers(&server, &output).map(|_| 0),
        Command::Run { label } => cli::run(&server, &output, label.into()).await,
        Command::Exec {
            pty,
            matcher,
            cwd,
            command,
        } => {
            let spec = cli::inline_spec("exec", command, pty, matcher, cwd, false)?;
            cli::run(&server, &output, spec.into()).await
        }
        Command::Add {
            label,
            pty,
            matcher,
            cwd,
            build,
            command,
        } => {
            let spec = cli::inline_spec(&label, command, pty, matcher, cwd, build)?;
            server.add_definition(spec).await?;
            println!("Added task '{}'", label);
            Ok(0)
        }
    };

    server.shutdown().await;

    let status = status?;
    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}
