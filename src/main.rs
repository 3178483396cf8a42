#![deny(clippy::mod_module_files)]
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Work with checkouts of build service packages
#[derive(Debug, Parser)]
#[command(name = "obs-checkout", version)]
struct Cli {
    /// Increase log output (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Checkout directory to operate on
    #[arg(short = 'C', long = "directory", global = true, default_value = ".")]
    directory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check out a package into a new directory named after it
    Checkout {
        project: String,
        package: String,
        /// Revision number or source hash to check out
        #[arg(short, long)]
        revision: Option<String>,
        /// Check out the link itself instead of the expanded sources
        #[arg(long)]
        no_expand: bool,
    },
    /// Show the state of every file
    Status {
        /// Print machine readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Stage untracked files for addition
    Add {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Stage tracked files for deletion and remove them
    Rm {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Revert staged additions
    Untrack {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Restore deleted or missing files from HEAD
    Undelete {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Commit staged changes as a new revision
    Commit {
        #[arg(short, long)]
        message: Option<String>,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = std::io::stdout();
    let dir = &cli.directory;

    match cli.command {
        Command::Checkout {
            project,
            package,
            revision,
            no_expand,
        } => {
            let request = commands::checkout::Request {
                project,
                package,
                revision,
                expand_links: !no_expand,
            };
            commands::checkout::handle(dir, request, &mut stdout).await
        }
        Command::Status { json } => commands::status::handle(dir, json, &mut stdout).await,
        Command::Add { files } => commands::stage::add(dir, &files, &mut stdout).await,
        Command::Rm { files } => commands::stage::remove(dir, &files, &mut stdout).await,
        Command::Untrack { files } => commands::stage::untrack(dir, &files, &mut stdout).await,
        Command::Undelete { files } => commands::stage::undelete(dir, &files, &mut stdout).await,
        Command::Commit { message } => commands::commit::handle(dir, message, &mut stdout).await,
    }
}
