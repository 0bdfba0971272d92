//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agent;
pub mod common;
pub mod sessions;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use taskclaw::agent::ThinkLevel;

#[derive(Parser)]
#[command(name = "taskclaw")]
#[command(version)]
#[command(about = "Session-aware LLM task agent", long_about = None)]
struct Cli {
    /// Path to a config file (defaults to ~/.taskclaw/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent on one message, or interactively without -m
    Agent {
        /// Message to process (non-interactive mode)
        #[arg(short, long)]
        message: Option<String>,
        /// Session key the run appends to
        #[arg(short, long, default_value = "cli:default")]
        session: String,
        /// Model override
        #[arg(long)]
        model: Option<String>,
        /// Maximum provider calls for this run
        #[arg(long)]
        max_iterations: Option<u32>,
        /// Think level: off, on or stream
        #[arg(long)]
        think: Option<ThinkLevel>,
    },
    /// Inspect and manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionsAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum SessionsAction {
    /// List sessions with message counts and context usage
    List,
    /// Print a session's messages
    Show {
        /// Session key
        key: String,
    },
    /// Remove all messages from a session, keeping the session
    Clear {
        /// Session key
        key: String,
    },
    /// Delete a session and its stored log
    Delete {
        /// Session key
        key: String,
    },
}

/// Entry point for the CLI.
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            cmd_version();
        }
        Some(Commands::Agent {
            message,
            session,
            model,
            max_iterations,
            think,
        }) => {
            let overrides = taskclaw::ConfigOverrides {
                model,
                max_iterations,
                think_level: think,
                ..Default::default()
            };
            let config = common::load_config(cli.config.as_deref(), &overrides)?;
            agent::cmd_agent(config, message, session).await?;
        }
        Some(Commands::Sessions { action }) => {
            let config = common::load_config(cli.config.as_deref(), &Default::default())?;
            sessions::cmd_sessions(config, action).await?;
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("taskclaw {}", env!("CARGO_PKG_VERSION"));
}
