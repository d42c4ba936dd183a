//! DASH Memories CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! dash-cli migrate
//!
//! # Run the 24 h cleanup sweep once (same work as the cron endpoint)
//! dash-cli cleanup
//!
//! # Delete expired sign-in sessions
//! dash-cli sessions prune
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `cleanup` - Clear stale temp videos and delete abandoned drafts
//! - `sessions prune` - Delete expired sessions

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "dash-cli")]
#[command(author, version, about = "DASH Memories CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Run the cleanup sweep once
    Cleanup,
    /// Manage sign-in sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Delete expired sessions
    Prune,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Cleanup => commands::cleanup::run().await?,
        Commands::Sessions { action } => match action {
            SessionAction::Prune => commands::cleanup::prune_sessions().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_sessions_prune() {
        let cli = Cli::try_parse_from(["dash-cli", "sessions", "prune"]);
        assert!(matches!(
            cli.map(|c| c.command),
            Ok(Commands::Sessions {
                action: SessionAction::Prune
            })
        ));
    }
}
