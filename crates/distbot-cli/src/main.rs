//! distbot administration CLI.

use clap::{Parser, Subcommand};
use distbot_config::ServiceConfig;
use distbot_db::{Store, create_pool};
use distbot_worker::Allowlist;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::prompt::TerminalPrompt;

#[derive(Parser)]
#[command(name = "distbot")]
#[command(about = "distbot administration", long_about = None)]
struct Cli {
    /// Database URL; defaults to the one in the service configuration
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the namespace allowlist
    Allowlist {
        /// Do not ask for confirmation
        #[arg(short, long, global = true)]
        yes: bool,

        #[command(subcommand)]
        command: AllowlistCommands,
    },
    /// Validate a package configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = distbot_config::PACKAGE_CONFIG_FILE)]
        path: String,
    },
}

#[derive(Subcommand)]
enum AllowlistCommands {
    /// Approve a namespace, e.g. github.com/packit or github.com/packit/ogr.git
    Approve {
        /// Full path; prompted for when omitted
        path: Option<String>,
    },
    /// Deny a namespace
    Deny { path: String },
    /// Remove a namespace entry
    Remove { path: String },
    /// Show namespaces waiting for approval and approve one of them
    Waiting,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Allowlist { yes, command } => {
            let database_url = match cli.database_url {
                Some(url) => url,
                None => ServiceConfig::load()?
                    .database_url
                    .ok_or_else(|| anyhow::anyhow!("No database URL configured"))?,
            };
            let pool = create_pool(&database_url).await?;
            let allowlist = Allowlist::new(Store::postgres(pool).allowlist);
            let prompt = TerminalPrompt::new(yes);

            match command {
                AllowlistCommands::Approve { path } => {
                    commands::allowlist::approve(&allowlist, &prompt, path).await?;
                }
                AllowlistCommands::Deny { path } => {
                    commands::allowlist::deny(&allowlist, &prompt, &path).await?;
                }
                AllowlistCommands::Remove { path } => {
                    commands::allowlist::remove(&allowlist, &prompt, &path).await?;
                }
                AllowlistCommands::Waiting => {
                    commands::allowlist::waiting(&allowlist, &prompt).await?;
                }
            }
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
