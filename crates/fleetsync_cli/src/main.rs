//! fleetsync CLI - keeps a Cloudflare Gateway list in step with Kandji.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::config::{CliOverrides, Config, LogFormat};

#[derive(Parser)]
#[command(name = "fleetsync")]
#[command(version)]
#[command(about = "Sync Kandji device serials into a Cloudflare Gateway list")]
#[command(
    long_about = "fleetsync reads the device inventory from Kandji, filters it by ownership, \
platform, tags and blueprints, and reconciles the resulting serial numbers into a \
Cloudflare Zero Trust Gateway list. Other Gateway lists can be merged in as extra \
read-only sources."
)]
#[command(after_long_help = r#"EXAMPLES
    Run continuously with the configured interval:
        $ fleetsync run

    Run a single pass and print the summary as JSON:
        $ fleetsync once --json

    Remove serials that are no longer in Kandji:
        $ fleetsync once --on-missing delete

    Check credentials and list access:
        $ fleetsync check --config /etc/fleetsync/config.yaml

    Generate shell completions:
        $ fleetsync completions bash > ~/.local/share/bash-completion/completions/fleetsync

CONFIGURATION
    fleetsync reads configuration from, in increasing priority:
      1. ~/.config/fleetsync/config.toml (or $XDG_CONFIG_HOME/fleetsync/config.toml)
      2. ./config.yaml
      3. ./fleetsync.toml
      4. The file given with --config (TOML or YAML)
      5. Environment variables (FLEETSYNC_* prefix, e.g., FLEETSYNC_KANDJI__API_TOKEN)
      6. Legacy environment variables (below)
      7. Command-line flags
    A .env file in the current directory is loaded first.

ENVIRONMENT VARIABLES
    KANDJI_API_URL                 Kandji tenant API URL
    KANDJI_API_TOKEN               Kandji API token
    CLOUDFLARE_API_TOKEN           Cloudflare API token
    CLOUDFLARE_ACCOUNT_ID          Cloudflare account ID
    CLOUDFLARE_LIST_ID             Target Gateway list ID
    CLOUDFLARE_SOURCE_LIST_IDS     Comma-separated source list IDs
    ON_MISSING                     ignore, delete or alert (default: ignore)
    SYNC_DEVICES_WITHOUT_OWNERS    Sync unassigned devices (true/false)
    SYNC_MOBILE_DEVICES            Sync iPhone and iPad devices (true/false)
    LOG_LEVEL                      trace, debug, info, warn, error (default: info)
    RUST_LOG                       Overrides LOG_LEVEL with a full filter directive
"#)]
struct Cli {
    /// Configuration file (TOML or YAML)
    #[arg(short, long, global = true, env = "FLEETSYNC_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: CliOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pass now and then on every interval until SIGINT/SIGTERM
    Run,
    /// Run a single pass and print the summary
    Once {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and access to Kandji and the Gateway lists
    Check,
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
fn init_tracing(level: &str, format: LogFormat) {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(format!("fleetsync={level},fleetsync_cli={level}")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Handle commands that don't need configuration first
    match &cli.command {
        Commands::Completions { shell } => {
            commands::meta::handle_completions(*shell)?;
            return Ok(());
        }
        Commands::Man { output } => {
            commands::meta::handle_man(output.clone())?;
            return Ok(());
        }
        _ => {}
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(&cli.overrides);
    let validated = config.validate()?;

    init_tracing(&config.log_level(), config.log.format);

    let cancel = CancellationToken::new();
    shutdown::setup_shutdown_handler(cancel.clone());

    match cli.command {
        Commands::Run => commands::run::handle_run(validated, cancel).await?,
        Commands::Once { json } => commands::run::handle_once(validated, cancel, json).await?,
        Commands::Check => commands::check::handle_check(validated, cancel).await?,
        Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}
