mod commands;
mod profile;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::auth::{self, AuthCommand, AuthContext};
use teamcity_cli_api::error::ApiError;
use teamcity_cli_api::{StatusPolicy, TeamcityClient};
use teamcity_cli_auth::CredentialStore;
use teamcity_cli_config::Config;
use teamcity_cli_output::{OutputFormat, OutputRenderer};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "teamcity-cli", version, about = "Command-line client for TeamCity build servers", long_about = None)]
struct Cli {
    /// Profile to use from config file
    #[arg(short, long)]
    profile: Option<String>,

    /// Path to config file (defaults to ~/.teamcity-cli/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format for command results
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(long)]
    debug: bool,

    /// Treat non-2xx responses from the server as errors
    #[arg(long)]
    strict_status: bool,

    #[command(subcommand)]
    command: TeamcityCommand,
}

#[derive(Subcommand, Debug, Clone)]
enum TeamcityCommand {
    /// Build commands
    Build(commands::builds::BuildArgs),
    /// Artifact commands
    Artifact(commands::artifacts::ArtifactArgs),
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = init_tracing(cli.debug) {
        eprintln!("{err}");
    }

    if let Err(err) = run(cli).await {
        eprintln!("{} {err:#}", "error:".red().bold());
        if let Some(hint) = err.downcast_ref::<ApiError>().and_then(ApiError::suggestion) {
            eprintln!("{} {hint}", "hint:".yellow());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let mut config = Config::load(config_path.as_ref())?;
    let renderer = OutputRenderer::new(cli.output);
    let store = CredentialStore::new("teamcity-cli")?;
    let status_policy = if cli.strict_status {
        StatusPolicy::Strict
    } else {
        StatusPolicy::Lenient
    };

    match cli.command {
        TeamcityCommand::Auth(command) => {
            auth::handle(
                command,
                AuthContext {
                    config: &mut config,
                    config_path: config_path.as_deref(),
                    store: &store,
                    renderer: &renderer,
                    requested_profile: cli.profile.as_deref(),
                },
            )
            .await
        }
        TeamcityCommand::Build(args) => {
            let client = connect(&config, cli.profile.as_deref(), &store, status_policy)?;
            commands::builds::execute(args, &client, &renderer).await
        }
        TeamcityCommand::Artifact(args) => {
            let client = connect(&config, cli.profile.as_deref(), &store, status_policy)?;
            commands::artifacts::execute(args, &client).await
        }
    }
}

fn connect(
    config: &Config,
    requested: Option<&str>,
    store: &CredentialStore,
    status_policy: StatusPolicy,
) -> Result<TeamcityClient> {
    let active =
        profile::resolve_active_profile(config, requested, store, |key| std::env::var(key).ok())?;
    tracing::debug!(profile = %active.name, base_url = %active.base_url, "Using profile");
    active.client(status_policy)
}

fn init_tracing(debug: bool) -> Result<()> {
    let default = if debug {
        "info,teamcity_cli=debug,teamcity_cli_api=debug,teamcity_cli_config=debug,teamcity_cli_auth=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logger: {err}"))
}
