use std::path::Path;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use teamcity_cli_api::{normalize_token, BuildQuery, StatusPolicy};
use teamcity_cli_auth::{token_key, CredentialStore};
use teamcity_cli_config::{Config, Profile};
use teamcity_cli_output::OutputRenderer;
use url::Url;

use crate::profile::resolve_active_profile;

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommand {
    /// Add or update a profile and store its access token
    Login(LoginArgs),
    /// Remove the stored token (and optionally the profile)
    Logout(LogoutArgs),
    /// List configured profiles
    List,
    /// Check that the active profile can reach the server
    Test,
}

#[derive(Args, Debug, Clone)]
pub struct LoginArgs {
    /// Profile name to create or update.
    #[arg(long)]
    pub profile: String,
    /// TeamCity server URL (e.g. https://teamcity.example.com).
    #[arg(long)]
    pub base_url: String,
    /// Access token (falls back to TEAMCITY_TOKEN or an interactive prompt).
    #[arg(long, env = "TEAMCITY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
    /// Mark this profile as the default one.
    #[arg(long)]
    pub default: bool,
    /// Skip TLS certificate verification for this server.
    #[arg(long)]
    pub insecure: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LogoutArgs {
    /// Profile to remove the token for.
    #[arg(long)]
    pub profile: String,
    /// Remove the profile from config entirely.
    #[arg(long)]
    pub remove_profile: bool,
}

pub struct AuthContext<'a> {
    pub config: &'a mut Config,
    pub config_path: Option<&'a Path>,
    pub store: &'a CredentialStore,
    pub renderer: &'a OutputRenderer,
    pub requested_profile: Option<&'a str>,
}

pub async fn handle(command: AuthCommand, ctx: AuthContext<'_>) -> Result<()> {
    match command {
        AuthCommand::Login(args) => login(args, ctx.config, ctx.config_path, ctx.store),
        AuthCommand::Logout(args) => logout(args, ctx.config, ctx.config_path, ctx.store),
        AuthCommand::List => list_profiles(ctx.config, ctx.store, ctx.renderer),
        AuthCommand::Test => test_auth(ctx.config, ctx.requested_profile, ctx.store).await,
    }
}

fn login(
    args: LoginArgs,
    config: &mut Config,
    config_path: Option<&Path>,
    store: &CredentialStore,
) -> Result<()> {
    if args.profile.trim().is_empty() {
        return Err(anyhow!("Profile name cannot be empty"));
    }

    let base_url = Url::parse(&args.base_url)
        .with_context(|| format!("Invalid TeamCity server URL: {}", args.base_url))?;

    let token = match args.token {
        Some(token) if !token.trim().is_empty() => token.trim().to_owned(),
        _ => rpassword::prompt_password("Enter access token: ")
            .context("Failed to read token from prompt")?
            .trim()
            .to_owned(),
    };
    let token = normalize_token(&token).to_owned();
    if token.is_empty() {
        return Err(anyhow!("Access token cannot be empty"));
    }

    let mut profile = config.profile(&args.profile).cloned().unwrap_or_default();
    profile.base_url = Some(base_url.as_str().trim_end_matches('/').to_string());
    profile.insecure = args.insecure;
    profile.token = None;
    config.upsert_profile(args.profile.clone(), profile, args.default);

    store
        .set_secret(&token_key(&args.profile), &token)
        .context("Failed to store access token")?;

    config
        .save(config_path)
        .context("Unable to persist configuration file")?;

    tracing::info!(
        profile = %args.profile,
        base_url = %base_url,
        "Profile saved and token stored"
    );
    Ok(())
}

fn logout(
    args: LogoutArgs,
    config: &mut Config,
    config_path: Option<&Path>,
    store: &CredentialStore,
) -> Result<()> {
    if config.profile(&args.profile).is_none() {
        return Err(anyhow!("Profile '{}' does not exist", args.profile));
    }

    store
        .delete_secret(&token_key(&args.profile))
        .context("Failed to delete stored token")?;

    if args.remove_profile {
        config.remove_profile(&args.profile);
        if config.default_profile.is_none() {
            config.default_profile = config.profiles.keys().next().cloned();
        }
    }

    config
        .save(config_path)
        .context("Unable to persist configuration file")?;
    tracing::info!(profile = %args.profile, "Credentials removed");
    Ok(())
}

#[derive(Serialize)]
struct ProfileRow<'a> {
    name: &'a str,
    base_url: &'a str,
    insecure: bool,
    has_token: bool,
    is_default: bool,
}

fn profile_row<'a>(
    name: &'a str,
    profile: &'a Profile,
    config: &Config,
    store: &CredentialStore,
) -> Result<ProfileRow<'a>> {
    Ok(ProfileRow {
        name,
        base_url: profile.base_url.as_deref().unwrap_or(""),
        insecure: profile.insecure,
        has_token: profile.token.is_some() || store.get_secret(&token_key(name))?.is_some(),
        is_default: config.default_profile.as_deref() == Some(name),
    })
}

fn list_profiles(
    config: &Config,
    store: &CredentialStore,
    renderer: &OutputRenderer,
) -> Result<()> {
    let rows = config
        .profiles
        .iter()
        .map(|(name, profile)| profile_row(name, profile, config, store))
        .collect::<Result<Vec<_>>>()?;

    if rows.is_empty() {
        tracing::info!("No profiles configured yet. Use `teamcity-cli auth login` to add one.");
        return Ok(());
    }

    renderer.render(&rows)
}

async fn test_auth(
    config: &Config,
    requested: Option<&str>,
    store: &CredentialStore,
) -> Result<()> {
    let active = resolve_active_profile(config, requested, store, |key| std::env::var(key).ok())?;

    println!("Testing authentication for profile '{}'...", active.name);

    let client = active.client(StatusPolicy::Strict)?;
    let query = BuildQuery {
        count: 1,
        ..Default::default()
    };

    match client.get_all_builds(&query).await {
        Ok(_) => {
            println!("{} Authentication successful!", "✓".green());
            println!("   Profile: {}", active.name);
            println!("   Server: {}", active.base_url);
            Ok(())
        }
        Err(err) => {
            println!("{} Authentication failed: {}", "✗".red(), err);
            Err(err.into())
        }
    }
}
