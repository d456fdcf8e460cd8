use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use teamcity_cli_api::TeamcityClient;

#[derive(Parser, Debug, Clone)]
pub struct ArtifactArgs {
    #[command(subcommand)]
    command: ArtifactCommands,
}

#[derive(Subcommand, Debug, Clone)]
enum ArtifactCommands {
    /// Download an artifact file of a build
    Get {
        /// Build ID
        id: i64,
        /// Path of the file relative to the build's artifact root
        path: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

pub async fn execute(args: ArtifactArgs, client: &TeamcityClient) -> Result<()> {
    match args.command {
        ArtifactCommands::Get { id, path, out } => {
            let artifact = client
                .get_artifact(&path, id)
                .await
                .with_context(|| format!("Failed to fetch artifact '{path}' of build {id}"))?;

            let content_type = artifact.content_type.as_deref().unwrap_or("unknown");
            tracing::debug!(
                id,
                path = %path,
                content_type,
                size = artifact.content.len(),
                "Fetched artifact"
            );

            match out {
                Some(file) => {
                    std::fs::write(&file, &artifact.content)
                        .with_context(|| format!("Unable to write {}", file.display()))?;
                    eprintln!(
                        "{} Saved {} bytes ({content_type}) to {}",
                        "✓".green(),
                        artifact.content.len(),
                        file.display()
                    );
                }
                None => {
                    let stdout = std::io::stdout();
                    let mut handle = stdout.lock();
                    handle.write_all(&artifact.content)?;
                    handle.flush()?;
                }
            }
            Ok(())
        }
    }
}
