use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use teamcity_cli_api::{BuildDetails, BuildQuery, BuildTrigger, TeamcityClient};
use teamcity_cli_output::{OutputFormat, OutputRenderer};

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[command(subcommand)]
    command: BuildCommands,
}

#[derive(Subcommand, Debug, Clone)]
enum BuildCommands {
    /// Show details of a build
    Get {
        /// Build ID
        id: i64,
    },
    /// Add a build to the queue
    Start(StartArgs),
    /// Remove a queued build from the queue
    Cancel(StopArgs),
    /// Stop a running build
    Stop(StopArgs),
    /// List builds matching the given filters
    #[command(alias = "ls")]
    List(ListArgs),
}

#[derive(Args, Debug, Clone)]
struct StartArgs {
    /// ID of the build configuration to run
    #[arg(long = "build-type")]
    build_type: String,
    /// Branch to build
    #[arg(long, default_value = "")]
    branch: String,
    /// Comment attached to the queued build
    #[arg(long, default_value = "")]
    comment: String,
    /// Build parameter as NAME=VALUE (repeatable)
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
    /// Snapshot dependency as BUILD_TYPE=BUILD_ID (repeatable)
    #[arg(long = "snapshot-dep", value_parser = parse_dependency)]
    snapshot_deps: Vec<(String, i64)>,
    /// Artifact dependency as BUILD_TYPE=BUILD_ID (repeatable)
    #[arg(long = "artifact-dep", value_parser = parse_dependency)]
    artifact_deps: Vec<(String, i64)>,
}

#[derive(Args, Debug, Clone)]
struct StopArgs {
    /// Build ID
    id: i64,
    /// Reason recorded on the server
    #[arg(long, default_value = "")]
    comment: String,
}

#[derive(Args, Debug, Clone)]
struct ListArgs {
    /// Only builds of this build configuration
    #[arg(long = "build-type")]
    build_type: Option<String>,
    /// Only builds of this branch
    #[arg(long)]
    branch: Option<String>,
    /// Only builds triggered by this user
    #[arg(long)]
    user: Option<String>,
    /// Maximum number of builds to return
    #[arg(long, default_value_t = 0, hide_default_value = true)]
    count: u32,
    /// Skip this many builds
    #[arg(long, default_value_t = 0, hide_default_value = true)]
    start: u32,
    /// Maximum number of builds the server scans
    #[arg(long = "lookup-limit", default_value_t = 0, hide_default_value = true)]
    lookup_limit: u32,
    /// Only running builds
    #[arg(long)]
    running: bool,
    /// Only cancelled builds
    #[arg(long)]
    cancelled: bool,
}

#[derive(Serialize)]
struct BuildRow {
    id: i64,
    number: String,
    build_type: String,
    status: String,
    state: String,
    branch: String,
    url: String,
}

impl From<BuildDetails> for BuildRow {
    fn from(build: BuildDetails) -> Self {
        Self {
            id: build.id,
            number: build.number.unwrap_or_default(),
            build_type: build.build_type_id.unwrap_or_default(),
            status: build.status.unwrap_or_default(),
            state: build.state.unwrap_or_default(),
            branch: build.branch_name.unwrap_or_default(),
            url: build.web_url.unwrap_or_default(),
        }
    }
}

#[derive(Serialize)]
struct QueuedBuild {
    id: i64,
    build_type: String,
    branch: String,
}

#[derive(Serialize)]
struct StoppedBuild {
    id: i64,
    action: &'static str,
}

pub async fn execute(
    args: BuildArgs,
    client: &TeamcityClient,
    renderer: &OutputRenderer,
) -> Result<()> {
    match args.command {
        BuildCommands::Get { id } => {
            let build: BuildDetails = client
                .get_build(id)
                .await
                .with_context(|| format!("Failed to fetch build {id}"))?;
            renderer.render(&BuildRow::from(build))
        }
        BuildCommands::Start(args) => {
            let trigger = build_trigger(&args);
            let id = client.start_build(&trigger).await.with_context(|| {
                format!("Failed to queue build of {}", trigger.build_type_id)
            })?;
            if renderer.format() == OutputFormat::Table {
                println!("{} Queued build {id}", "✓".green());
            }
            renderer.render(&QueuedBuild {
                id,
                build_type: trigger.build_type_id,
                branch: trigger.branch,
            })
        }
        BuildCommands::Cancel(args) => {
            client
                .cancel_queued_build(args.id, &args.comment)
                .await
                .with_context(|| format!("Failed to cancel queued build {}", args.id))?;
            report_stopped(renderer, args.id, "cancelled")
        }
        BuildCommands::Stop(args) => {
            client
                .stop_build(args.id, &args.comment)
                .await
                .with_context(|| format!("Failed to stop build {}", args.id))?;
            report_stopped(renderer, args.id, "stopped")
        }
        BuildCommands::List(args) => {
            let query = build_query(&args);
            tracing::debug!(locator = %query.locator(), "Listing builds");
            let list = client
                .get_all_builds(&query)
                .await
                .context("Failed to list builds")?;
            let rows: Vec<BuildRow> = list.builds.into_iter().map(BuildRow::from).collect();
            if rows.is_empty() && renderer.format() == OutputFormat::Table {
                println!("No builds found");
                return Ok(());
            }
            renderer.render(&rows)
        }
    }
}

fn report_stopped(renderer: &OutputRenderer, id: i64, action: &'static str) -> Result<()> {
    if renderer.format() == OutputFormat::Table {
        println!("{} Build {id} {action}", "✓".green());
        return Ok(());
    }
    renderer.render(&StoppedBuild { id, action })
}

fn build_trigger(args: &StartArgs) -> BuildTrigger {
    let mut trigger = BuildTrigger::new(args.build_type.as_str(), args.branch.as_str())
        .with_comment(args.comment.as_str());
    trigger.params.extend(args.params.iter().cloned());
    trigger
        .snapshot_dependencies
        .extend(args.snapshot_deps.iter().cloned());
    trigger
        .artifact_dependencies
        .extend(args.artifact_deps.iter().cloned());
    trigger
}

fn build_query(args: &ListArgs) -> BuildQuery {
    BuildQuery {
        build_type_id: args.build_type.clone(),
        branch: args.branch.clone(),
        user: args.user.clone(),
        count: args.count,
        start: args.start,
        lookup_limit: args.lookup_limit,
        running: args.running,
        cancelled: args.cancelled,
    }
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    if name.is_empty() {
        return Err(format!("parameter name is empty in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

fn parse_dependency(raw: &str) -> Result<(String, i64), String> {
    let (build_type, id) = parse_param(raw)?;
    let id = id
        .parse::<i64>()
        .map_err(|_| format!("build ID must be a number in '{raw}'"))?;
    Ok((build_type, id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> BuildCommands {
        let mut argv = vec!["build"];
        argv.extend_from_slice(args);
        BuildArgs::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("KEY=VALUE").unwrap(),
            ("KEY".to_string(), "VALUE".to_string())
        );
        assert_eq!(
            parse_param("env.OPTS=a=b").unwrap(),
            ("env.OPTS".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_param("EMPTY=").unwrap().1, "");
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_parse_dependency() {
        assert_eq!(
            parse_dependency("BuildTypeA=42").unwrap(),
            ("BuildTypeA".to_string(), 42)
        );
        assert!(parse_dependency("BuildTypeA=latest").is_err());
    }

    #[test]
    fn test_start_args_to_trigger() {
        let BuildCommands::Start(args) = parse(&[
            "start",
            "--build-type",
            "bt1",
            "--branch",
            "main",
            "--param",
            "KEY=VALUE",
            "--snapshot-dep",
            "BuildTypeA=42",
        ]) else {
            panic!("expected start");
        };

        let trigger = build_trigger(&args);
        assert_eq!(trigger.build_type_id, "bt1");
        assert_eq!(trigger.branch, "main");
        assert_eq!(trigger.params.get("KEY").map(String::as_str), Some("VALUE"));
        assert_eq!(trigger.snapshot_dependencies.get("BuildTypeA"), Some(&42));
        assert!(trigger.artifact_dependencies.is_empty());
    }

    #[test]
    fn test_start_requires_build_type() {
        assert!(BuildArgs::try_parse_from(["build", "start", "--branch", "main"]).is_err());
    }

    #[test]
    fn test_list_args_to_query() {
        let BuildCommands::List(args) =
            parse(&["list", "--build-type", "bt1", "--count", "5", "--running"])
        else {
            panic!("expected list");
        };

        assert_eq!(
            build_query(&args).locator(),
            "buildType:(id:bt1),count:5,running:true,"
        );
    }

    #[test]
    fn test_cancel_args() {
        let BuildCommands::Cancel(args) = parse(&["cancel", "7", "--comment", "no longer needed"])
        else {
            panic!("expected cancel");
        };
        assert_eq!(args.id, 7);
        assert_eq!(args.comment, "no longer needed");
    }

    #[test]
    fn test_row_from_details() {
        let row = BuildRow::from(BuildDetails {
            id: 5,
            status: Some("SUCCESS".to_string()),
            ..Default::default()
        });
        assert_eq!(row.id, 5);
        assert_eq!(row.status, "SUCCESS");
        assert_eq!(row.branch, "");
    }
}
