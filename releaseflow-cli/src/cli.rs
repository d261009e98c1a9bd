use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use releaseflow::config::ReleaseConfig;
use releaseflow::events::LoggingEventSink;
use releaseflow::matrix::BuildMatrix;
use releaseflow::pipeline::{PipelineState, ReleasePipeline, RunReport};
use releaseflow::trigger::{TagFilter, TriggerDecision, TriggerEvent};
use serde_json::json;

/// Exit code for a ref that does not start a release.
pub const EXIT_IGNORED: i32 = 3;

#[derive(Parser, Debug)]
#[command(
    name = "releaseflow",
    version,
    about = "Build wheels and an sdist for a version tag, then publish them"
)]
pub struct ReleaseCli {
    #[command(subcommand)]
    pub command: CommandKind,
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
    #[arg(long, global = true, help = "Enable trace logging")]
    pub trace: bool,
    #[arg(long, global = true, help = "Print machine-readable JSON")]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum CommandKind {
    #[command(about = "Show the expanded build matrix and artifact keys")]
    Plan(ConfigArgs),
    #[command(
        name = "check-ref",
        about = "Decide whether a ref starts a release (exit 0: run, 3: ignore)"
    )]
    CheckRef(CheckRefArgs),
    #[command(about = "Run the release pipeline for a ref")]
    Run(RunArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short,
        long,
        default_value = "release.yaml",
        env = "RELEASEFLOW_CONFIG",
        help = "Path to the release configuration"
    )]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CheckRefArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long = "ref", env = "GITHUB_REF", help = "Git ref that was pushed")]
    pub git_ref: String,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    #[arg(long = "ref", env = "GITHUB_REF", help = "Git ref that was pushed")]
    pub git_ref: String,
    #[arg(long, help = "Build and collect everything but do not upload")]
    pub dry_run: bool,
    #[arg(long, help = "Override the scratch directory")]
    pub work_dir: Option<PathBuf>,
}

fn load_config(args: &ConfigArgs) -> Result<ReleaseConfig> {
    ReleaseConfig::resolve(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))
}

pub fn plan(cli: &ReleaseCli, args: &ConfigArgs) -> Result<i32> {
    let config = load_config(args)?;
    let matrix = BuildMatrix::expand(&config.matrix, &config.artifacts.prefix)?;
    let sdist_key = config.sdist_key();

    if cli.json {
        let entries: Vec<_> = matrix
            .entries()
            .iter()
            .map(|entry| {
                json!({
                    "job": entry.job_name(),
                    "os": entry.os,
                    "runtime": entry.runtime,
                    "platform": entry.platform,
                    "selector": entry.selector(&config.build.selector),
                    "artifact_key": entry.artifact_key,
                })
            })
            .collect();
        let payload = json!({
            "entries": entries,
            "sdist_key": sdist_key,
            "fail_fast": config.matrix.fail_fast,
            "dry_run": config.publish.dry_run,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(0);
    }

    println!("{} wheel job(s):", matrix.len());
    for entry in matrix.entries() {
        println!(
            "  {:<32} select={:<12} key={}",
            entry.job_name(),
            entry.selector(&config.build.selector),
            entry.artifact_key
        );
    }
    println!("sdist key: {sdist_key}");
    if config.publish.dry_run {
        println!("publish: dry run");
    } else {
        println!(
            "publish: {} (environment '{}')",
            config.publish.repository_url, config.publish.environment
        );
    }
    Ok(0)
}

pub fn check_ref(cli: &ReleaseCli, args: &CheckRefArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let filter = TagFilter::new(config.tag_patterns()?);
    let decision = filter.evaluate(&TriggerEvent::new(args.git_ref.as_str()));

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else {
        match &decision {
            TriggerDecision::Run { tag } => println!("run: {tag}"),
            TriggerDecision::Ignore { reason } => println!("ignore: {reason}"),
        }
    }

    Ok(if decision.should_run() { 0 } else { EXIT_IGNORED })
}

pub fn build_pipeline(args: &RunArgs) -> Result<ReleasePipeline> {
    let mut config = load_config(&args.config)?;
    if args.dry_run {
        config.publish.dry_run = true;
    }
    if let Some(dir) = &args.work_dir {
        config.work_dir.clone_from(dir);
    }
    if config.artifacts.store_dir.is_none() {
        config.artifacts.store_dir = Some(config.work_dir.join("artifacts"));
    }

    Ok(ReleasePipeline::builder(config)
        .with_event_sink(Arc::new(LoggingEventSink::new(tracing::Level::DEBUG)))
        .build()?)
}

pub async fn run(cli: &ReleaseCli, args: &RunArgs, pipeline: &ReleasePipeline) -> Result<i32> {
    let report = pipeline.run(&TriggerEvent::new(args.git_ref.as_str())).await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(match report.state {
        PipelineState::Done | PipelineState::Idle => 0,
        _ => 1,
    })
}

fn print_report(report: &RunReport) {
    if let TriggerDecision::Ignore { reason } = &report.decision {
        println!("ignored {}: {reason}", report.git_ref);
        return;
    }

    for (name, output) in &report.jobs {
        let mut line = format!("  {name:<32} {}", output.status);
        if let Some(reason) = output.skip_reason.as_deref().or(output.cancel_reason.as_deref()) {
            line.push_str(&format!(" ({reason})"));
        }
        if let Some(error) = &output.error {
            line.push_str(&format!(" error: {error}"));
        }
        println!("{line}");
    }

    for file in &report.published {
        println!("published {file}");
    }
    for file in &report.dry_run_files {
        println!("would publish {file}");
    }

    match (&report.failure, &report.error) {
        (Some(kind), Some(error)) => println!("release failed ({kind:?}): {error}"),
        (Some(kind), None) => println!("release failed ({kind:?})"),
        _ => println!(
            "release {} finished: {}",
            report.tag.as_deref().unwrap_or(&report.git_ref),
            report.state
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        ReleaseCli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = ReleaseCli::try_parse_from([
            "releaseflow",
            "-vv",
            "run",
            "--config",
            "ci/release.yaml",
            "--ref",
            "refs/tags/v2.0",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let CommandKind::Run(args) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(args.git_ref, "refs/tags/v2.0");
        assert_eq!(args.config.config, PathBuf::from("ci/release.yaml"));
        assert!(args.dry_run);
        assert!(args.work_dir.is_none());
    }

    #[test]
    fn test_run_has_no_static_token_flag() {
        let err = ReleaseCli::try_parse_from([
            "releaseflow",
            "run",
            "--ref",
            "refs/tags/v2.0",
            "--token",
            "pypi-AgEIcHlwaS5vcmc",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
