use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use tracing::{debug, info};
use wsc_cache::{CacheConfig, JobKind};
use wsc_status::{SnapshotOrigin, StatusCategory, StatusSnapshot};

use crate::cli::*;
use crate::scenario::{self, ReplayReport, Scenario};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Replay(args) => cmd_replay(args, config, cli.format),
        Command::Config(args) => cmd_config(args, config, cli.format),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<CacheConfig> {
    match path {
        Some(path) => {
            let config = CacheConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            debug!(path = %path.display(), "configuration loaded");
            Ok(config)
        }
        None => Ok(CacheConfig::default()),
    }
}

fn cmd_replay(args: ReplayArgs, config: CacheConfig, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    info!(
        scenario = %args.scenario.display(),
        steps = scenario.steps.len(),
        "replaying scenario"
    );
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    let report = runtime.block_on(scenario::replay(&scenario, config))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report, args.summary),
    }
    Ok(())
}

fn print_report(report: &ReplayReport, summary: bool) {
    println!("Repository {}", report.repository.bold());
    if !summary {
        for event in &report.events {
            let step = match event.step {
                Some(index) => format!("step {index}"),
                None => "start".to_string(),
            };
            let kind = match event.kind {
                JobKind::Reload => "reload".yellow(),
                JobKind::Update => "update".cyan(),
            };
            println!(
                "\n{} {} {} ({})",
                format!("#{}", event.sequence).bold(),
                kind,
                step.dimmed(),
                event.trigger
            );
            if let SnapshotOrigin::Incremental { paths } = &event.snapshot.origin {
                let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
                println!("  {} {}", "recomputed:".dimmed(), paths.join(", "));
            }
            print_snapshot(&event.snapshot);
        }
        println!();
    }

    match &report.final_snapshot {
        Some(snapshot) if summary => {
            println!("Final status:");
            print_snapshot(snapshot);
        }
        Some(_) => {}
        None => println!("{}", "No snapshot was published.".red()),
    }
    if let Some(error) = &report.last_error {
        println!("{} {}", "Last error:".red().bold(), error);
    }

    let stats = &report.stats;
    println!(
        "{} {} published, {} reloads, {} updates ({} escalated), {} filtered, {} coalesced, {} discarded, {} failed",
        "Jobs:".bold(),
        stats.published,
        stats.reloads_started,
        stats.updates_started,
        stats.updates_escalated,
        stats.filtered,
        stats.coalesced,
        stats.discarded,
        stats.failed
    );
}

fn print_snapshot(snapshot: &StatusSnapshot) {
    if snapshot.is_clean() && snapshot.ignored_not_in_index.is_empty() {
        println!("  {}", "clean".green());
        return;
    }
    for category in StatusCategory::ALL {
        for path in snapshot.paths(category) {
            let label = format!("{:>16}", format!("{}:", category.name()));
            let label = match category {
                StatusCategory::Conflicting => label.red().bold(),
                StatusCategory::Added | StatusCategory::Changed | StatusCategory::Removed => {
                    label.green()
                }
                StatusCategory::Ignored => label.dimmed(),
                _ => label.red(),
            };
            let path = match category {
                StatusCategory::UntrackedFolder => format!("{path}/"),
                _ => path.clone(),
            };
            println!("  {label} {path}");
        }
    }
}

fn cmd_config(args: ConfigArgs, config: CacheConfig, format: OutputFormat) -> anyhow::Result<()> {
    if args.check {
        println!("{} Configuration is valid.", "✓".green().bold());
        return Ok(());
    }
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => print!("{}", config.to_toml_string()?),
    }
    Ok(())
}
