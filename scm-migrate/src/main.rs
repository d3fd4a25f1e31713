use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use scm_migrate::config::EngineConfig;
use scm_migrate::conflict::ResolutionStrategy;
use scm_migrate::graph::ConfigurationGraph;
use scm_migrate::progress::{CancelToken, ProgressSink};
use scm_migrate::repository::Snapshot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod capture_cmd;
mod classify_cmd;
mod cli;
mod deps_cmd;
mod path_guard;
mod plan_cmd;
mod push_cmd;

use cli::{Cli, Command, StrategyArg};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = EngineConfig::resolve(cli.config.as_deref()).context("failed to load engine configuration")?;

    match cli.command {
        Command::Capture(args) => capture_cmd::run_capture(args, &config, interrupt_token()).await,
        Command::Deps(args) => deps_cmd::run_deps(args, &config),
        Command::Classify(args) => classify_cmd::run_classify(args, &config),
        Command::Plan(args) => plan_cmd::run_plan(args, &config),
        Command::Push(args) => push_cmd::run_push(args, &config, interrupt_token()).await,
    }
}

/// `-v` raises the level; without it `RUST_LOG` applies, defaulting to warnings.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Token cancelled on Ctrl-C, so long walks stop between steps.
fn interrupt_token() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current step");
            trigger.cancel();
        }
    });
    cancel
}

fn progress_sink() -> Arc<dyn ProgressSink> {
    Arc::new(|message: &str, percent: u8| info!(percent, "{message}"))
}

fn load_graph(path: &Path) -> Result<ConfigurationGraph> {
    ConfigurationGraph::load(path).with_context(|| format!("failed to load graph {}", path.display()))
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    Snapshot::load(path).with_context(|| format!("failed to load snapshot {}", path.display()))
}

fn resolve_strategy(arg: Option<StrategyArg>, config: &EngineConfig) -> ResolutionStrategy {
    match arg {
        Some(StrategyArg::Skip) => ResolutionStrategy::Skip,
        Some(StrategyArg::Overwrite) => ResolutionStrategy::Overwrite,
        Some(StrategyArg::Rename) => ResolutionStrategy::Rename,
        Some(StrategyArg::Defer) => ResolutionStrategy::Defer,
        None => config.push.strategy,
    }
}
