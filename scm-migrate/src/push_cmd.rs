use anyhow::{bail, Context, Result};
use scm_migrate::config::EngineConfig;
use scm_migrate::progress::CancelToken;
use scm_migrate::push::PushEngine;
use scm_migrate::report::render_push;
use scm_migrate::repository::{SnapshotRepository, ThrottledRepository};

use crate::cli::{OutputFormat, PushArgs};
use crate::plan_cmd::build_plan;
use crate::{load_graph, load_snapshot, path_guard, progress_sink, resolve_strategy};

pub async fn run_push(args: PushArgs, config: &EngineConfig, cancel: CancelToken) -> Result<()> {
    path_guard::ensure_output_not_same(&args.target, &[&args.graph])?;
    let graph = load_graph(&args.graph)?;
    let target = load_snapshot(&args.target)?;
    let rules = config.reference_rules();
    let policy = config.conflict_policy(resolve_strategy(args.strategy, config), &rules);
    let push_plan = build_plan(&graph, &target, &policy, args.include_defaults, &rules)?;

    let repository = ThrottledRepository::new(
        SnapshotRepository::new(target),
        config.rate_limiter(),
        config.retry_policy(),
    );
    let report = PushEngine::new()
        .with_progress(progress_sink())
        .with_cancel(cancel)
        .execute(&push_plan, &repository, args.dry_run)
        .await;

    if !args.dry_run {
        repository
            .inner()
            .snapshot()
            .save(&args.target)
            .with_context(|| format!("failed to write target snapshot {}", args.target.display()))?;
    }

    match args.format {
        OutputFormat::Text => println!("{}", render_push(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    let counts = &report.counts;
    if counts.failed > 0 || counts.blocked > 0 {
        bail!(
            "push incomplete: failed={} blocked={} skipped_dependency={}",
            counts.failed,
            counts.blocked,
            counts.skipped_dependency
        );
    }
    if report.cancelled {
        bail!("push cancelled: {} records not attempted", counts.not_attempted);
    }
    Ok(())
}
