use std::fs;

use anyhow::{Context, Result};
use scm_migrate::config::EngineConfig;
use scm_migrate::conflict::{plan, ConflictPolicy, PushPlan};
use scm_migrate::dependency::{build_graph, topological_order};
use scm_migrate::graph::ConfigurationGraph;
use scm_migrate::model::{Entity, EntityKey};
use scm_migrate::references::ReferenceRules;
use scm_migrate::repository::Snapshot;
use scm_migrate::report::render_plan;
use tracing::info;

use crate::cli::{OutputFormat, PlanArgs};
use crate::{load_graph, load_snapshot, path_guard, resolve_strategy};

pub fn run_plan(args: PlanArgs, config: &EngineConfig) -> Result<()> {
    let graph = load_graph(&args.graph)?;
    let target = load_snapshot(&args.target)?;
    let rules = config.reference_rules();
    let policy = config.conflict_policy(resolve_strategy(args.strategy, config), &rules);
    let push_plan = build_plan(&graph, &target, &policy, args.include_defaults, &rules)?;

    if let Some(out_path) = &args.output {
        path_guard::ensure_output_not_same(out_path, &[&args.graph, &args.target])?;
        let plan_json = serde_json::to_string_pretty(&push_plan)?;
        fs::write(out_path, plan_json)
            .with_context(|| format!("failed to write plan file {}", out_path.display()))?;
    }

    match args.format {
        OutputFormat::Text => println!("{}", render_plan(&push_plan)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&push_plan)?),
    }
    Ok(())
}

/// Order the migratable part of `graph` and resolve it against `target`.
///
/// References are resolved over the whole graph, so an unselected default
/// still counts as a prerequisite rather than a missing name.
pub fn build_plan(
    graph: &ConfigurationGraph,
    target: &Snapshot,
    policy: &ConflictPolicy,
    include_defaults: bool,
    rules: &ReferenceRules,
) -> Result<PushPlan> {
    let candidates: Vec<Entity> = graph
        .migratable(include_defaults)
        .into_iter()
        .cloned()
        .collect();
    let dependencies = build_graph(graph.entities(), &graph.containers, rules);
    let subset: Vec<EntityKey> = candidates.iter().map(Entity::key).collect();
    let order = topological_order(&dependencies, &subset)?;
    let existing = target.entities();

    let push_plan = plan(
        &candidates,
        &existing,
        policy,
        &order,
        &dependencies,
    );
    info!(
        records = push_plan.len(),
        unresolved = push_plan.unresolved().count(),
        strategy = %policy.default,
        "plan built"
    );
    Ok(push_plan)
}
