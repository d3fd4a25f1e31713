use anyhow::{bail, Context, Result};
use scm_migrate::config::EngineConfig;
use scm_migrate::dependency::{build_graph, topological_order};
use scm_migrate::model::{Entity, EntityKey};
use scm_migrate::report::{render_dependencies, DependencyReport};

use crate::cli::{DepsArgs, OutputFormat};
use crate::load_graph;

pub fn run_deps(args: DepsArgs, config: &EngineConfig) -> Result<()> {
    let graph = load_graph(&args.graph)?;
    let rules = config.reference_rules();
    let dependencies = build_graph(graph.entities(), &graph.containers, &rules);

    let impact: Option<EntityKey> = args
        .impact
        .as_deref()
        .map(str::parse)
        .transpose()
        .context("invalid --impact key")?;
    if let Some(key) = &impact {
        if !dependencies.contains(key) {
            bail!("{key} is not in {}", args.graph.display());
        }
    }

    let keys: Vec<EntityKey> = graph.entities().iter().map(Entity::key).collect();
    let order = topological_order(&dependencies, &keys)?;
    let report = DependencyReport::new(&dependencies, &order, impact.as_ref());

    match args.format {
        OutputFormat::Text => println!("{}", render_dependencies(&report)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
