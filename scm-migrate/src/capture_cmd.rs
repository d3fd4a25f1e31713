use anyhow::{bail, Context, Result};
use scm_migrate::capture::{CaptureEngine, CaptureOptions, ContainerScope};
use scm_migrate::classifier::DefaultClassifier;
use scm_migrate::config::EngineConfig;
use scm_migrate::model::{Container, ContainerKind, EntityType};
use scm_migrate::progress::CancelToken;
use scm_migrate::report::render_capture;
use scm_migrate::repository::{Snapshot, SnapshotRepository, ThrottledRepository};

use crate::cli::{CaptureArgs, OutputFormat};
use crate::{load_snapshot, path_guard, progress_sink};

pub async fn run_capture(args: CaptureArgs, config: &EngineConfig, cancel: CancelToken) -> Result<()> {
    path_guard::ensure_output_not_same(&args.output, &[&args.source])?;
    let snapshot = load_snapshot(&args.source)?;
    let types = parse_types(&args.types)?;
    let scope = container_scope(&snapshot, &args.folder, &args.snippet)?;

    let repository = ThrottledRepository::new(
        SnapshotRepository::new(snapshot).with_page_size(config.capture.page_size),
        config.rate_limiter(),
        config.retry_policy(),
    );
    let options = CaptureOptions {
        include_defaults: config.capture.include_defaults && !args.exclude_defaults,
        ..config.capture_options()
    };
    let engine = CaptureEngine::new(DefaultClassifier::new(config.catalog()))
        .with_options(options)
        .with_progress(progress_sink())
        .with_cancel(cancel);

    let source = args.source.display().to_string();
    let graph = engine.capture(&source, scope, &types, &repository).await;
    graph
        .save(&args.output)
        .with_context(|| format!("failed to write graph {}", args.output.display()))?;

    match args.format {
        OutputFormat::Text => println!("{}", render_capture(&graph)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&graph.metadata)?),
    }

    if graph.metadata.cancelled {
        bail!("capture cancelled; partial graph written to {}", args.output.display());
    }
    Ok(())
}

fn parse_types(raw: &[String]) -> Result<Vec<EntityType>> {
    if raw.is_empty() {
        return Ok(EntityType::ALL.to_vec());
    }
    let mut types = Vec::with_capacity(raw.len());
    for value in raw {
        let entity_type: EntityType = value.parse()?;
        if !types.contains(&entity_type) {
            types.push(entity_type);
        }
    }
    Ok(types)
}

/// Explicit containers must exist in the source so their paths are known.
fn container_scope(snapshot: &Snapshot, folders: &[String], snippets: &[String]) -> Result<ContainerScope> {
    if folders.is_empty() && snippets.is_empty() {
        return Ok(ContainerScope::Discover);
    }
    let wanted = folders
        .iter()
        .map(|name| (ContainerKind::Folder, name))
        .chain(snippets.iter().map(|name| (ContainerKind::Snippet, name)));

    let mut containers: Vec<Container> = Vec::new();
    for (kind, name) in wanted {
        let Some(found) = snapshot
            .containers
            .iter()
            .find(|c| c.kind == kind && c.name == *name)
        else {
            bail!("{kind} '{name}' not found in source");
        };
        if !containers.contains(found) {
            containers.push(found.clone());
        }
    }
    Ok(ContainerScope::Explicit(containers))
}
