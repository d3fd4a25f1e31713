use colored::Colorize;
use entity_fields::{format_summary, format_text};
use serde::Serialize;

use crate::classifier::{DefaultClassifier, DefaultReason};
use crate::conflict::{ConflictStatus, PushPlan, Resolution};
use crate::dependency::{DependencyEdge, DependencyGraph, Order, UnresolvedDependency};
use crate::graph::ConfigurationGraph;
use crate::model::EntityKey;
use crate::push::{PushOutcome, PushReport};

/// Render capture metadata: per-type counts and issues.
pub fn render_capture(graph: &ConfigurationGraph) -> String {
    let meta = &graph.metadata;
    let mut out = Vec::new();
    out.push(
        format!(
            "source={} captured_at={} containers={} entities={} defaults={} defaults_excluded={} issues={}",
            meta.source,
            meta.captured_at.to_rfc3339(),
            graph.containers.len(),
            graph.len(),
            graph.default_count(),
            meta.defaults_excluded,
            meta.issues.len()
        )
        .cyan()
        .to_string(),
    );
    if meta.cancelled {
        out.push("capture cancelled: graph is partial".yellow().bold().to_string());
    }
    for (entity_type, count) in &meta.counts {
        out.push(format!("- {entity_type}: {count}"));
    }
    for issue in &meta.issues {
        let scope = match (&issue.container, issue.entity_type) {
            (Some(container), Some(entity_type)) => format!("{container} {entity_type}"),
            (Some(container), None) => container.to_string(),
            _ => "-".to_string(),
        };
        let entity = issue
            .entity
            .as_deref()
            .map(|name| format!(" '{name}'"))
            .unwrap_or_default();
        out.push(
            format!("! {:?} {scope}{entity}: {}", issue.kind, issue.message)
                .magenta()
                .to_string(),
        );
    }
    out.join("\n")
}

/// One entity's classification, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationRow {
    pub key: EntityKey,
    pub is_default: bool,
    #[serde(flatten)]
    pub reason: Option<DefaultReason>,
}

pub fn classify_rows(graph: &ConfigurationGraph, classifier: &DefaultClassifier) -> Vec<ClassificationRow> {
    graph
        .entities()
        .iter()
        .map(|entity| {
            let reason = classifier.classify_with_reason(entity);
            ClassificationRow {
                key: entity.key(),
                is_default: reason.is_some(),
                reason,
            }
        })
        .collect()
}

/// Render default/custom classification lines.
pub fn render_classification(rows: &[ClassificationRow]) -> String {
    let defaults = rows.iter().filter(|r| r.is_default).count();
    let mut out = vec![format!("defaults={defaults} custom={}", rows.len() - defaults)
        .cyan()
        .to_string()];
    for row in rows {
        let line = match &row.reason {
            Some(reason) => format!("DEFAULT {} ({reason})", row.key).dimmed().to_string(),
            None => format!("CUSTOM  {}", row.key),
        };
        out.push(line);
    }
    out.join("\n")
}

/// Dependency view of a captured graph.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyReport<'a> {
    pub order: &'a [EntityKey],
    pub edges: Vec<DependencyEdge>,
    pub unresolved: &'a [UnresolvedDependency],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact<'a>>,
}

/// Everything that transitively depends on `key`.
#[derive(Debug, Clone, Serialize)]
pub struct Impact<'a> {
    pub key: &'a EntityKey,
    pub dependents: Vec<&'a EntityKey>,
}

impl<'a> DependencyReport<'a> {
    pub fn new(graph: &'a DependencyGraph, order: &'a Order, impact: Option<&'a EntityKey>) -> Self {
        Self {
            order: &order.order,
            edges: graph.edges(),
            unresolved: graph.unresolved(),
            impact: impact.map(|key| Impact {
                key,
                dependents: graph.dependents_of(key),
            }),
        }
    }
}

/// Render push order, edges, and unresolved references.
pub fn render_dependencies(report: &DependencyReport<'_>) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "entities={} edges={} unresolved={}",
            report.order.len(),
            report.edges.len(),
            report.unresolved.len()
        )
        .cyan()
        .to_string(),
    );
    out.push("order".to_string());
    for (idx, key) in report.order.iter().enumerate() {
        out.push(format!("{:>4}. {key}", idx + 1));
        for edge in report.edges.iter().filter(|e| e.from == *key) {
            out.push(format!("        -> {} ({} via {})", edge.to, edge.relation, edge.field));
        }
    }
    for unresolved in report.unresolved {
        out.push(format!("? {unresolved}").yellow().to_string());
    }
    if let Some(impact) = &report.impact {
        out.push(format!("impact of {}: {} dependents", impact.key, impact.dependents.len()));
        for key in &impact.dependents {
            out.push(format!("- {key}").red().to_string());
        }
    }
    out.join("\n")
}

/// Render a push plan, one record per line with conflict details.
pub fn render_plan(plan: &PushPlan) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "records={} create={} skip={} overwrite={} rename={} unresolved={}{}",
            plan.len(),
            plan.count(Resolution::Create),
            plan.count(Resolution::Skip),
            plan.count(Resolution::Overwrite),
            plan.count(Resolution::Rename),
            plan.count(Resolution::Unresolved),
            if plan.dry_run { " (dry run)" } else { "" }
        )
        .cyan()
        .to_string(),
    );

    for record in &plan.records {
        let line = match record.resolution {
            Resolution::Create => format!("+ CREATE    {}", record.key).green(),
            Resolution::Overwrite => format!("~ OVERWRITE {}", record.key).yellow(),
            Resolution::Rename => format!(
                "~ RENAME    {} -> {}",
                record.key,
                record.candidate.key()
            )
            .yellow(),
            Resolution::Skip => format!("= SKIP      {}", record.key).normal(),
            Resolution::Unresolved => format!("! UNRESOLVED {}", record.key).magenta(),
        };
        out.push(line.to_string());

        if record.status == ConflictStatus::Conflict && !record.differences.is_empty() {
            out.push(format!("    {}", format_summary(&record.differences)).dimmed().to_string());
            for diff_line in format_text(&record.differences).lines() {
                out.push(format!("    {diff_line}"));
            }
        }
        for rewrite in &record.rewritten_references {
            out.push(format!("    {}: {} -> {}", rewrite.field, rewrite.from, rewrite.to));
        }
        for unresolved in &record.unresolved_references {
            out.push(format!("    ? {unresolved}").yellow().to_string());
        }
    }

    for warning in &plan.warnings {
        out.push(format!("warning: {warning}").yellow().to_string());
    }
    out.join("\n")
}

/// Render per-item push outcomes and totals.
pub fn render_push(report: &PushReport) -> String {
    let mut out = Vec::new();
    let c = &report.counts;
    out.push(
        format!(
            "pushed={} renamed={} skipped={} failed={} skipped_dependency={} blocked={} not_attempted={}{}",
            c.pushed,
            c.renamed,
            c.skipped,
            c.failed,
            c.skipped_dependency,
            c.blocked,
            c.not_attempted,
            if report.dry_run { " (dry run)" } else { "" }
        )
        .cyan()
        .to_string(),
    );
    if report.cancelled {
        out.push("push cancelled".yellow().bold().to_string());
    }

    for item in &report.items {
        let line = match item.outcome {
            PushOutcome::Pushed => format!("+ PUSHED   {}", item.key).green(),
            PushOutcome::Renamed => format!(
                "+ RENAMED  {} as '{}'",
                item.key,
                item.resolved_name.as_deref().unwrap_or(&item.key.name)
            )
            .green(),
            PushOutcome::Skipped => format!("= SKIPPED  {}", item.key).normal(),
            PushOutcome::Failed => format!(
                "- FAILED   {}: {}",
                item.key,
                item.error.as_deref().unwrap_or("unknown error")
            )
            .red(),
            PushOutcome::SkippedDependency => format!(
                "- DEPFAIL  {} (after {})",
                item.key,
                join_keys(&item.blocked_by)
            )
            .red(),
            PushOutcome::Blocked => format!("! BLOCKED  {}: conflict unresolved", item.key).magenta(),
            PushOutcome::NotAttempted => format!("  PENDING  {}", item.key).dimmed(),
        };
        out.push(line.to_string());
    }
    out.join("\n")
}

fn join_keys(keys: &[EntityKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
