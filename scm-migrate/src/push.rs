//! Push Engine: executes a plan against the target repository, in order.
//!
//! Execution is strictly sequential. A failed, blocked, or dependency-skipped
//! record poisons everything that depends on it; independent records still
//! run. A dry run walks the same path and skips only the repository write.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::conflict::{ConflictRecord, ConflictStatus, PushPlan, Resolution};
use crate::model::EntityKey;
use crate::progress::{percent, CancelToken, NoProgress, ProgressSink};
use crate::repository::Repository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    Pushed,
    Renamed,
    Skipped,
    Failed,
    SkippedDependency,
    /// Conflict resolution never decided.
    Blocked,
    NotAttempted,
}

impl PushOutcome {
    /// Outcomes that prevent dependents from running.
    fn poisons_dependents(self) -> bool {
        matches!(self, Self::Failed | Self::SkippedDependency | Self::Blocked | Self::NotAttempted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushItemOutcome {
    pub key: EntityKey,
    pub status: ConflictStatus,
    pub resolution: Resolution,
    pub outcome: PushOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Prerequisites whose outcome stopped this record.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blocked_by: Vec<EntityKey>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushCounts {
    pub pushed: usize,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skipped_dependency: usize,
    pub blocked: usize,
    pub not_attempted: usize,
}

impl PushCounts {
    fn add(&mut self, outcome: PushOutcome) {
        let slot = match outcome {
            PushOutcome::Pushed => &mut self.pushed,
            PushOutcome::Renamed => &mut self.renamed,
            PushOutcome::Skipped => &mut self.skipped,
            PushOutcome::Failed => &mut self.failed,
            PushOutcome::SkippedDependency => &mut self.skipped_dependency,
            PushOutcome::Blocked => &mut self.blocked,
            PushOutcome::NotAttempted => &mut self.not_attempted,
        };
        *slot += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub dry_run: bool,
    pub cancelled: bool,
    pub counts: PushCounts,
    pub items: Vec<PushItemOutcome>,
}

impl PushReport {
    /// True when nothing failed or was blocked.
    pub fn is_clean(&self) -> bool {
        self.counts.failed == 0 && self.counts.blocked == 0 && self.counts.skipped_dependency == 0
    }

    pub fn outcome_of(&self, key: &EntityKey) -> Option<PushOutcome> {
        self.items.iter().find(|i| i.key == *key).map(|i| i.outcome)
    }
}

/// Sequential executor for [`PushPlan`]s.
pub struct PushEngine {
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl Default for PushEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PushEngine {
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run `plan` against `repository`. `dry_run` (or `plan.dry_run`) skips
    /// every `upsert_entity` call and nothing else.
    ///
    /// Cancellation is checked between records; a write already in flight
    /// completes and is reported.
    pub async fn execute<R>(&self, plan: &PushPlan, repository: &R, dry_run: bool) -> PushReport
    where
        R: Repository + ?Sized,
    {
        let dry_run = dry_run || plan.dry_run;
        let total = plan.records.len();
        let mut report = PushReport {
            dry_run,
            ..PushReport::default()
        };
        let mut poisoned: HashSet<EntityKey> = HashSet::new();

        info!(records = total, dry_run, "push started");
        for (idx, record) in plan.records.iter().enumerate() {
            let item = if report.cancelled || self.cancel.is_cancelled() {
                if !report.cancelled {
                    warn!(remaining = total - idx, "push cancelled");
                    report.cancelled = true;
                }
                outcome(record, PushOutcome::NotAttempted)
            } else {
                self.run_record(record, repository, dry_run, &poisoned).await
            };

            if item.outcome.poisons_dependents() {
                poisoned.insert(record.key.clone());
            }
            report.counts.add(item.outcome);
            self.progress.report(
                &format!("{} {}", label(item.outcome), record.key),
                percent(idx + 1, total),
            );
            report.items.push(item);
        }

        info!(
            pushed = report.counts.pushed,
            renamed = report.counts.renamed,
            skipped = report.counts.skipped,
            failed = report.counts.failed,
            skipped_dependency = report.counts.skipped_dependency,
            blocked = report.counts.blocked,
            not_attempted = report.counts.not_attempted,
            "push finished"
        );
        report
    }

    async fn run_record<R>(
        &self,
        record: &ConflictRecord,
        repository: &R,
        dry_run: bool,
        poisoned: &HashSet<EntityKey>,
    ) -> PushItemOutcome
    where
        R: Repository + ?Sized,
    {
        let blocked_by: Vec<EntityKey> = record
            .prerequisites
            .iter()
            .filter(|k| poisoned.contains(*k))
            .cloned()
            .collect();
        if !blocked_by.is_empty() {
            debug!(key = %record.key, "skipping, prerequisite did not push");
            let mut item = outcome(record, PushOutcome::SkippedDependency);
            item.blocked_by = blocked_by;
            return item;
        }

        let success = match record.resolution {
            Resolution::Skip => return outcome(record, PushOutcome::Skipped),
            Resolution::Unresolved => {
                warn!(key = %record.key, "conflict unresolved, record blocked");
                let mut item = outcome(record, PushOutcome::Blocked);
                item.error = Some("conflict resolution undecided".to_string());
                return item;
            }
            Resolution::Rename => PushOutcome::Renamed,
            Resolution::Create | Resolution::Overwrite => PushOutcome::Pushed,
        };

        if dry_run {
            debug!(key = %record.key, "dry run, not writing");
            return outcome(record, success);
        }

        match repository.upsert_entity(&record.candidate).await {
            Ok(_) => outcome(record, success),
            Err(err) => {
                error!(key = %record.key, error = %err, "push failed");
                let mut item = outcome(record, PushOutcome::Failed);
                item.error = Some(err.to_string());
                item
            }
        }
    }
}

fn outcome(record: &ConflictRecord, outcome: PushOutcome) -> PushItemOutcome {
    PushItemOutcome {
        key: record.key.clone(),
        status: record.status,
        resolution: record.resolution,
        outcome,
        resolved_name: record.resolved_name.clone(),
        error: None,
        blocked_by: Vec::new(),
    }
}

fn label(outcome: PushOutcome) -> &'static str {
    match outcome {
        PushOutcome::Pushed => "pushed",
        PushOutcome::Renamed => "renamed",
        PushOutcome::Skipped => "skipped",
        PushOutcome::Failed => "failed",
        PushOutcome::SkippedDependency => "skipped (dependency)",
        PushOutcome::Blocked => "blocked",
        PushOutcome::NotAttempted => "not attempted",
    }
}
