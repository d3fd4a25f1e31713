//! Conflict Detector & Resolver: turns candidates into an ordered push plan.
//!
//! A candidate conflicts with a target entity iff `(type, name, container)`
//! match exactly. Conflicts are resolved by the policy's strategy; renames are
//! recorded so references from later records in the plan follow the new name.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use entity_fields::{diff_with_options, DiffOptions, FieldDiff};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dependency::{DependencyGraph, Order, UnresolvedDependency};
use crate::model::{ContainerRef, Entity, EntityKey, EntityType};
use crate::references::rewrite_reference;

/// What to do with a candidate that already exists in the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Leave the existing entity untouched.
    #[default]
    Skip,
    /// Replace the existing entity.
    Overwrite,
    /// Push under the first free `name-N`.
    Rename,
    /// Decline to decide; the record stays unresolved until someone does.
    Defer,
}

impl Display for ResolutionStrategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Skip => "skip",
            Self::Overwrite => "overwrite",
            Self::Rename => "rename",
            Self::Defer => "defer",
        })
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "rename" => Ok(Self::Rename),
            "defer" => Ok(Self::Defer),
            other => Err(format!("unknown resolution strategy '{other}'")),
        }
    }
}

/// Default strategy plus per-entity decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub default: ResolutionStrategy,
    pub overrides: BTreeMap<EntityKey, ResolutionStrategy>,
    /// Fields left out when comparing a candidate with the target's record.
    pub ignored_fields: Vec<String>,
    /// List fields whose map elements are matched by a key field rather than
    /// by position when comparing.
    pub keyed_lists: BTreeMap<String, String>,
}

impl ConflictPolicy {
    pub fn new(default: ResolutionStrategy) -> Self {
        Self {
            default,
            ..Self::default()
        }
    }

    pub fn with_override(mut self, key: EntityKey, strategy: ResolutionStrategy) -> Self {
        self.overrides.insert(key, strategy);
        self
    }

    pub fn with_ignored_fields(mut self, fields: impl IntoIterator<Item = String>) -> Self {
        self.ignored_fields.extend(fields);
        self
    }

    pub fn with_keyed_lists(mut self, lists: BTreeMap<String, String>) -> Self {
        self.keyed_lists.extend(lists);
        self
    }

    fn comparison(&self) -> DiffOptions {
        DiffOptions {
            key_fields: self
                .keyed_lists
                .iter()
                .map(|(list, key)| (list.clone(), key.clone()))
                .collect(),
            ignore_paths: self.ignored_fields.clone(),
            ..DiffOptions::default()
        }
    }

    pub fn strategy_for(&self, key: &EntityKey) -> ResolutionStrategy {
        self.overrides.get(key).copied().unwrap_or(self.default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    New,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// New in the target.
    Create,
    Skip,
    Overwrite,
    Rename,
    /// No decision; the push engine blocks this record and its dependents.
    Unresolved,
}

impl Resolution {
    /// Whether executing the record calls the repository.
    pub fn writes(self) -> bool {
        matches!(self, Self::Create | Self::Overwrite | Self::Rename)
    }
}

/// A reference in the candidate rewritten to follow a renamed prerequisite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRewrite {
    pub field: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConflictRecord {
    /// Identity of the candidate as captured.
    pub key: EntityKey,
    /// Entity as it will be written, after renames and reference rewrites.
    pub candidate: Entity,
    pub existing: Option<Entity>,
    pub status: ConflictStatus,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_name: Option<String>,
    /// Earlier plan records this one depends on.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prerequisites: Vec<EntityKey>,
    /// Field changes from `existing` to `candidate`, for conflicts.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub differences: Vec<FieldDiff>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rewritten_references: Vec<ReferenceRewrite>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unresolved_references: Vec<UnresolvedDependency>,
}

/// Ordered, conflict-resolved records for one target.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PushPlan {
    pub records: Vec<ConflictRecord>,
    pub dry_run: bool,
    /// Original key to new name, for every rename in the plan.
    pub renames: BTreeMap<String, String>,
    pub warnings: Vec<String>,
}

impl PushPlan {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, key: &EntityKey) -> Option<&ConflictRecord> {
        self.records.iter().find(|r| r.key == *key)
    }

    /// Records that need a decision before the plan can run cleanly.
    pub fn unresolved(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.records
            .iter()
            .filter(|r| r.resolution == Resolution::Unresolved)
    }

    pub fn is_executable(&self) -> bool {
        self.unresolved().next().is_none()
    }

    pub fn count(&self, resolution: Resolution) -> usize {
        self.records
            .iter()
            .filter(|r| r.resolution == resolution)
            .count()
    }
}

/// Names taken in a `(type, container)` scope, by the target or by this plan.
#[derive(Default)]
struct ClaimedNames {
    names: HashSet<(EntityType, ContainerRef, String)>,
}

impl ClaimedNames {
    fn claim(&mut self, entity_type: EntityType, container: &ContainerRef, name: &str) {
        self.names
            .insert((entity_type, container.clone(), name.to_string()));
    }

    fn is_taken(&self, entity_type: EntityType, container: &ContainerRef, name: &str) -> bool {
        self.names
            .contains(&(entity_type, container.clone(), name.to_string()))
    }

    /// First `name-N` (N from 1) not taken.
    fn next_free(&self, key: &EntityKey) -> String {
        let mut n = 1usize;
        loop {
            let probe = format!("{}-{n}", key.name);
            if !self.is_taken(key.entity_type, &key.container, &probe) {
                return probe;
            }
            n += 1;
        }
    }
}

/// Build a push plan for `candidates` against `target_snapshot`.
///
/// Records follow `order`; candidates missing from it are appended in key
/// order with a warning. `dependencies` supplies the edges used to rewrite
/// references to renamed prerequisites and the unresolved references to
/// surface per record.
pub fn plan(
    candidates: &[Entity],
    target_snapshot: &[Entity],
    policy: &ConflictPolicy,
    order: &Order,
    dependencies: &DependencyGraph,
) -> PushPlan {
    let existing: HashMap<EntityKey, &Entity> =
        target_snapshot.iter().map(|e| (e.key(), e)).collect();
    let by_key: HashMap<EntityKey, &Entity> = candidates.iter().map(|e| (e.key(), e)).collect();

    let mut claimed = ClaimedNames::default();
    for entity in target_snapshot.iter().chain(candidates) {
        claimed.claim(entity.entity_type, &entity.container, &entity.name);
    }

    let mut plan = PushPlan::default();
    let mut sequence: Vec<&EntityKey> = order
        .order
        .iter()
        .filter(|k| by_key.contains_key(*k))
        .collect();
    let ordered: HashSet<&EntityKey> = sequence.iter().copied().collect();
    let mut stragglers: Vec<&EntityKey> = by_key.keys().filter(|k| !ordered.contains(k)).collect();
    stragglers.sort();
    for key in &stragglers {
        plan.warnings
            .push(format!("{key} is not in the dependency order; appended at the end"));
    }
    sequence.extend(stragglers);

    let planned: BTreeSet<&EntityKey> = sequence.iter().copied().collect();
    for key in &order.implicit_prerequisites {
        plan.warnings
            .push(format!("{key} is required by the selection but not selected"));
    }

    let comparison = policy.comparison();
    let mut renames: HashMap<EntityKey, String> = HashMap::new();
    for key in sequence {
        let Some(source) = by_key.get(key) else {
            continue;
        };
        let mut candidate = (*source).clone();
        let target = existing.get(key).copied();
        let status = if target.is_some() {
            ConflictStatus::Conflict
        } else {
            ConflictStatus::New
        };

        let mut rewritten_references = Vec::new();
        for edge in dependencies.edges_from(key) {
            if let Some(new_name) = renames.get(&edge.to) {
                let changed =
                    rewrite_reference(&mut candidate.fields, &edge.field, &edge.to.name, new_name);
                if changed > 0 {
                    rewritten_references.push(ReferenceRewrite {
                        field: edge.field.clone(),
                        from: edge.to.name.clone(),
                        to: new_name.clone(),
                    });
                }
            }
        }

        let (resolution, resolved_name) = match (status, policy.strategy_for(key)) {
            (ConflictStatus::New, _) => (Resolution::Create, None),
            (ConflictStatus::Conflict, ResolutionStrategy::Skip) => (Resolution::Skip, None),
            (ConflictStatus::Conflict, ResolutionStrategy::Overwrite) => {
                (Resolution::Overwrite, None)
            }
            (ConflictStatus::Conflict, ResolutionStrategy::Rename) => {
                let name = claimed.next_free(key);
                claimed.claim(key.entity_type, &key.container, &name);
                (Resolution::Rename, Some(name))
            }
            (ConflictStatus::Conflict, ResolutionStrategy::Defer) => (Resolution::Unresolved, None),
        };

        if let Some(name) = &resolved_name {
            debug!(%key, new_name = %name, "renaming conflicting entity");
            candidate.name = name.clone();
            renames.insert(key.clone(), name.clone());
            plan.renames.insert(key.to_string(), name.clone());
        }

        let differences = match target {
            Some(existing) => diff_with_options(&existing.fields, &candidate.fields, &comparison),
            None => Vec::new(),
        };

        let unresolved_references: Vec<UnresolvedDependency> =
            dependencies.unresolved_for(key).cloned().collect();
        for unresolved in &unresolved_references {
            plan.warnings.push(unresolved.to_string());
        }

        let prerequisites = order
            .prerequisites_of(key)
            .iter()
            .filter(|k| planned.contains(k))
            .cloned()
            .collect();

        plan.records.push(ConflictRecord {
            key: key.clone(),
            candidate,
            existing: target.cloned(),
            status,
            resolution,
            resolved_name,
            prerequisites,
            differences,
            rewritten_references,
            unresolved_references,
        });
    }

    let unresolved = plan.count(Resolution::Unresolved);
    if unresolved > 0 {
        warn!(unresolved, "plan has records awaiting a conflict decision");
    }
    debug!(
        records = plan.records.len(),
        renames = plan.renames.len(),
        warnings = plan.warnings.len(),
        "push plan built"
    );
    plan
}
