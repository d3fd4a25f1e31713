//! Configuration Graph: the aggregate result of a capture run.
//!
//! The graph owns the accepted entities and everything the capture had to
//! leave out. `(type, name, container)` identities are unique; inserting a
//! second entity with the same identity is a [`GraphError::DuplicateEntity`]
//! rather than a merge.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Container, ContainerRef, Entity, EntityKey, EntityType};

/// Errors raised while building, saving, or loading a graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate entity {0}")]
    DuplicateEntity(EntityKey),
    #[error("failed to read graph file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to decode graph file {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

/// Why an item is missing from a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Container discovery failed; nothing was walked.
    DiscoveryFailure,
    /// Listing a (container, type) pair failed after the repository's retries.
    RepositoryFailure,
    /// Record had zero or several container references, or no name.
    InvariantViolation,
    /// Same `(type, name, container)` returned twice.
    DuplicateEntity,
    /// Record belongs to a container other than the one being walked.
    OutOfScope,
    /// Pair was not completed because the capture was cancelled.
    Cancelled,
}

/// One structured entry in the capture error list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureIssue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub message: String,
}

/// Capture provenance and bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub source: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub counts: BTreeMap<EntityType, usize>,
    #[serde(default)]
    pub issues: Vec<CaptureIssue>,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub defaults_excluded: usize,
}

impl GraphMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            captured_at: Utc::now(),
            counts: BTreeMap::new(),
            issues: Vec::new(),
            cancelled: false,
            defaults_excluded: 0,
        }
    }

    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &CaptureIssue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }
}

#[derive(Deserialize)]
struct GraphDocument {
    containers: Vec<Container>,
    entities: Vec<Entity>,
    metadata: GraphMetadata,
}

/// Containers, entities, and capture metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GraphDocument")]
pub struct ConfigurationGraph {
    pub containers: Vec<Container>,
    entities: Vec<Entity>,
    pub metadata: GraphMetadata,
    #[serde(skip)]
    index: HashMap<EntityKey, usize>,
}

impl TryFrom<GraphDocument> for ConfigurationGraph {
    type Error = GraphError;

    fn try_from(doc: GraphDocument) -> Result<Self, Self::Error> {
        let mut graph = ConfigurationGraph::new(doc.metadata.source.clone());
        graph.metadata = doc.metadata;
        graph.containers = doc.containers;
        for entity in doc.entities {
            graph.insert_entity(entity)?;
        }
        Ok(graph)
    }
}

impl ConfigurationGraph {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            containers: Vec::new(),
            entities: Vec::new(),
            metadata: GraphMetadata::new(source),
            index: HashMap::new(),
        }
    }

    /// Build a graph from already-materialized entities.
    pub fn from_entities(
        source: impl Into<String>,
        containers: Vec<Container>,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Result<Self, GraphError> {
        let mut graph = Self::new(source);
        graph.containers = containers;
        for entity in entities {
            graph.insert_entity(entity)?;
        }
        graph.finalize();
        Ok(graph)
    }

    /// Add an entity; duplicates are refused and the graph is left unchanged.
    pub fn insert_entity(&mut self, entity: Entity) -> Result<(), GraphError> {
        let key = entity.key();
        if self.index.contains_key(&key) {
            return Err(GraphError::DuplicateEntity(key));
        }
        self.index.insert(key, self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    pub fn record_issue(&mut self, issue: CaptureIssue) {
        self.metadata.issues.push(issue);
    }

    /// Sort entities by identity and recompute per-type counts.
    pub fn finalize(&mut self) {
        self.entities.sort_by_key(Entity::key);
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (entity.key(), idx))
            .collect();
        let mut counts = BTreeMap::new();
        for entity in &self.entities {
            *counts.entry(entity.entity_type).or_insert(0) += 1;
        }
        self.metadata.counts = counts;
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.index.get(key).map(|idx| &self.entities[*idx])
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn container(&self, reference: &ContainerRef) -> Option<&Container> {
        self.containers
            .iter()
            .find(|c| c.kind == reference.kind && c.name == reference.name)
    }

    pub fn default_count(&self) -> usize {
        self.entities.iter().filter(|e| e.is_default).count()
    }

    /// Entities eligible for migration: user-defined unless `include_defaults`.
    pub fn migratable(&self, include_defaults: bool) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| include_defaults || !e.is_default)
            .collect()
    }

    pub fn save(&self, path: &Path) -> Result<(), GraphError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| GraphError::Json {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, json).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, GraphError> {
        let raw = fs::read(path).map_err(|source| GraphError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| GraphError::Json {
            path: path.display().to_string(),
            source,
        })
    }
}
