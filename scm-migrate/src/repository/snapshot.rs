//! Repository backed by a JSON snapshot of a management system.
//!
//! A snapshot is a list of containers plus raw records grouped by entity type,
//! the same shape a remote export produces. Listing filters records by their
//! container key; upserts replace by `(type, container, name)` or append.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use entity_fields::Fields;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{EntityPage, RepoResult, Repository, RepositoryError};
use crate::graph::ConfigurationGraph;
use crate::model::{Container, ContainerKind, Entity, EntityType};

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Errors returned when loading or saving snapshot files.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Containers plus raw records grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub containers: Vec<Container>,
    #[serde(default)]
    pub records: BTreeMap<EntityType, Vec<Fields>>,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = fs::read(path).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_vec_pretty(self).map_err(|source| SnapshotError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Export a captured graph back into snapshot shape.
    pub fn from_graph(graph: &ConfigurationGraph) -> Self {
        let mut records: BTreeMap<EntityType, Vec<Fields>> = BTreeMap::new();
        for entity in graph.entities() {
            let mut record = entity.to_record();
            if let Some(id) = &entity.source_id {
                record.insert("id", id.clone());
            }
            records.entry(entity.entity_type).or_default().push(record);
        }
        Self {
            containers: graph.containers.clone(),
            records,
        }
    }

    /// Every record that forms a valid entity. Invalid records are skipped
    /// with a warning; they cannot conflict with anything addressable.
    pub fn entities(&self) -> Vec<Entity> {
        let mut out = Vec::new();
        for (entity_type, records) in &self.records {
            for record in records {
                match Entity::from_record(*entity_type, record.clone()) {
                    Ok(entity) => out.push(entity),
                    Err(violation) => {
                        warn!(%entity_type, %violation, "skipping invalid snapshot record")
                    }
                }
            }
        }
        out
    }
}

/// In-process repository over a [`Snapshot`].
#[derive(Debug)]
pub struct SnapshotRepository {
    state: Mutex<Snapshot>,
    page_size: usize,
    include_inherited: bool,
    upserts: AtomicUsize,
    next_id: AtomicUsize,
}

impl SnapshotRepository {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            page_size: DEFAULT_PAGE_SIZE,
            include_inherited: false,
            upserts: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Also return records from ancestor folders when listing a folder, the
    /// way hierarchical management systems surface inherited objects.
    pub fn with_inherited(mut self, include_inherited: bool) -> Self {
        self.include_inherited = include_inherited;
        self
    }

    /// Number of upsert calls received.
    pub fn upsert_count(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn record_in(record: &Fields, kind: ContainerKind, name: &str) -> bool {
    record
        .get_text(&[kind.record_key()])
        .is_some_and(|value| value.trim() == name)
}

#[async_trait]
impl Repository for SnapshotRepository {
    async fn list_containers(&self) -> RepoResult<Vec<Container>> {
        Ok(self.lock().containers.clone())
    }

    async fn list_entities(
        &self,
        container: &Container,
        entity_type: EntityType,
        page_token: Option<&str>,
    ) -> RepoResult<EntityPage> {
        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RepositoryError::Rejected(format!("invalid page token '{token}'")))?,
            None => 0,
        };

        let mut scopes = vec![container.name.as_str()];
        if self.include_inherited && container.kind == ContainerKind::Folder {
            scopes.extend(container.ancestors());
        }

        let state = self.lock();
        let matching: Vec<&Fields> = state
            .records
            .get(&entity_type)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| scopes.iter().any(|scope| record_in(r, container.kind, scope)))
                    .collect()
            })
            .unwrap_or_default();

        let end = (offset + self.page_size).min(matching.len());
        let records: Vec<Fields> = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|r| (*r).clone())
            .collect();
        let next_page = (end < matching.len()).then(|| end.to_string());
        debug!(
            container = %container.name,
            %entity_type,
            offset,
            returned = records.len(),
            "snapshot page"
        );
        Ok(EntityPage { records, next_page })
    }

    async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let mut record = entity.to_record();
        let kind = entity.container.kind;

        let mut state = self.lock();
        let records = state.records.entry(entity.entity_type).or_default();
        let existing = records.iter_mut().find(|r| {
            record_in(r, kind, &entity.container.name) && r.get_text(&["name"]) == Some(entity.name.as_str())
        });

        let stored = match existing {
            Some(slot) => {
                if let Some(id) = slot.get("id").cloned() {
                    let mut with_id = Fields::new();
                    with_id.insert("id", id);
                    for (key, value) in record.iter() {
                        with_id.insert(key, value.clone());
                    }
                    record = with_id;
                }
                *slot = record.clone();
                record
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let mut with_id = Fields::new();
                with_id.insert("id", format!("snap-{id}"));
                for (key, value) in record.iter() {
                    with_id.insert(key, value.clone());
                }
                records.push(with_id.clone());
                with_id
            }
        };

        Entity::from_record(entity.entity_type, stored)
            .map_err(|violation| RepositoryError::InvalidRecord(violation.to_string()))
    }
}
