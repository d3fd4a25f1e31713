//! Repository port: the engine's only view of a remote management system.
//!
//! Implementations own authentication, transport, and wire translation. The
//! engine only lists containers, pages through records, and upserts entities.
//!
//! - [`throttle`]: token-bucket rate limiting and bounded retry, as a decorator
//! - [`snapshot`]: a repository served from (and persisted to) a JSON snapshot

use std::sync::Arc;

use async_trait::async_trait;
use entity_fields::Fields;
use thiserror::Error;

use crate::model::{Container, Entity, EntityType};

pub mod snapshot;
pub mod throttle;

pub use snapshot::{Snapshot, SnapshotError, SnapshotRepository};
pub use throttle::{RateLimiter, RetryPolicy, ThrottledRepository};

/// Failures a repository call can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RepositoryError {
    /// Network failure, timeout, or 5xx. Safe to retry.
    #[error("transient repository error: {0}")]
    Transient(String),
    /// Remote rate limit hit. Safe to retry after backing off.
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The remote refused the request or payload.
    #[error("rejected: {0}")]
    Rejected(String),
    /// The remote returned something that is not a valid record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited(_))
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// One page of raw records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPage {
    pub records: Vec<Fields>,
    /// Token for the next page, `None` when exhausted.
    pub next_page: Option<String>,
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Discover every container visible to the caller.
    async fn list_containers(&self) -> RepoResult<Vec<Container>>;

    /// Fetch one page of records of `entity_type` in `container`.
    async fn list_entities(
        &self,
        container: &Container,
        entity_type: EntityType,
        page_token: Option<&str>,
    ) -> RepoResult<EntityPage>;

    /// Create or replace the entity addressed by its type, container, and name.
    async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity>;
}

#[async_trait]
impl<R: Repository + ?Sized> Repository for Arc<R> {
    async fn list_containers(&self) -> RepoResult<Vec<Container>> {
        (**self).list_containers().await
    }

    async fn list_entities(
        &self,
        container: &Container,
        entity_type: EntityType,
        page_token: Option<&str>,
    ) -> RepoResult<EntityPage> {
        (**self)
            .list_entities(container, entity_type, page_token)
            .await
    }

    async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
        (**self).upsert_entity(entity).await
    }
}
