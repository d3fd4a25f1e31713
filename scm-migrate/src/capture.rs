//! Capture Engine: walks containers through a [`Repository`] and assembles a
//! [`ConfigurationGraph`].
//!
//! Every `(container, type)` pair is fetched independently, up to
//! `concurrency` at a time. Results flow into one aggregating loop, which is
//! the only writer to the graph. A failing pair is recorded and the walk goes
//! on; a pair either contributes all of its pages or none of them.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use entity_fields::Fields;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::classifier::DefaultClassifier;
use crate::graph::{CaptureIssue, ConfigurationGraph, GraphError, IssueKind};
use crate::model::{Container, ContainerRef, Entity, EntityType};
use crate::progress::{percent, CancelToken, NoProgress, ProgressSink};
use crate::repository::{Repository, RepositoryError};

/// Knobs for a capture run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureOptions {
    /// Maximum `(container, type)` pairs fetched at once.
    pub concurrency: usize,
    /// Keep entities classified as defaults in the graph.
    pub include_defaults: bool,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            include_defaults: true,
        }
    }
}

/// Which containers to walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerScope {
    /// Ask the repository for every container.
    Discover,
    Explicit(Vec<Container>),
}

enum PairResult {
    Complete(Vec<Fields>),
    Failed(RepositoryError),
    Cancelled,
}

pub struct CaptureEngine {
    classifier: DefaultClassifier,
    options: CaptureOptions,
    progress: Arc<dyn ProgressSink>,
    cancel: CancelToken,
}

impl CaptureEngine {
    pub fn new(classifier: DefaultClassifier) -> Self {
        Self {
            classifier,
            options: CaptureOptions::default(),
            progress: Arc::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Capture `types` from the containers in `scope`.
    ///
    /// Never fails as a whole: discovery and per-pair failures, invariant
    /// violations, duplicates, and cancellation all land in
    /// `metadata.issues`.
    pub async fn capture<R>(
        &self,
        source: &str,
        scope: ContainerScope,
        types: &[EntityType],
        repository: &R,
    ) -> ConfigurationGraph
    where
        R: Repository + ?Sized,
    {
        let mut graph = ConfigurationGraph::new(source);

        let containers = match scope {
            ContainerScope::Explicit(containers) => containers,
            ContainerScope::Discover => {
                self.progress.report("discovering containers", 0);
                let discovered = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    result = repository.list_containers() => Some(result),
                };
                match discovered {
                    Some(Ok(containers)) => containers,
                    Some(Err(err)) => {
                        error!(error = %err, "container discovery failed");
                        graph.record_issue(CaptureIssue {
                            kind: IssueKind::DiscoveryFailure,
                            container: None,
                            entity_type: None,
                            entity: None,
                            message: err.to_string(),
                        });
                        graph.finalize();
                        return graph;
                    }
                    None => {
                        graph.metadata.cancelled = true;
                        graph.record_issue(CaptureIssue {
                            kind: IssueKind::Cancelled,
                            container: None,
                            entity_type: None,
                            entity: None,
                            message: "cancelled during container discovery".to_string(),
                        });
                        graph.finalize();
                        return graph;
                    }
                }
            }
        };
        graph.containers = containers;

        let pairs: Vec<(Container, EntityType)> = graph
            .containers
            .iter()
            .flat_map(|c| types.iter().map(move |t| (c.clone(), *t)))
            .collect();
        let total = pairs.len();
        let mut remaining_types: HashMap<ContainerRef, usize> = HashMap::new();
        for (container, _) in &pairs {
            *remaining_types.entry(container.reference()).or_insert(0) += 1;
        }
        info!(
            containers = graph.containers.len(),
            types = types.len(),
            pairs = total,
            "capture started"
        );

        let mut results = stream::iter(pairs)
            .map(|(container, entity_type)| async move {
                let result = self.fetch_pair(repository, &container, entity_type).await;
                (container, entity_type, result)
            })
            .buffer_unordered(self.options.concurrency.max(1));

        let mut done = 0;
        while let Some((container, entity_type, result)) = results.next().await {
            done += 1;
            let reference = container.reference();
            match result {
                PairResult::Complete(records) => {
                    let count = records.len();
                    for record in records {
                        self.accept(&mut graph, &container, entity_type, record);
                    }
                    debug!(container = %reference, %entity_type, count, "pair captured");
                }
                PairResult::Failed(err) => {
                    warn!(container = %reference, %entity_type, error = %err, "pair failed");
                    graph.record_issue(CaptureIssue {
                        kind: IssueKind::RepositoryFailure,
                        container: Some(reference.clone()),
                        entity_type: Some(entity_type),
                        entity: None,
                        message: err.to_string(),
                    });
                }
                PairResult::Cancelled => {
                    graph.metadata.cancelled = true;
                    graph.record_issue(CaptureIssue {
                        kind: IssueKind::Cancelled,
                        container: Some(reference.clone()),
                        entity_type: Some(entity_type),
                        entity: None,
                        message: "not captured: cancelled".to_string(),
                    });
                }
            }

            self.progress.report(
                &format!("{reference}: {entity_type}"),
                percent(done, total),
            );
            if let Some(left) = remaining_types.get_mut(&reference) {
                *left -= 1;
                if *left == 0 {
                    self.progress
                        .report(&format!("{reference}: complete"), percent(done, total));
                }
            }
        }

        graph.finalize();
        graph.metadata.issues.sort_by(|a, b| {
            (&a.container, &a.entity_type, &a.entity).cmp(&(&b.container, &b.entity_type, &b.entity))
        });
        if graph.metadata.cancelled {
            warn!(entities = graph.len(), "capture cancelled, returning partial graph");
        }
        info!(
            entities = graph.len(),
            defaults = graph.default_count(),
            defaults_excluded = graph.metadata.defaults_excluded,
            issues = graph.metadata.issues.len(),
            "capture finished"
        );
        graph
    }

    /// Fetch every page of one pair. Nothing is returned unless all pages
    /// arrive.
    async fn fetch_pair<R>(&self, repository: &R, container: &Container, entity_type: EntityType) -> PairResult
    where
        R: Repository + ?Sized,
    {
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        let mut seen_tokens: HashSet<String> = HashSet::new();
        loop {
            if self.cancel.is_cancelled() {
                return PairResult::Cancelled;
            }
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PairResult::Cancelled,
                page = repository.list_entities(container, entity_type, token.as_deref()) => page,
            };
            match page {
                Ok(page) => {
                    records.extend(page.records);
                    match page.next_page {
                        Some(next) if !seen_tokens.insert(next.clone()) => {
                            return PairResult::Failed(RepositoryError::Rejected(format!(
                                "repository repeated page token '{next}'"
                            )));
                        }
                        Some(next) => token = Some(next),
                        None => return PairResult::Complete(records),
                    }
                }
                Err(err) => return PairResult::Failed(err),
            }
        }
    }

    /// Validate, classify, and insert one record fetched for `container`.
    fn accept(
        &self,
        graph: &mut ConfigurationGraph,
        container: &Container,
        entity_type: EntityType,
        record: Fields,
    ) {
        let reference = container.reference();
        let name = record.get_text(&["name"]).map(str::to_string);
        let mut entity = match Entity::from_record(entity_type, record) {
            Ok(entity) => entity,
            Err(violation) => {
                warn!(container = %reference, %entity_type, %violation, "record rejected");
                graph.record_issue(CaptureIssue {
                    kind: IssueKind::InvariantViolation,
                    container: Some(reference),
                    entity_type: Some(entity_type),
                    entity: name,
                    message: violation.to_string(),
                });
                return;
            }
        };

        if entity.container != reference {
            debug!(
                walked = %reference,
                owner = %entity.container,
                name = %entity.name,
                "record belongs to another container"
            );
            graph.record_issue(CaptureIssue {
                kind: IssueKind::OutOfScope,
                container: Some(reference),
                entity_type: Some(entity_type),
                entity: Some(entity.name.clone()),
                message: format!("owned by {}", entity.container),
            });
            return;
        }

        entity.is_default = self.classifier.classify(&entity);
        if entity.is_default && !self.options.include_defaults {
            graph.metadata.defaults_excluded += 1;
            return;
        }

        let entity_name = entity.name.clone();
        if let Err(GraphError::DuplicateEntity(key)) = graph.insert_entity(entity) {
            error!(%key, "repository returned the same entity twice");
            graph.record_issue(CaptureIssue {
                kind: IssueKind::DuplicateEntity,
                container: Some(reference),
                entity_type: Some(entity_type),
                entity: Some(entity_name),
                message: format!("duplicate {key}; first occurrence kept"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use entity_fields::parse;
    use pretty_assertions::assert_eq;

    use super::{CaptureEngine, CaptureOptions, ContainerScope};
    use crate::classifier::DefaultClassifier;
    use crate::graph::{CaptureIssue, IssueKind};
    use crate::model::{Container, ContainerKind, ContainerRef, Entity, EntityType};
    use crate::progress::CancelToken;
    use crate::repository::{
        EntityPage, RepoResult, Repository, RepositoryError, Snapshot, SnapshotRepository,
    };

    fn snapshot() -> Snapshot {
        serde_json::from_str(
            r#"{
                "containers": [
                    {"name": "Shared", "kind": "folder", "path": "All/Shared"},
                    {"name": "Texas", "kind": "folder", "path": "All/Shared/Texas"},
                    {"name": "base", "kind": "snippet"}
                ],
                "records": {
                    "address": [
                        {"id": "1", "name": "A", "folder": "Shared", "ip_netmask": "10.0.0.1/32"},
                        {"id": "2", "name": "B", "folder": "Shared", "ip_netmask": "10.0.0.2/32"},
                        {"id": "3", "name": "T", "folder": "Texas", "fqdn": "t.example"},
                        {"id": "4", "name": "S", "snippet": "base", "fqdn": "s.example"}
                    ],
                    "address-group": [
                        {"id": "5", "name": "G", "folder": "Shared", "static": ["A", "B"]}
                    ],
                    "anti-spyware-profile": [
                        {"id": "6", "name": "best-practice", "folder": "Shared"},
                        {"id": "7", "name": "custom-as", "folder": "Shared"}
                    ],
                    "tag": [
                        {"id": "8", "name": "prod", "folder": "Texas"}
                    ]
                }
            }"#,
        )
        .expect("snapshot")
    }

    fn engine() -> CaptureEngine {
        CaptureEngine::new(DefaultClassifier::default())
    }

    const TYPES: [EntityType; 4] = [
        EntityType::Address,
        EntityType::AddressGroup,
        EntityType::AntiSpywareProfile,
        EntityType::Tag,
    ];

    #[tokio::test]
    async fn discovers_and_captures_every_pair() {
        let repo = SnapshotRepository::new(snapshot()).with_page_size(1);
        let graph = engine()
            .capture("tenant-a", ContainerScope::Discover, &TYPES, &repo)
            .await;

        assert_eq!(graph.containers.len(), 3);
        assert_eq!(graph.len(), 8);
        assert!(graph.metadata.issues.is_empty());
        assert_eq!(graph.metadata.counts.get(&EntityType::Address), Some(&4));
        assert_eq!(graph.default_count(), 1);
        assert!(graph
            .entities()
            .iter()
            .all(|e| graph.container(&e.container).is_some()));
        let keys: Vec<_> = graph.entities().iter().map(Entity::key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[tokio::test]
    async fn invalid_records_are_rejected_and_reported() {
        let mut snap = snapshot();
        snap.records
            .get_mut(&EntityType::AntiSpywareProfile)
            .expect("profiles")
            .push(
                entity_fields::parse(
                    br#"{"name": "strict", "folder": "Shared", "snippet": "predefined-snippet"}"#,
                )
                .expect("parse"),
            );
        let repo = SnapshotRepository::new(snap);
        let graph = engine()
            .capture("t", ContainerScope::Discover, &TYPES, &repo)
            .await;

        let violations: Vec<_> = graph.metadata.issues_of(IssueKind::InvariantViolation).collect();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].entity.as_deref(), Some("strict"));
        assert!(violations[0].message.contains("more than one container"));
        assert!(graph
            .entities()
            .iter()
            .all(|e| e.name != "strict"));
    }

    #[tokio::test]
    async fn defaults_can_be_excluded() {
        let repo = SnapshotRepository::new(snapshot());
        let graph = engine()
            .with_options(CaptureOptions {
                concurrency: 2,
                include_defaults: false,
            })
            .capture("t", ContainerScope::Discover, &TYPES, &repo)
            .await;
        assert_eq!(graph.len(), 7);
        assert_eq!(graph.metadata.defaults_excluded, 1);
        assert_eq!(graph.default_count(), 0);
    }

    #[tokio::test]
    async fn inherited_records_are_out_of_scope() {
        let repo = SnapshotRepository::new(snapshot()).with_inherited(true);
        let texas = Container::new(ContainerKind::Folder, "Texas").with_path("All/Shared/Texas");
        let graph = engine()
            .capture(
                "t",
                ContainerScope::Explicit(vec![texas]),
                &[EntityType::Address],
                &repo,
            )
            .await;

        let names: Vec<&str> = graph.entities().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["T"]);
        assert_eq!(graph.metadata.issues_of(IssueKind::OutOfScope).count(), 2);
    }

    /// Wraps a snapshot repository, failing chosen pairs and pages.
    struct Failing {
        inner: SnapshotRepository,
        fail_pair: Option<(&'static str, EntityType)>,
        fail_page: Option<&'static str>,
        duplicate: bool,
    }

    #[async_trait]
    impl Repository for Failing {
        async fn list_containers(&self) -> RepoResult<Vec<Container>> {
            self.inner.list_containers().await
        }

        async fn list_entities(
            &self,
            container: &Container,
            entity_type: EntityType,
            page_token: Option<&str>,
        ) -> RepoResult<EntityPage> {
            if self.fail_pair == Some((container.name.as_str(), entity_type)) {
                return Err(RepositoryError::Transient("504 gateway timeout".into()));
            }
            if page_token.is_some() && page_token == self.fail_page {
                return Err(RepositoryError::Transient("connection reset".into()));
            }
            let mut page = self.inner.list_entities(container, entity_type, page_token).await?;
            if self.duplicate {
                let copy = page.records.clone();
                page.records.extend(copy);
            }
            Ok(page)
        }

        async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
            self.inner.upsert_entity(entity).await
        }
    }

    #[tokio::test]
    async fn failing_pair_is_recorded_and_walk_continues() {
        let repo = Failing {
            inner: SnapshotRepository::new(snapshot()),
            fail_pair: Some(("Texas", EntityType::Tag)),
            fail_page: None,
            duplicate: false,
        };
        let graph = engine()
            .capture("t", ContainerScope::Discover, &TYPES, &repo)
            .await;

        let failures: Vec<_> = graph.metadata.issues_of(IssueKind::RepositoryFailure).collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].container, Some(ContainerRef::folder("Texas")));
        assert_eq!(failures[0].entity_type, Some(EntityType::Tag));
        assert_eq!(graph.len(), 7);
    }

    #[tokio::test]
    async fn pair_is_discarded_when_a_later_page_fails() {
        let repo = Failing {
            inner: SnapshotRepository::new(snapshot()).with_page_size(1),
            fail_pair: None,
            fail_page: Some("1"),
            duplicate: false,
        };
        let graph = engine()
            .capture(
                "t",
                ContainerScope::Explicit(vec![Container::new(ContainerKind::Folder, "Shared")]),
                &[EntityType::Address],
                &repo,
            )
            .await;
        assert!(graph.is_empty());
        assert_eq!(graph.metadata.issues_of(IssueKind::RepositoryFailure).count(), 1);
    }

    /// Hands out page tokens that loop `a -> b -> a`.
    struct CyclingTokens {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CyclingTokens {
        async fn list_containers(&self) -> RepoResult<Vec<Container>> {
            Ok(vec![Container::new(ContainerKind::Folder, "Shared")])
        }

        async fn list_entities(
            &self,
            _container: &Container,
            _entity_type: EntityType,
            page_token: Option<&str>,
        ) -> RepoResult<EntityPage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = match page_token {
                Some("a") => "b",
                _ => "a",
            };
            let record = parse(br#"{"name": "loop", "folder": "Shared"}"#)
                .map_err(|err| RepositoryError::Rejected(err.to_string()))?;
            Ok(EntityPage {
                records: vec![record],
                next_page: Some(next.to_string()),
            })
        }

        async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
            Ok(entity.clone())
        }
    }

    #[tokio::test]
    async fn cycling_page_tokens_fail_the_pair() {
        let repo = CyclingTokens {
            calls: AtomicUsize::new(0),
        };
        let graph = tokio::time::timeout(
            Duration::from_secs(5),
            engine().capture("t", ContainerScope::Discover, &[EntityType::Tag], &repo),
        )
        .await
        .expect("capture finishes");

        assert!(graph.is_empty());
        let failures: Vec<&CaptureIssue> =
            graph.metadata.issues_of(IssueKind::RepositoryFailure).collect();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].message.contains("repeated page token 'a'"), "{}", failures[0].message);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn duplicates_are_reported_not_merged() {
        let repo = Failing {
            inner: SnapshotRepository::new(snapshot()),
            fail_pair: None,
            fail_page: None,
            duplicate: true,
        };
        let graph = engine()
            .capture(
                "t",
                ContainerScope::Explicit(vec![Container::new(ContainerKind::Folder, "Shared")]),
                &[EntityType::Address],
                &repo,
            )
            .await;
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.metadata.issues_of(IssueKind::DuplicateEntity).count(), 2);
    }

    /// Cancels the token on its first listing call.
    struct CancelOnFirstCall {
        inner: SnapshotRepository,
        cancel: CancelToken,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Repository for CancelOnFirstCall {
        async fn list_containers(&self) -> RepoResult<Vec<Container>> {
            self.inner.list_containers().await
        }

        async fn list_entities(
            &self,
            container: &Container,
            entity_type: EntityType,
            page_token: Option<&str>,
        ) -> RepoResult<EntityPage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.cancel.cancel();
            }
            self.inner.list_entities(container, entity_type, page_token).await
        }

        async fn upsert_entity(&self, entity: &Entity) -> RepoResult<Entity> {
            self.inner.upsert_entity(entity).await
        }
    }

    #[tokio::test]
    async fn cancelled_capture_returns_partial_graph() {
        let cancel = CancelToken::new();
        let repo = CancelOnFirstCall {
            inner: SnapshotRepository::new(snapshot()),
            cancel: cancel.clone(),
            calls: AtomicUsize::new(0),
        };
        let graph = engine()
            .with_options(CaptureOptions {
                concurrency: 1,
                include_defaults: true,
            })
            .with_cancel(cancel)
            .capture(
                "t",
                ContainerScope::Explicit(vec![Container::new(ContainerKind::Folder, "Shared")]),
                &[EntityType::Address, EntityType::AddressGroup, EntityType::Tag],
                &repo,
            )
            .await;

        assert!(graph.metadata.cancelled);
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.metadata.issues_of(IssueKind::Cancelled).count(), 2);
        assert_eq!(repo.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn progress_reports_pairs_and_containers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let repo = SnapshotRepository::new(snapshot());
        engine()
            .with_options(CaptureOptions {
                concurrency: 1,
                include_defaults: true,
            })
            .with_progress(Arc::new(move |message: &str, pct: u8| {
                sink.lock().expect("lock").push((message.to_string(), pct));
            }))
            .capture(
                "t",
                ContainerScope::Explicit(vec![Container::new(ContainerKind::Folder, "Shared")]),
                &[EntityType::Address, EntityType::Tag],
                &repo,
            )
            .await;

        let seen = seen.lock().expect("lock");
        let messages: Vec<&str> = seen.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "folder:Shared: address",
                "folder:Shared: tag",
                "folder:Shared: complete"
            ]
        );
        assert_eq!(seen.last().map(|(_, pct)| *pct), Some(100));
    }
}
