//! Configuration migration between hierarchical management systems.
//!
//! This library captures typed configuration entities (addresses, services,
//! profiles, rules, and so on) from a source system, works out which entities
//! reference which, separates factory defaults from user-defined objects, and
//! pushes a selected subset into a target system in dependency order while
//! resolving name conflicts.
//!
//! # Architecture
//!
//! ## Model
//!
//! - [`model`]: Entities, containers, and `(type, name, container)` identity
//! - [`graph`]: The captured configuration graph and its metadata
//!
//! ## Pipeline
//!
//! - [`classifier`]: Catalog-driven default/user-defined classification
//! - [`capture`]: Bounded-concurrency walk of containers through a repository
//! - [`references`]: Declarative table of which fields name other entities
//! - [`dependency`]: Reference graph, cycle detection, deterministic ordering
//! - [`conflict`]: Push planning against a target snapshot
//! - [`push`]: Sequential plan execution with failure propagation
//!
//! ## Plumbing
//!
//! - [`repository`]: The repository port, a snapshot-backed implementation,
//!   and a rate-limiting/retrying decorator
//! - [`progress`]: Progress callbacks and cancellation
//! - [`config`]: `migrate.toml` engine settings
//! - [`report`]: Terminal-friendly colored output
//!
//! # Workflow
//!
//! 1. **Capture** the source into a [`graph::ConfigurationGraph`]
//! 2. **Classify** entities so defaults stay behind
//! 3. **Resolve** dependencies and order the selected subset
//! 4. **Plan** against a snapshot of the target
//! 5. **Push** the plan, or dry-run it
//!
//! # Examples
//!
//! ```ignore
//! use scm_migrate::capture::{CaptureEngine, ContainerScope};
//! use scm_migrate::classifier::DefaultClassifier;
//! use scm_migrate::model::EntityType;
//! use scm_migrate::repository::{Snapshot, SnapshotRepository};
//!
//! let source = SnapshotRepository::new(Snapshot::load("source.json".as_ref())?);
//! let graph = CaptureEngine::new(DefaultClassifier::default())
//!     .capture("source", ContainerScope::Discover, &EntityType::ALL, &source)
//!     .await;
//! println!("captured {} entities", graph.len());
//! ```
//!
//! # Built on entity-fields
//!
//! Entity payloads are `entity-fields` trees, so unknown fields survive a
//! capture and push unchanged, and conflict reports reuse its field differ.

pub mod capture;
pub mod classifier;
pub mod config;
pub mod conflict;
pub mod dependency;
pub mod graph;
pub mod model;
pub mod progress;
pub mod push;
pub mod references;
pub mod report;
pub mod repository;
