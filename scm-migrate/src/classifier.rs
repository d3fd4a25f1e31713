//! Default Classifier: decides whether an entity is a factory/system default.
//!
//! The classifier is a pure function over an [`Entity`] and a read-only
//! [`DefaultCatalog`]. The catalog is data: the embedded
//! `catalog/defaults.toml` or a replacement file supplied by the operator.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;

use entity_fields::FieldValue;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{ContainerRef, Entity, EntityType};

/// Known default names and patterns for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub names: Vec<String>,
    /// Name patterns; `*` matches any run of characters.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// A top-level field whose value marks an entity as a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Fingerprint {
    /// Restrict to one type; `None` applies to all.
    #[serde(default, rename = "type")]
    pub entity_type: Option<EntityType>,
    pub field: String,
    pub equals: toml::Value,
}

/// Reference catalog of factory-default signatures.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct DefaultCatalog {
    #[serde(default)]
    pub reserved_prefixes: Vec<String>,
    #[serde(default, rename = "reserved_container")]
    pub reserved_containers: Vec<ContainerRef>,
    #[serde(default, rename = "entity")]
    pub entries: Vec<CatalogEntry>,
    #[serde(default, rename = "fingerprint")]
    pub fingerprints: Vec<Fingerprint>,
}

/// Errors returned when loading catalog files.
#[derive(Debug, Error)]
pub enum CatalogLoadError {
    #[error("failed to read catalog file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse catalog file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl DefaultCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_catalog(&raw, path.display().to_string())
    }

    /// Built-in catalog.
    pub fn embedded() -> Self {
        let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/catalog/defaults.toml"));
        match parse_catalog(embedded, "embedded catalog".to_string()) {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(error = %err, "embedded catalog unusable, using minimal fallback");
                fallback_catalog()
            }
        }
    }

    /// Load `path` when given, falling back to the embedded catalog with a
    /// warning if it cannot be read.
    pub fn load_or_embedded(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load(path).unwrap_or_else(|err| {
                warn!(error = %err, "falling back to embedded default catalog");
                Self::embedded()
            }),
            None => Self::embedded(),
        }
    }
}

fn parse_catalog(raw: &str, path: String) -> Result<DefaultCatalog, CatalogLoadError> {
    toml::from_str(raw).map_err(|source| CatalogLoadError::Parse { path, source })
}

fn fallback_catalog() -> DefaultCatalog {
    DefaultCatalog {
        reserved_prefixes: vec!["predefined-".to_string()],
        reserved_containers: vec![ContainerRef::snippet("predefined-snippet")],
        entries: Vec::new(),
        fingerprints: Vec::new(),
    }
}

/// Why an entity was classified as a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DefaultReason {
    ReservedContainer { container: ContainerRef },
    ReservedPrefix { prefix: String },
    KnownName,
    NamePattern { pattern: String },
    Fingerprint { field: String },
}

impl Display for DefaultReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedContainer { container } => write!(f, "reserved container {container}"),
            Self::ReservedPrefix { prefix } => write!(f, "reserved prefix '{prefix}'"),
            Self::KnownName => f.write_str("known default name"),
            Self::NamePattern { pattern } => write!(f, "matches '{pattern}'"),
            Self::Fingerprint { field } => write!(f, "default fingerprint on '{field}'"),
        }
    }
}

/// Single authority for "is this entity a default".
#[derive(Debug, Clone)]
pub struct DefaultClassifier {
    catalog: DefaultCatalog,
    /// Compiled `patterns`, one list per catalog entry.
    patterns: Vec<Vec<(String, Regex)>>,
}

impl Default for DefaultClassifier {
    fn default() -> Self {
        Self::new(DefaultCatalog::embedded())
    }
}

impl DefaultClassifier {
    pub fn new(catalog: DefaultCatalog) -> Self {
        let patterns = catalog
            .entries
            .iter()
            .map(|entry| {
                entry
                    .patterns
                    .iter()
                    .filter_map(|pattern| match compile_pattern(pattern) {
                        Ok(regex) => Some((pattern.clone(), regex)),
                        Err(err) => {
                            warn!(%pattern, error = %err, "ignoring unusable catalog pattern");
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        Self { catalog, patterns }
    }

    pub fn catalog(&self) -> &DefaultCatalog {
        &self.catalog
    }

    pub fn classify(&self, entity: &Entity) -> bool {
        self.classify_with_reason(entity).is_some()
    }

    /// First matching rule, checked in order: reserved container, reserved
    /// prefix, known name, name pattern, fingerprint.
    pub fn classify_with_reason(&self, entity: &Entity) -> Option<DefaultReason> {
        let catalog = &self.catalog;

        if let Some(container) = catalog
            .reserved_containers
            .iter()
            .find(|c| **c == entity.container)
        {
            return Some(DefaultReason::ReservedContainer {
                container: container.clone(),
            });
        }

        if let Some(prefix) = catalog
            .reserved_prefixes
            .iter()
            .find(|p| !p.is_empty() && entity.name.starts_with(p.as_str()))
        {
            return Some(DefaultReason::ReservedPrefix {
                prefix: prefix.clone(),
            });
        }

        let entries = catalog
            .entries
            .iter()
            .zip(&self.patterns)
            .filter(|(e, _)| e.entity_type == entity.entity_type);
        for (entry, patterns) in entries {
            if entry.names.iter().any(|n| *n == entity.name) {
                return Some(DefaultReason::KnownName);
            }
            if let Some((pattern, _)) = patterns.iter().find(|(_, re)| re.is_match(&entity.name)) {
                return Some(DefaultReason::NamePattern {
                    pattern: pattern.clone(),
                });
            }
        }

        catalog
            .fingerprints
            .iter()
            .filter(|fp| fp.entity_type.map_or(true, |t| t == entity.entity_type))
            .find(|fp| {
                entity
                    .fields
                    .get(&fp.field)
                    .is_some_and(|value| value_matches(value, &fp.equals))
            })
            .map(|fp| DefaultReason::Fingerprint {
                field: fp.field.clone(),
            })
    }
}

fn value_matches(value: &FieldValue, expected: &toml::Value) -> bool {
    match (value, expected) {
        (FieldValue::String(actual), toml::Value::String(wanted)) => actual == wanted,
        (FieldValue::Bool(actual), toml::Value::Boolean(wanted)) => actual == wanted,
        (FieldValue::Number(actual), toml::Value::Integer(wanted)) => actual.as_i64() == Some(*wanted),
        (FieldValue::Number(actual), toml::Value::Float(wanted)) => actual.as_f64() == Some(*wanted),
        _ => false,
    }
}

/// Anchored regex for a catalog name pattern; `*` matches any (possibly
/// empty) run of characters and everything else is literal.
fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let literal: Vec<String> = pattern.split('*').map(regex::escape).collect();
    Regex::new(&format!("(?s)^{}$", literal.join(".*")))
}
