//! Declarative reference extraction rules.
//!
//! A [`ReferenceRule`] says which field of which entity type names other
//! entities, and of which types. Adding a referencing relationship is a row in
//! `rules/references.toml`, not a code change.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use entity_fields::Fields;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::model::{Entity, EntityType};

/// One row of the rule table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReferenceRule {
    pub source: EntityType,
    /// Dot-separated path into `Entity::fields`.
    pub field: String,
    pub targets: Vec<EntityType>,
    pub relation: String,
    /// Literal values at this path that are keywords, not names.
    #[serde(default)]
    pub ignore: Vec<String>,
}

impl ReferenceRule {
    pub fn path(&self) -> Vec<&str> {
        self.field.split('.').filter(|s| !s.is_empty()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ReferenceRules {
    /// Keywords ignored by every rule.
    #[serde(default)]
    pub ignore: Vec<String>,
    #[serde(default, rename = "rule")]
    pub rules: Vec<ReferenceRule>,
}

/// A name found in an entity's fields by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference<'a> {
    pub rule: &'a ReferenceRule,
    pub name: &'a str,
}

/// Errors returned when loading rule files.
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rules file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse rules file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

impl ReferenceRules {
    /// List fields whose elements are maps identified by `name`, read off
    /// rule paths such as `auto_key.ike_gateway.name`.
    pub fn named_lists(&self) -> BTreeMap<String, String> {
        self.rules
            .iter()
            .filter_map(|rule| match rule.path().as_slice() {
                [.., list, "name"] => Some((list.to_string(), "name".to_string())),
                _ => None,
            })
            .collect()
    }

    pub fn load(path: &Path) -> Result<Self, RuleLoadError> {
        let raw = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_rules(&raw, path.display().to_string())
    }

    /// Built-in rule table.
    pub fn embedded() -> Self {
        let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/rules/references.toml"));
        match parse_rules(embedded, "embedded rules".to_string()) {
            Ok(rules) if !rules.rules.is_empty() => rules,
            _ => {
                warn!("embedded reference rules unusable, using group-membership fallback");
                fallback_rules()
            }
        }
    }

    pub fn load_or_embedded(path: Option<&Path>) -> Self {
        match path {
            Some(path) => Self::load(path).unwrap_or_else(|err| {
                warn!(error = %err, "falling back to embedded reference rules");
                Self::embedded()
            }),
            None => Self::embedded(),
        }
    }

    pub fn for_type(&self, entity_type: EntityType) -> impl Iterator<Item = &ReferenceRule> {
        self.rules.iter().filter(move |r| r.source == entity_type)
    }

    fn is_keyword(&self, rule: &ReferenceRule, value: &str) -> bool {
        value.trim().is_empty()
            || self.ignore.iter().any(|k| k == value)
            || rule.ignore.iter().any(|k| k == value)
    }

    /// Every reference `entity` makes, in rule order then field order.
    pub fn extract<'a>(&'a self, entity: &'a Entity) -> Vec<Reference<'a>> {
        let mut out = Vec::new();
        for rule in self.for_type(entity.entity_type) {
            for name in entity.fields.strings_at(&rule.path()) {
                if !self.is_keyword(rule, name) {
                    out.push(Reference { rule, name });
                }
            }
        }
        out
    }
}

/// Replace `old` with `new` at every string leaf under `field`.
pub fn rewrite_reference(fields: &mut Fields, field: &str, old: &str, new: &str) -> usize {
    let path: Vec<&str> = field.split('.').filter(|s| !s.is_empty()).collect();
    fields.rewrite_strings_at(&path, &mut |value: &str| (value == old).then(|| new.to_string()))
}

fn parse_rules(raw: &str, path: String) -> Result<ReferenceRules, RuleLoadError> {
    toml::from_str(raw).map_err(|source| RuleLoadError::Parse { path, source })
}

fn fallback_rules() -> ReferenceRules {
    let member = |source, field: &str, targets: Vec<EntityType>| ReferenceRule {
        source,
        field: field.to_string(),
        targets,
        relation: "member".to_string(),
        ignore: Vec::new(),
    };
    ReferenceRules {
        ignore: vec!["any".to_string()],
        rules: vec![
            member(
                EntityType::AddressGroup,
                "static",
                vec![EntityType::Address, EntityType::AddressGroup],
            ),
            member(
                EntityType::ServiceGroup,
                "members",
                vec![EntityType::Service, EntityType::ServiceGroup],
            ),
        ],
    }
}
