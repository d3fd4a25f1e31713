//! Entity model: typed configuration objects and the containers that hold them.
//!
//! Repositories exchange *records*: the raw ordered field tree of one object.
//! A record becomes an [`Entity`] once its interpreted keys (`id`, `name`, and
//! exactly one of `folder` / `snippet` / `device`) are lifted out. Every other
//! key stays in [`Entity::fields`] untouched, so nothing the current type
//! mapping does not anticipate is lost.

use std::cmp::Ordering;
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use entity_fields::{FieldValue, Fields};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Record keys that carry the owning container.
pub const CONTAINER_KEYS: [&str; 3] = ["folder", "snippet", "device"];

/// Enumerated configuration object kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Tag,
    Address,
    AddressGroup,
    Service,
    ServiceGroup,
    Application,
    ApplicationGroup,
    ApplicationFilter,
    Schedule,
    ExternalDynamicList,
    UrlCategory,
    HipObject,
    HipProfile,
    Region,
    LogForwardingProfile,
    AntiSpywareProfile,
    VulnerabilityProfile,
    WildfireProfile,
    UrlAccessProfile,
    FileBlockingProfile,
    DnsSecurityProfile,
    DecryptionProfile,
    SecurityProfileGroup,
    IkeCryptoProfile,
    IpsecCryptoProfile,
    IkeGateway,
    IpsecTunnel,
    SecurityRule,
    NatRule,
    DecryptionRule,
}

impl EntityType {
    pub const ALL: [EntityType; 30] = [
        Self::Tag,
        Self::Address,
        Self::AddressGroup,
        Self::Service,
        Self::ServiceGroup,
        Self::Application,
        Self::ApplicationGroup,
        Self::ApplicationFilter,
        Self::Schedule,
        Self::ExternalDynamicList,
        Self::UrlCategory,
        Self::HipObject,
        Self::HipProfile,
        Self::Region,
        Self::LogForwardingProfile,
        Self::AntiSpywareProfile,
        Self::VulnerabilityProfile,
        Self::WildfireProfile,
        Self::UrlAccessProfile,
        Self::FileBlockingProfile,
        Self::DnsSecurityProfile,
        Self::DecryptionProfile,
        Self::SecurityProfileGroup,
        Self::IkeCryptoProfile,
        Self::IpsecCryptoProfile,
        Self::IkeGateway,
        Self::IpsecTunnel,
        Self::SecurityRule,
        Self::NatRule,
        Self::DecryptionRule,
    ];

    /// Wire name of the type (`address-group`, `ike-crypto-profile`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tag => "tag",
            Self::Address => "address",
            Self::AddressGroup => "address-group",
            Self::Service => "service",
            Self::ServiceGroup => "service-group",
            Self::Application => "application",
            Self::ApplicationGroup => "application-group",
            Self::ApplicationFilter => "application-filter",
            Self::Schedule => "schedule",
            Self::ExternalDynamicList => "external-dynamic-list",
            Self::UrlCategory => "url-category",
            Self::HipObject => "hip-object",
            Self::HipProfile => "hip-profile",
            Self::Region => "region",
            Self::LogForwardingProfile => "log-forwarding-profile",
            Self::AntiSpywareProfile => "anti-spyware-profile",
            Self::VulnerabilityProfile => "vulnerability-profile",
            Self::WildfireProfile => "wildfire-profile",
            Self::UrlAccessProfile => "url-access-profile",
            Self::FileBlockingProfile => "file-blocking-profile",
            Self::DnsSecurityProfile => "dns-security-profile",
            Self::DecryptionProfile => "decryption-profile",
            Self::SecurityProfileGroup => "security-profile-group",
            Self::IkeCryptoProfile => "ike-crypto-profile",
            Self::IpsecCryptoProfile => "ipsec-crypto-profile",
            Self::IkeGateway => "ike-gateway",
            Self::IpsecTunnel => "ipsec-tunnel",
            Self::SecurityRule => "security-rule",
            Self::NatRule => "nat-rule",
            Self::DecryptionRule => "decryption-rule",
        }
    }
}

// Ordering is lexical on the wire name so tie-breaks read naturally in reports.
impl Ord for EntityType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for EntityType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity type '{0}'")]
pub struct UnknownEntityType(pub String);

impl FromStr for EntityType {
    type Err = UnknownEntityType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| UnknownEntityType(s.to_string()))
    }
}

/// Scope kind an entity lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    Folder,
    Snippet,
    Device,
}

impl ContainerKind {
    /// Record key that names a container of this kind.
    pub fn record_key(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Snippet => "snippet",
            Self::Device => "device",
        }
    }

    fn from_record_key(key: &str) -> Option<Self> {
        match key {
            "folder" => Some(Self::Folder),
            "snippet" => Some(Self::Snippet),
            "device" => Some(Self::Device),
            _ => None,
        }
    }
}

impl Display for ContainerKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.record_key())
    }
}

/// Name + kind reference to a container.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    pub name: String,
    pub kind: ContainerKind,
}

impl ContainerRef {
    pub fn new(kind: ContainerKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self::new(ContainerKind::Folder, name)
    }

    pub fn snippet(name: impl Into<String>) -> Self {
        Self::new(ContainerKind::Snippet, name)
    }
}

impl Display for ContainerRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// A named scope discovered during capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub kind: ContainerKind,
    /// `/`-separated locator, ancestors first, ending with this container.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Container {
    pub fn new(kind: ContainerKind, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn reference(&self) -> ContainerRef {
        ContainerRef::new(self.kind, self.name.clone())
    }

    /// Ancestor folder names from the path, nearest first.
    pub fn ancestors(&self) -> Vec<&str> {
        let Some(path) = self.path.as_deref() else {
            return Vec::new();
        };
        let mut segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if segments.last() == Some(&self.name.as_str()) {
            segments.pop();
        }
        segments.reverse();
        segments
    }
}

/// Identity of an entity: `(type, name, container)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub entity_type: EntityType,
    pub name: String,
    pub container: ContainerRef,
}

impl EntityKey {
    pub fn new(entity_type: EntityType, name: impl Into<String>, container: ContainerRef) -> Self {
        Self {
            entity_type,
            name: name.into(),
            container,
        }
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.entity_type, self.name, self.container)
    }
}

/// Errors from parsing `<type>:<name>@<container>` keys.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("expected <type>:<name>@<container>, got '{0}'")]
    Shape(String),
    #[error(transparent)]
    Type(#[from] UnknownEntityType),
}

impl FromStr for EntityKey {
    type Err = KeyParseError;

    /// Parse `address:web@Shared` (folder implied) or `address:web@snippet:base`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let shape = || KeyParseError::Shape(s.to_string());
        let (type_part, rest) = s.split_once(':').ok_or_else(shape)?;
        let (name, container) = rest.rsplit_once('@').ok_or_else(shape)?;
        if name.is_empty() || container.is_empty() {
            return Err(shape());
        }
        let container = match container.split_once(':') {
            Some((kind, cname)) => match ContainerKind::from_record_key(kind) {
                Some(kind) => ContainerRef::new(kind, cname),
                None => ContainerRef::folder(container),
            },
            None => ContainerRef::folder(container),
        };
        Ok(EntityKey::new(type_part.parse()?, name, container))
    }
}

/// A record that cannot become an [`Entity`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum InvariantViolation {
    #[error("record has no usable name")]
    MissingName,
    #[error("'{name}' has no folder, snippet, or device")]
    NoContainer { name: String },
    #[error("'{name}' belongs to more than one container: {}", list_refs(.containers))]
    MultipleContainers {
        name: String,
        containers: Vec<ContainerRef>,
    },
}

fn list_refs(refs: &[ContainerRef]) -> String {
    refs.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single configuration object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub container: ContainerRef,
    pub fields: Fields,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl Entity {
    pub fn new(entity_type: EntityType, name: impl Into<String>, container: ContainerRef) -> Self {
        Self {
            entity_type,
            name: name.into(),
            container,
            fields: Fields::new(),
            is_default: false,
            source_id: None,
        }
    }

    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.entity_type, self.name.clone(), self.container.clone())
    }

    /// Lift interpreted keys out of a raw record.
    ///
    /// Exactly one non-empty container key must be present; anything else is
    /// an [`InvariantViolation`] and no entity is produced.
    pub fn from_record(
        entity_type: EntityType,
        mut record: Fields,
    ) -> Result<Self, InvariantViolation> {
        let name = record
            .get_text(&["name"])
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(ToOwned::to_owned)
            .ok_or(InvariantViolation::MissingName)?;

        let mut containers: Vec<ContainerRef> = CONTAINER_KEYS
            .into_iter()
            .filter_map(|key| {
                let value = record.get_text(&[key])?.trim();
                if value.is_empty() {
                    return None;
                }
                let kind = ContainerKind::from_record_key(key)?;
                Some(ContainerRef::new(kind, value))
            })
            .collect();

        if containers.len() > 1 {
            return Err(InvariantViolation::MultipleContainers { name, containers });
        }
        let Some(container) = containers.pop() else {
            return Err(InvariantViolation::NoContainer { name });
        };

        let source_id = match record.remove("id") {
            Some(FieldValue::String(id)) if !id.trim().is_empty() => Some(id),
            Some(FieldValue::Number(id)) => Some(id.to_string()),
            _ => None,
        };
        record.remove("name");
        for key in CONTAINER_KEYS {
            record.remove(key);
        }

        Ok(Self {
            entity_type,
            name,
            container,
            fields: record,
            is_default: false,
            source_id,
        })
    }

    /// Reassemble a record for a repository write. The origin `id` is never
    /// sent; the target assigns its own.
    pub fn to_record(&self) -> Fields {
        let mut record = Fields::new();
        record.insert("name", self.name.clone());
        record.insert(self.container.kind.record_key(), self.container.name.clone());
        for (key, value) in self.fields.iter() {
            record.insert(key, value.clone());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use entity_fields::parse;

    use super::*;

    #[test]
    fn from_record_lifts_interpreted_keys_and_keeps_the_rest() {
        let record = parse(
            br#"{"id": "abc-1", "name": "web", "folder": "Shared",
                 "ip_netmask": "10.0.0.1/32", "x_custom": {"keep": true}}"#,
        )
        .expect("parse");
        let entity = Entity::from_record(EntityType::Address, record).expect("valid record");

        assert_eq!(entity.name, "web");
        assert_eq!(entity.container, ContainerRef::folder("Shared"));
        assert_eq!(entity.source_id.as_deref(), Some("abc-1"));
        let keys: Vec<&str> = entity.fields.keys().collect();
        assert_eq!(keys, vec!["ip_netmask", "x_custom"]);
    }

    #[test]
    fn rejects_records_with_both_folder_and_snippet() {
        let record = parse(
            br#"{"name": "best-practice", "folder": "All", "snippet": "predefined-snippet"}"#,
        )
        .expect("parse");
        let err = Entity::from_record(EntityType::AntiSpywareProfile, record).expect_err("invalid");
        assert!(matches!(
            err,
            InvariantViolation::MultipleContainers { ref containers, .. } if containers.len() == 2
        ));
    }

    #[test]
    fn rejects_records_without_container() {
        let record = parse(br#"{"name": "orphan", "folder": "  "}"#).expect("parse");
        assert_eq!(
            Entity::from_record(EntityType::Tag, record),
            Err(InvariantViolation::NoContainer {
                name: "orphan".to_string()
            })
        );
    }

    #[test]
    fn to_record_round_trips_through_from_record() {
        let record =
            parse(br#"{"name": "svc", "snippet": "base", "protocol": {"tcp": {"port": "443"}}}"#)
                .expect("parse");
        let entity = Entity::from_record(EntityType::Service, record.clone()).expect("valid");
        assert_eq!(entity.to_record(), record);
    }

    #[test]
    fn entity_key_parses_with_default_folder() {
        let key: EntityKey = "address-group:G@Shared".parse().expect("key");
        assert_eq!(key.entity_type, EntityType::AddressGroup);
        assert_eq!(key.container, ContainerRef::folder("Shared"));

        let key: EntityKey = "tag:prod@snippet:base".parse().expect("key");
        assert_eq!(key.container, ContainerRef::snippet("base"));
        assert!("address-web".parse::<EntityKey>().is_err());
    }

    #[test]
    fn container_ancestors_are_nearest_first() {
        let container = Container::new(ContainerKind::Folder, "Texas").with_path("All/Shared/Texas");
        assert_eq!(container.ancestors(), vec!["Shared", "All"]);
    }

    #[test]
    fn entity_type_ordering_is_lexical() {
        assert!(EntityType::Address < EntityType::AddressGroup);
        assert!(EntityType::SecurityRule > EntityType::NatRule);
        assert_eq!("ike_gateway".parse::<EntityType>(), Ok(EntityType::IkeGateway));
    }
}
