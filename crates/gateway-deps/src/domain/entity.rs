//! Gateway entities as exchanged with the entity store.
//!
//! These types describe configured gateway objects only as far as dependency analysis
//! needs them: identity, containment (folder, security zone) and the headers of the
//! entities they reference. What a concrete entity type references is decided by
//! whoever builds the [`Entity`], not by this crate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Property holding the [`PolicyType`] of a policy entity.
pub const POLICY_TYPE_PROPERTY: &str = "policy-type";

/// Property holding the alias of a key metadata entity.
pub const KEY_ALIAS_PROPERTY: &str = "alias";

/// Property holding the keystore id of a key metadata entity.
pub const KEYSTORE_PROPERTY: &str = "keystore";

/// Type tag of a gateway object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    /// Folder in the gateway folder tree
    Folder,
    /// Security zone restricting administrative access
    SecurityZone,
    /// Published service
    Service,
    /// Policy (fragment, global, or a service's private policy)
    Policy,
    /// Historical snapshot of a policy
    PolicyVersion,
    /// Encapsulated assertion configuration
    EncapsulatedAssertion,
    /// JMS connection settings
    JmsConnection,
    /// JMS endpoint using a connection
    JmsEndpoint,
    /// JDBC connection
    JdbcConnection,
    /// Private key entry in a keystore
    KeyEntry,
    /// Metadata attached to a private key entry
    KeyMetadata,
    /// Trusted certificate
    TrustedCertificate,
    /// Stored secure password
    SecurePassword,
    /// Identity provider configuration
    IdentityProvider,
    /// Cluster-wide property
    ClusterProperty,
    /// Schema, DTD or other stored resource
    Resource,
    /// License document
    LicenseDocument,
    /// A single rule inside a policy (pseudo-object, never stored on its own)
    Assertion,
}

impl EntityType {
    /// All entity types, in declaration order.
    pub const ALL: [EntityType; 18] = [
        EntityType::Folder,
        EntityType::SecurityZone,
        EntityType::Service,
        EntityType::Policy,
        EntityType::PolicyVersion,
        EntityType::EncapsulatedAssertion,
        EntityType::JmsConnection,
        EntityType::JmsEndpoint,
        EntityType::JdbcConnection,
        EntityType::KeyEntry,
        EntityType::KeyMetadata,
        EntityType::TrustedCertificate,
        EntityType::SecurePassword,
        EntityType::IdentityProvider,
        EntityType::ClusterProperty,
        EntityType::Resource,
        EntityType::LicenseDocument,
        EntityType::Assertion,
    ];

    /// The kebab-case tag used in snapshots, options and CLI arguments.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Folder => "folder",
            EntityType::SecurityZone => "security-zone",
            EntityType::Service => "service",
            EntityType::Policy => "policy",
            EntityType::PolicyVersion => "policy-version",
            EntityType::EncapsulatedAssertion => "encapsulated-assertion",
            EntityType::JmsConnection => "jms-connection",
            EntityType::JmsEndpoint => "jms-endpoint",
            EntityType::JdbcConnection => "jdbc-connection",
            EntityType::KeyEntry => "key-entry",
            EntityType::KeyMetadata => "key-metadata",
            EntityType::TrustedCertificate => "trusted-certificate",
            EntityType::SecurePassword => "secure-password",
            EntityType::IdentityProvider => "identity-provider",
            EntityType::ClusterProperty => "cluster-property",
            EntityType::Resource => "resource",
            EntityType::LicenseDocument => "license-document",
            EntityType::Assertion => "assertion",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type '{s}'"))
    }
}

/// Type of a policy, stored in the [`POLICY_TYPE_PROPERTY`] property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyType {
    /// Reusable policy fragment
    Include,
    /// The policy owned by exactly one published service
    PrivateService,
    /// Global policy executed around every service
    Global,
    /// Internal-use policy
    Internal,
}

impl FromStr for PolicyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include" => Ok(PolicyType::Include),
            "private-service" => Ok(PolicyType::PrivateService),
            "global" => Ok(PolicyType::Global),
            "internal" => Ok(PolicyType::Internal),
            other => Err(format!("unknown policy type '{other}'")),
        }
    }
}

/// Lightweight reference to an entity in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityHeader {
    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Internal identifier, unique per type
    pub id: String,

    /// Display name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Public identifier (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
}

impl EntityHeader {
    /// Create a header from a type and internal id.
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            name: None,
            guid: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the public identifier.
    #[must_use]
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Header of the key entry stored under `alias` in `keystore`.
    pub fn key_entry(keystore: &str, alias: &str) -> Self {
        Self::new(EntityType::KeyEntry, format!("{keystore}:{alias}")).with_name(alias)
    }

    /// Whether both headers address the same stored entity (type and id).
    pub fn same_entity(&self, other: &EntityHeader) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl fmt::Display for EntityHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}:{} ({})", self.entity_type, self.id, name),
            None => write!(f, "{}:{}", self.entity_type, self.id),
        }
    }
}

impl FromStr for EntityHeader {
    type Err = String;

    /// Parse `type:id`, e.g. `policy:0a1b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (entity_type, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:ID, got '{s}'"))?;
        if id.is_empty() {
            return Err(format!("missing id in '{s}'"));
        }
        Ok(EntityHeader::new(entity_type.parse()?, id))
    }
}

/// A single rule of a policy and the entities it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    /// Assertion name, e.g. `"Route via JMS"`
    pub name: String,

    /// Entities referenced by this assertion
    #[serde(default)]
    pub references: Vec<EntityHeader>,
}

impl Assertion {
    /// Create an assertion with no references.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            references: Vec::new(),
        }
    }

    /// Add a referenced entity.
    #[must_use]
    pub fn with_reference(mut self, header: EntityHeader) -> Self {
        self.references.push(header);
        self
    }
}

/// A configured gateway object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Entity {
    /// Entity type
    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Internal identifier
    pub id: String,

    /// Public identifier (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,

    /// Display name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Id of the containing folder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,

    /// Id of the security zone
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_zone: Option<String>,

    /// Other entities this entity references directly, in declaration order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<EntityHeader>,

    /// Private keys used by this entity
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub private_keys: Vec<EntityHeader>,

    /// Policy rules (policies only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<Assertion>,

    /// Type-specific attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl Entity {
    /// Create an entity with no containment and no references.
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
            guid: None,
            name: None,
            folder: None,
            security_zone: None,
            references: Vec::new(),
            private_keys: Vec::new(),
            assertions: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the public identifier.
    #[must_use]
    pub fn with_guid(mut self, guid: impl Into<String>) -> Self {
        self.guid = Some(guid.into());
        self
    }

    /// Place the entity in a folder.
    #[must_use]
    pub fn in_folder(mut self, folder_id: impl Into<String>) -> Self {
        self.folder = Some(folder_id.into());
        self
    }

    /// Assign the entity to a security zone.
    #[must_use]
    pub fn in_zone(mut self, zone_id: impl Into<String>) -> Self {
        self.security_zone = Some(zone_id.into());
        self
    }

    /// Add a direct reference.
    #[must_use]
    pub fn with_reference(mut self, header: EntityHeader) -> Self {
        self.references.push(header);
        self
    }

    /// Add a used private key.
    #[must_use]
    pub fn with_private_key(mut self, header: EntityHeader) -> Self {
        self.private_keys.push(header);
        self
    }

    /// Append a policy rule.
    #[must_use]
    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }

    /// Set a type-specific property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Header addressing this entity, carrying its name and guid.
    pub fn header(&self) -> EntityHeader {
        EntityHeader {
            entity_type: self.entity_type,
            id: self.id.clone(),
            name: self.name.clone(),
            guid: self.guid.clone(),
        }
    }

    /// Header of the containing folder, if any.
    pub fn folder_header(&self) -> Option<EntityHeader> {
        self.folder
            .as_ref()
            .map(|id| EntityHeader::new(EntityType::Folder, id.clone()))
    }

    /// Header of the security zone, if any.
    pub fn zone_header(&self) -> Option<EntityHeader> {
        self.security_zone
            .as_ref()
            .map(|id| EntityHeader::new(EntityType::SecurityZone, id.clone()))
    }

    /// Look up a type-specific property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// The policy type, for policies that declare a recognised one.
    pub fn policy_type(&self) -> Option<PolicyType> {
        self.property(POLICY_TYPE_PROPERTY)?.parse().ok()
    }
}
