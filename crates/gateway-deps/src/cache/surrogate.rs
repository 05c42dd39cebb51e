//! Stand-ins for entities that never appear in the dependency graph themselves.
//!
//! Some gateway objects are only parts of another object: a private-service policy
//! belongs to its service, a JMS connection to its endpoint, key metadata to its key
//! entry. When such a part changes, the cache has to refresh the owner instead. Other
//! types (policy versions, license documents) have no bearing on dependencies at all.
//!
//! A [`SurrogateResolver`] decides this per entity type; the [`SurrogateRegistry`]
//! holds one resolver per type and treats unregistered types as standing for
//! themselves.

use crate::domain::{
    Entity, EntityHeader, EntityType, KEY_ALIAS_PROPERTY, KEYSTORE_PROPERTY, PolicyType,
};
use crate::error::{Error, Result};
use crate::store::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;

/// What a change to an entity means for the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Surrogate {
    /// The entity is cached under its own identity
    Itself,
    /// The change does not affect any cached dependency
    Ignore,
    /// The change affects this other entity
    Replace(Entity),
    /// The entity should have an owner but none could be found
    Missing(String),
}

/// Maps a changed entity onto the entity whose cache entry must change.
pub trait SurrogateResolver: Send + Sync {
    /// Surrogate for a created or updated entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inconsistent`] if a lookup for the owner fails.
    fn on_update(&self, entity: &Entity, store: &dyn EntityStore) -> Result<Surrogate>;

    /// Surrogate for a deleted entity. Defaults to the entity itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inconsistent`] if a lookup for the owner fails.
    fn on_delete(&self, _entity: &Entity, _store: &dyn EntityStore) -> Result<Surrogate> {
        Ok(Surrogate::Itself)
    }
}

/// Resolver for types without any dependency relevance.
#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoredType;

impl SurrogateResolver for IgnoredType {
    fn on_update(&self, _entity: &Entity, _store: &dyn EntityStore) -> Result<Surrogate> {
        Ok(Surrogate::Ignore)
    }

    fn on_delete(&self, _entity: &Entity, _store: &dyn EntityStore) -> Result<Surrogate> {
        Ok(Surrogate::Ignore)
    }
}

/// A private-service policy stands for the service that owns it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServicePolicyOwner;

impl SurrogateResolver for ServicePolicyOwner {
    fn on_update(&self, policy: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        if policy.policy_type() != Some(PolicyType::PrivateService) {
            return Ok(Surrogate::Itself);
        }
        let owners = referencing(store, EntityType::Service, &policy.header())?;
        Ok(first_or_missing(owners, || {
            format!("no service owns private service policy {}", policy.header())
        }))
    }
}

/// A JMS connection stands for the endpoint using it; its deletion is ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct JmsEndpointOwner;

impl SurrogateResolver for JmsEndpointOwner {
    fn on_update(&self, connection: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        let endpoints = referencing(store, EntityType::JmsEndpoint, &connection.header())?;
        Ok(first_or_missing(endpoints, || {
            format!("no JMS endpoint uses connection {}", connection.header())
        }))
    }

    fn on_delete(&self, _connection: &Entity, _store: &dyn EntityStore) -> Result<Surrogate> {
        Ok(Surrogate::Ignore)
    }
}

/// Key metadata stands for the key entry named by its keystore and alias.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyEntryOwner;

impl KeyEntryOwner {
    fn key_entry(metadata: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        let (Some(keystore), Some(alias)) = (
            metadata.property(KEYSTORE_PROPERTY),
            metadata.property(KEY_ALIAS_PROPERTY),
        ) else {
            return Ok(Surrogate::Missing(format!(
                "key metadata {} does not name a keystore and alias",
                metadata.header()
            )));
        };
        let header = EntityHeader::key_entry(keystore, alias);
        store.find(&header).map(Surrogate::Replace).map_err(|e| {
            Error::Inconsistent(format!(
                "key entry {header} of key metadata {}: {e}",
                metadata.header()
            ))
        })
    }
}

impl SurrogateResolver for KeyEntryOwner {
    fn on_update(&self, metadata: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        Self::key_entry(metadata, store)
    }

    fn on_delete(&self, metadata: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        Self::key_entry(metadata, store)
    }
}

fn referencing(
    store: &dyn EntityStore,
    owner_type: EntityType,
    target: &EntityHeader,
) -> Result<Vec<Entity>> {
    store
        .find_referencing(owner_type, target)
        .map_err(|e| Error::Inconsistent(format!("owners of {target}: {e}")))
}

fn first_or_missing(owners: Vec<Entity>, reason: impl FnOnce() -> String) -> Surrogate {
    owners
        .into_iter()
        .next()
        .map_or_else(|| Surrogate::Missing(reason()), Surrogate::Replace)
}

/// Resolvers by entity type.
pub struct SurrogateRegistry {
    resolvers: HashMap<EntityType, Arc<dyn SurrogateResolver>>,
}

impl std::fmt::Debug for SurrogateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.resolvers.keys().collect();
        registered.sort();
        f.debug_struct("SurrogateRegistry")
            .field("registered", &registered)
            .finish()
    }
}

impl SurrogateRegistry {
    /// A registry where every type stands for itself.
    pub fn empty() -> Self {
        Self {
            resolvers: HashMap::new(),
        }
    }

    /// Set the resolver for `entity_type`, returning the one it replaces.
    pub fn register(
        &mut self,
        entity_type: EntityType,
        resolver: Arc<dyn SurrogateResolver>,
    ) -> Option<Arc<dyn SurrogateResolver>> {
        self.resolvers.insert(entity_type, resolver)
    }

    /// Surrogate for a created or updated entity.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's failure.
    pub fn on_update(&self, entity: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        match self.resolvers.get(&entity.entity_type) {
            Some(resolver) => resolver.on_update(entity, store),
            None => Ok(Surrogate::Itself),
        }
    }

    /// Surrogate for a deleted entity.
    ///
    /// # Errors
    ///
    /// Propagates the resolver's failure.
    pub fn on_delete(&self, entity: &Entity, store: &dyn EntityStore) -> Result<Surrogate> {
        match self.resolvers.get(&entity.entity_type) {
            Some(resolver) => resolver.on_delete(entity, store),
            None => Ok(Surrogate::Itself),
        }
    }
}

impl Default for SurrogateRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EntityType::PolicyVersion, Arc::new(IgnoredType));
        registry.register(EntityType::LicenseDocument, Arc::new(IgnoredType));
        registry.register(EntityType::Policy, Arc::new(ServicePolicyOwner));
        registry.register(EntityType::JmsConnection, Arc::new(JmsEndpointOwner));
        registry.register(EntityType::KeyMetadata, Arc::new(KeyEntryOwner));
        registry
    }
}
