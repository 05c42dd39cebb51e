//! In-memory entity store.
//!
//! Entities are held in a `BTreeMap` keyed by (type, internal id) behind an `RwLock`,
//! so enumeration order is stable. Every [`InMemoryEntityStore::save`] and
//! [`InMemoryEntityStore::delete`] publishes a persistence event on the attached
//! [`EventBus`] after the lock is released, so listeners may query the store.
//!
//! Stores can be seeded from a YAML or JSON snapshot file:
//!
//! ```yaml
//! entities:
//!   - type: service
//!     id: orders
//!     references:
//!       - type: policy
//!         id: orders-policy
//! ```

use super::EntityStore;
use crate::domain::{Entity, EntityHeader, EntityType};
use crate::error::{Error, Result};
use crate::events::{EntityOperation, EventBus, GatewayEvent};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tracing::debug;

type EntityKey = (EntityType, String);

/// Serialized form of a store's content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// Every entity, in any order
    #[serde(default)]
    pub entities: Vec<Entity>,
}

impl EntitySnapshot {
    /// Parse a snapshot file. Files ending in `.json` are read as JSON, anything else as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read and [`Error::Store`] if it
    /// does not parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|e| Error::Store(format!("{}: {e}", path.display())))
    }

    /// Write the snapshot in the format [`EntitySnapshot::load`] reads for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Store`] if serialization fails and [`Error::Io`] if the file
    /// cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let content = if is_json {
            serde_json::to_string_pretty(self).map_err(|e| e.to_string())
        } else {
            serde_yaml::to_string(self).map_err(|e| e.to_string())
        }
        .map_err(|e| Error::Store(format!("{}: {e}", path.display())))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Thread-safe entity store backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entities: RwLock<BTreeMap<EntityKey, Entity>>,
    events: Option<Arc<EventBus>>,
}

impl InMemoryEntityStore {
    /// Create an empty store that publishes no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `entities`, without publishing events for them.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let entities = entities
            .into_iter()
            .map(|entity| ((entity.entity_type, entity.id.clone()), entity))
            .collect();
        Self {
            entities: RwLock::new(entities),
            events: None,
        }
    }

    /// Create a store from a snapshot file.
    ///
    /// # Errors
    ///
    /// See [`EntitySnapshot::load`].
    pub fn load(path: &Path) -> Result<Self> {
        let snapshot = EntitySnapshot::load(path)?;
        debug!(
            path = %path.display(),
            entities = snapshot.entities.len(),
            "Loaded entity snapshot"
        );
        Ok(Self::from_entities(snapshot.entities))
    }

    /// Publish changes on `bus` from now on.
    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// Create or replace an entity and publish the change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the lock is poisoned.
    pub fn save(&self, entity: Entity) -> Result<EntityOperation> {
        let operation = {
            let mut entities = self.write()?;
            match entities.insert((entity.entity_type, entity.id.clone()), entity.clone()) {
                Some(_) => EntityOperation::Update,
                None => EntityOperation::Create,
            }
        };
        debug!(entity = %entity.header(), ?operation, "Saved entity");
        self.publish(&GatewayEvent::persistence(operation, entity));
        Ok(operation)
    }

    /// Remove an entity and publish the deletion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if nothing matches `header`.
    pub fn delete(&self, header: &EntityHeader) -> Result<Entity> {
        let removed = {
            let mut entities = self.write()?;
            let key = resolve_key(&entities, header)
                .ok_or_else(|| Error::EntityNotFound(header.clone()))?;
            entities
                .remove(&key)
                .ok_or_else(|| Error::EntityNotFound(header.clone()))?
        };
        debug!(entity = %removed.header(), "Deleted entity");
        self.publish(&GatewayEvent::persistence(
            EntityOperation::Delete,
            removed.clone(),
        ));
        Ok(removed)
    }

    /// Current content as a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the lock is poisoned.
    pub fn snapshot(&self) -> Result<EntitySnapshot> {
        Ok(EntitySnapshot {
            entities: self.read()?.values().cloned().collect(),
        })
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Whether the store is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn publish(&self, event: &GatewayEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<EntityKey, Entity>>> {
        self.entities
            .read()
            .map_err(|e| Error::Internal(format!("entity store lock poisoned: {e}")))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<EntityKey, Entity>>> {
        self.entities
            .write()
            .map_err(|e| Error::Internal(format!("entity store lock poisoned: {e}")))
    }
}

impl EntityStore for InMemoryEntityStore {
    fn find(&self, header: &EntityHeader) -> Result<Entity> {
        let entities = self.read()?;
        resolve_key(&entities, header)
            .and_then(|key| entities.get(&key).cloned())
            .ok_or_else(|| Error::EntityNotFound(header.clone()))
    }

    fn find_all(&self) -> Result<Vec<EntityHeader>> {
        Ok(self.read()?.values().map(Entity::header).collect())
    }

    fn find_referencing(
        &self,
        entity_type: EntityType,
        target: &EntityHeader,
    ) -> Result<Vec<Entity>> {
        Ok(self
            .read()?
            .values()
            .filter(|entity| entity.entity_type == entity_type && references(entity, target))
            .cloned()
            .collect())
    }
}

/// Key of the entity addressed by `header`: by internal id, else by public id.
fn resolve_key(entities: &BTreeMap<EntityKey, Entity>, header: &EntityHeader) -> Option<EntityKey> {
    let by_id = (header.entity_type, header.id.clone());
    if entities.contains_key(&by_id) {
        return Some(by_id);
    }
    let guid = header.guid.as_deref().unwrap_or(&header.id);
    entities
        .values()
        .find(|entity| {
            entity.entity_type == header.entity_type && entity.guid.as_deref() == Some(guid)
        })
        .map(|entity| (entity.entity_type, entity.id.clone()))
}

fn references(entity: &Entity, target: &EntityHeader) -> bool {
    entity
        .references
        .iter()
        .chain(&entity.private_keys)
        .chain(entity.assertions.iter().flat_map(|a| &a.references))
        .any(|header| header.same_entity(target))
}
