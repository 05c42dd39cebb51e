//! Entity store abstraction.
//!
//! Dependency discovery never reads gateway configuration directly. It goes through
//! an [`EntityStore`], which resolves headers to entities and answers the reverse
//! lookups the cache needs to map a changed entity onto the entity that owns it.
//!
//! - [`EntityStore`]: lookups by header, enumeration, reverse references
//! - [`IdentityMapper`]: how an entity is identified inside a dependency graph
//! - [`in_memory`]: a thread-safe store publishing change events, loadable from a snapshot

use crate::domain::{DependentObject, Entity, EntityHeader, EntityType};
use crate::error::Result;

pub mod in_memory;

pub use in_memory::{EntitySnapshot, InMemoryEntityStore};

/// Read access to configured gateway entities.
///
/// Implementations must be `Send + Sync`: the dependency cache queries the store from
/// its build and event threads as well as from callers.
pub trait EntityStore: Send + Sync {
    /// Resolve a header to its entity.
    ///
    /// Matches by type and internal id, falling back to type and public id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::EntityNotFound`] if no entity matches.
    fn find(&self, header: &EntityHeader) -> Result<Entity>;

    /// Headers of every stored entity.
    fn find_all(&self) -> Result<Vec<EntityHeader>>;

    /// Entities of `entity_type` that reference `target`.
    fn find_referencing(
        &self,
        entity_type: EntityType,
        target: &EntityHeader,
    ) -> Result<Vec<Entity>>;
}

/// Derives the graph identity of an entity.
pub trait IdentityMapper: Send + Sync {
    /// The [`DependentObject`] standing for `entity`.
    fn to_dependent_object(&self, entity: &Entity) -> DependentObject;
}

/// Uses the guid as public id when present, else the internal id.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdentityMapper;

impl IdentityMapper for DefaultIdentityMapper {
    fn to_dependent_object(&self, entity: &Entity) -> DependentObject {
        DependentObject::new(
            entity.entity_type,
            entity.name.clone(),
            entity.guid.as_deref().unwrap_or(&entity.id),
            entity.id.clone(),
        )
    }
}
