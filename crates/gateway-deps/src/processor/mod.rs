//! Per-type dependency extraction.
//!
//! A [`DependencyProcessor`] knows how to list the *immediate* dependencies of one kind
//! of entity and how to rewrite its references. Processors are stateless: the store and
//! search options they need arrive in a [`ProcessorContext`] on every call. Recursion,
//! cycle handling and caching belong to the finder and the cache, never to a processor.
//!
//! The [`ProcessorRegistry`] maps entity types to processors and falls back to the
//! [`GenericDependencyProcessor`] for every type without a dedicated one.

mod generic;
mod policy;

pub use generic::GenericDependencyProcessor;
pub use policy::{PolicyDependencyProcessor, assertion_entity};

use crate::domain::{Entity, EntityHeader, EntityType, SearchOptions};
use crate::error::{Error, Result};
use crate::store::EntityStore;
use std::collections::HashMap;
use std::sync::Arc;

/// Map from a currently referenced header to the header that should replace it.
pub type ReplacementMap = HashMap<EntityHeader, EntityHeader>;

/// Collaborators available to a processor during one call.
#[derive(Clone, Copy)]
pub struct ProcessorContext<'a> {
    /// Where referenced entities are resolved
    pub store: &'a dyn EntityStore,
    /// Options of the running search
    pub options: &'a SearchOptions,
}

/// Strategy computing the immediate dependencies of one entity type.
pub trait DependencyProcessor: Send + Sync {
    /// The entities `entity` directly depends on, in a stable order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotRetrieveDependencies`] if a reference cannot be resolved
    /// for a reason other than the referenced entity being absent.
    fn find_dependencies(
        &self,
        entity: &Entity,
        context: &ProcessorContext<'_>,
    ) -> Result<Vec<Entity>>;

    /// Rewrite the references of `entity` according to `replacements`.
    ///
    /// References without a mapping are left alone. Assertion references are only
    /// rewritten when `replace_assertion_dependencies` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CannotReplaceDependencies`] if a mapping changes the type of a
    /// reference.
    fn replace_dependencies(
        &self,
        entity: &mut Entity,
        replacements: &ReplacementMap,
        replace_assertion_dependencies: bool,
    ) -> Result<()>;
}

/// Lookup of processors by entity type.
pub struct ProcessorRegistry {
    processors: HashMap<EntityType, Arc<dyn DependencyProcessor>>,
    fallback: Arc<dyn DependencyProcessor>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.processors.keys().collect();
        registered.sort();
        f.debug_struct("ProcessorRegistry")
            .field("registered", &registered)
            .finish_non_exhaustive()
    }
}

impl ProcessorRegistry {
    /// Create a registry with no dedicated processors.
    pub fn new(fallback: Arc<dyn DependencyProcessor>) -> Self {
        Self {
            processors: HashMap::new(),
            fallback,
        }
    }

    /// Register a dedicated processor for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateProcessor`] if one is already registered.
    pub fn register(
        &mut self,
        entity_type: EntityType,
        processor: Arc<dyn DependencyProcessor>,
    ) -> Result<()> {
        if self.processors.contains_key(&entity_type) {
            return Err(Error::DuplicateProcessor(entity_type));
        }
        self.processors.insert(entity_type, processor);
        Ok(())
    }

    /// The processor for `entity_type`, or the fallback.
    pub fn get_processor(&self, entity_type: EntityType) -> &dyn DependencyProcessor {
        self.processors
            .get(&entity_type)
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    /// Whether a dedicated processor is registered for `entity_type`.
    pub fn is_registered(&self, entity_type: EntityType) -> bool {
        self.processors.contains_key(&entity_type)
    }
}

impl Default for ProcessorRegistry {
    /// Generic fallback plus the policy processor.
    fn default() -> Self {
        let mut processors: HashMap<EntityType, Arc<dyn DependencyProcessor>> = HashMap::new();
        processors.insert(EntityType::Policy, Arc::new(PolicyDependencyProcessor));
        Self {
            processors,
            fallback: Arc::new(GenericDependencyProcessor),
        }
    }
}

/// Find the replacement for `header`.
///
/// Tries an exact key first, then a key of the same type with the same id, then the
/// same guid, then the same name.
pub fn find_mapped_header<'m>(
    replacements: &'m ReplacementMap,
    header: &EntityHeader,
) -> Option<&'m EntityHeader> {
    if let Some(mapped) = replacements.get(header) {
        return Some(mapped);
    }
    let entity_type = header.entity_type;
    let find = |matches: &dyn Fn(&EntityHeader) -> bool| {
        replacements
            .iter()
            .find(|(key, _)| key.entity_type == entity_type && matches(key))
            .map(|(_, mapped)| mapped)
    };
    find(&|key| key.id == header.id)
        .or_else(|| {
            let guid = header.guid.as_ref()?;
            find(&|key| key.guid.as_ref() == Some(guid))
        })
        .or_else(|| {
            let name = header.name.as_ref()?;
            find(&|key| key.name.as_ref() == Some(name))
        })
}
