//! Live, uncached dependency discovery.
//!
//! The finder expands each root depth-first, asking the registry's processor for the
//! immediate dependencies of every entity it visits. All roots of one call share a
//! single arena and a single "seen" map keyed by [`DependentObject`], so an object
//! reached twice becomes one node with several parents. An object reached again while
//! its own expansion is still running is linked as-is; its children are filled in when
//! that outer frame finishes, which is what makes cycles terminate.

use crate::domain::{
    DependencyGraph, DependencySearchResults, DependentObject, Entity, EntityHeader, NodeId,
    SearchDepth, SearchOptions,
};
use crate::error::Result;
use crate::processor::{ProcessorContext, ProcessorRegistry, ReplacementMap};
use crate::store::{DefaultIdentityMapper, EntityStore, IdentityMapper};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Recursive dependency discovery over an entity store.
#[derive(Clone)]
pub struct DependencyFinder {
    store: Arc<dyn EntityStore>,
    registry: Arc<ProcessorRegistry>,
    mapper: Arc<dyn IdentityMapper>,
}

impl std::fmt::Debug for DependencyFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyFinder")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl DependencyFinder {
    /// Create a finder from its collaborators.
    pub fn new(
        store: Arc<dyn EntityStore>,
        registry: Arc<ProcessorRegistry>,
        mapper: Arc<dyn IdentityMapper>,
    ) -> Self {
        Self {
            store,
            registry,
            mapper,
        }
    }

    /// A finder using the default processors and identity mapper.
    pub fn with_store(store: Arc<dyn EntityStore>) -> Self {
        Self::new(
            store,
            Arc::new(ProcessorRegistry::default()),
            Arc::new(DefaultIdentityMapper),
        )
    }

    /// The store entities are resolved through.
    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Discover the dependencies of the entities behind `headers`.
    ///
    /// An empty header list means every entity in the store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::EntityNotFound`] if a header does not resolve, or
    /// the first processor failure.
    pub fn get_dependencies(
        &self,
        headers: &[EntityHeader],
        options: &SearchOptions,
    ) -> Result<Vec<DependencySearchResults>> {
        let all;
        let headers = if headers.is_empty() {
            all = self.store.find_all()?;
            &all
        } else {
            headers
        };
        let entities = headers
            .iter()
            .map(|header| self.store.find(header))
            .collect::<Result<Vec<_>>>()?;
        self.get_dependencies_from_entities(&entities, options)
    }

    /// Discover the dependencies of already-resolved entities, one result per entity.
    ///
    /// # Errors
    ///
    /// Returns the first processor failure.
    pub fn get_dependencies_from_entities(
        &self,
        entities: &[Entity],
        options: &SearchOptions,
    ) -> Result<Vec<DependencySearchResults>> {
        let started = Instant::now();
        let mut discovery = Discovery {
            finder: self,
            context: ProcessorContext {
                store: self.store.as_ref(),
                options,
            },
            graph: DependencyGraph::new(),
            seen: HashMap::new(),
        };

        let mut roots = Vec::with_capacity(entities.len());
        for entity in entities {
            let dependent = self.create_dependent_object(entity);
            let dependencies = discovery.expand_root(entity, &dependent, options.depth)?;
            roots.push((dependent, dependencies));
        }

        debug!(
            roots = entities.len(),
            nodes = discovery.graph.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Discovered dependencies"
        );

        let graph = Arc::new(discovery.graph);
        Ok(roots
            .into_iter()
            .map(|(dependent, dependencies)| {
                DependencySearchResults::new(
                    dependent,
                    dependencies,
                    Arc::clone(&graph),
                    options.clone(),
                )
            })
            .collect())
    }

    /// The graph identity of `entity`.
    pub fn create_dependent_object(&self, entity: &Entity) -> DependentObject {
        self.mapper.to_dependent_object(entity)
    }

    /// Rewrite the references of `entity` using the processor for its type.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::CannotReplaceDependencies`] if a mapping would
    /// change the type of a reference.
    pub fn replace_dependencies(
        &self,
        entity: &mut Entity,
        replacements: &ReplacementMap,
        replace_assertion_dependencies: bool,
    ) -> Result<()> {
        self.registry
            .get_processor(entity.entity_type)
            .replace_dependencies(entity, replacements, replace_assertion_dependencies)
    }
}

/// State of one discovery call.
struct Discovery<'a> {
    finder: &'a DependencyFinder,
    context: ProcessorContext<'a>,
    graph: DependencyGraph,
    seen: HashMap<DependentObject, NodeId>,
}

impl Discovery<'_> {
    fn expand_root(
        &mut self,
        entity: &Entity,
        dependent: &DependentObject,
        depth: SearchDepth,
    ) -> Result<Option<Vec<NodeId>>> {
        if depth.is_exhausted() {
            return Ok(None);
        }
        let id = self.node_for(dependent);
        if let Some(existing) = self.graph[id].dependencies() {
            return Ok(Some(existing.to_vec()));
        }
        let children = self.expand(entity, depth)?;
        self.graph.set_dependencies(id, Some(children.clone()));
        Ok(Some(children))
    }

    /// Children of `entity`, each expanded with one level less than `depth`.
    fn expand(&mut self, entity: &Entity, depth: SearchDepth) -> Result<Vec<NodeId>> {
        let immediate = self
            .finder
            .registry
            .get_processor(entity.entity_type)
            .find_dependencies(entity, &self.context)?;

        let remaining = depth.descend();
        let mut linked = HashSet::new();
        let mut children = Vec::with_capacity(immediate.len());
        for child in immediate {
            let dependent = self.finder.create_dependent_object(&child);
            if !self.context.options.accepts(dependent.object_type)
                || !linked.insert(dependent.clone())
            {
                continue;
            }
            if let Some(&id) = self.seen.get(&dependent) {
                children.push(id);
                continue;
            }
            let id = self.node_for(&dependent);
            if !remaining.is_exhausted() {
                let grandchildren = self.expand(&child, remaining)?;
                self.graph.set_dependencies(id, Some(grandchildren));
            }
            children.push(id);
        }
        Ok(children)
    }

    fn node_for(&mut self, dependent: &DependentObject) -> NodeId {
        if let Some(&id) = self.seen.get(dependent) {
            return id;
        }
        let id = self.graph.add(dependent.clone());
        self.seen.insert(dependent.clone(), id);
        id
    }
}
