//! Copying cached subgraphs into per-query result arenas.
//!
//! The cache always holds the complete, unbounded graph. A query wants at most `depth`
//! levels of it, restricted to some entity types, so every query copies the reachable
//! part into a fresh [`DependencyGraph`]. The copy follows the same rules as live
//! discovery: one node per object across all roots, first encounter wins, children
//! outside the type filter are skipped rather than traversed. A query answered from
//! the cache is therefore shaped exactly like the same query run live.

use super::graph::{CacheGraph, CacheId, CachedNode};
use crate::domain::{
    DependencyGraph, DependencySearchResults, DependentObject, NodeId, SearchDepth, SearchOptions,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One result per root, sharing one arena.
pub(super) fn filter_cached(
    cache: &CacheGraph,
    roots: &[DependentObject],
    options: &SearchOptions,
) -> Vec<DependencySearchResults> {
    let mut filter = Filter {
        cache,
        options,
        graph: DependencyGraph::new(),
        filtered: HashMap::new(),
    };
    let dependencies: Vec<_> = roots
        .iter()
        .map(|root| filter.copy_root(root, options.depth))
        .collect();

    let graph = Arc::new(filter.graph);
    roots
        .iter()
        .cloned()
        .zip(dependencies)
        .map(|(root, dependencies)| {
            DependencySearchResults::new(root, dependencies, Arc::clone(&graph), options.clone())
        })
        .collect()
}

struct Filter<'a> {
    cache: &'a CacheGraph,
    options: &'a SearchOptions,
    graph: DependencyGraph,
    /// Objects already copied during this query
    filtered: HashMap<DependentObject, NodeId>,
}

impl<'a> Filter<'a> {
    fn copy_root(&mut self, root: &DependentObject, depth: SearchDepth) -> Option<Vec<NodeId>> {
        if depth.is_exhausted() {
            return None;
        }
        let id = self.node_for(root);
        if let Some(existing) = self.graph[id].dependencies() {
            return Some(existing.to_vec());
        }
        let cached = self.cached(root)?;
        let children = self.copy_children(cached.dependencies.as_deref()?, depth);
        self.graph.set_dependencies(id, Some(children.clone()));
        Some(children)
    }

    fn copy_children(&mut self, cached: &'a [CacheId], depth: SearchDepth) -> Vec<NodeId> {
        let remaining = depth.descend();
        let mut linked = HashSet::new();
        let mut children = Vec::with_capacity(cached.len());
        let cache = self.cache;
        for &child in cached {
            // a child removed since its parent was merged is read through the forward
            // map if it was cached again, else as it was last seen
            let stale = cache.node(child);
            let node = self.cached(&stale.dependent).unwrap_or(stale);
            let dependent = &node.dependent;
            if !self.options.accepts(dependent.object_type) || !linked.insert(dependent) {
                continue;
            }
            if let Some(&id) = self.filtered.get(dependent) {
                children.push(id);
                continue;
            }
            let id = self.node_for(dependent);
            if !remaining.is_exhausted() {
                if let Some(grandchildren) = node.dependencies.as_deref() {
                    let grandchildren = self.copy_children(grandchildren, remaining);
                    self.graph.set_dependencies(id, Some(grandchildren));
                }
            }
            children.push(id);
        }
        children
    }

    fn cached(&self, dependent: &DependentObject) -> Option<&'a CachedNode> {
        let cache = self.cache;
        cache.lookup(dependent).map(|id| cache.node(id))
    }

    fn node_for(&mut self, dependent: &DependentObject) -> NodeId {
        if let Some(&id) = self.filtered.get(dependent) {
            return id;
        }
        let id = self.graph.add(dependent.clone());
        self.filtered.insert(dependent.clone(), id);
        id
    }
}
