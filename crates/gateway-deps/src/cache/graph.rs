//! Forward graph and reverse usage index of the dependency cache.
//!
//! Nodes live in an arena and are found through the forward map. A parent refers to its
//! children by arena index, so refreshing a node in place is seen by every parent.
//!
//! Each type and internal id owns exactly one arena slot for the life of the graph:
//!
//! - Merging a new name or guid for a cached id renames the slot. Parents keep
//!   pointing at it and its users move to the new identity.
//! - Removing an object drops it from both maps but keeps the slot. Parents that still
//!   list it point at the last known state of the removed node.
//! - Merging a removed id again revives its slot, so the arena only grows with the
//!   number of distinct ids and parents that kept the reference see it again.

use crate::domain::{DependentObject, EntityType};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::trace;

/// Handle of a node in the cache arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(super) struct CacheId(usize);

#[derive(Debug, Clone)]
pub(super) struct CachedNode {
    pub(super) dependent: DependentObject,
    pub(super) dependencies: Option<Vec<CacheId>>,
}

/// The cache's graph state. Callers hold the cache's write lock while mutating it.
#[derive(Debug, Default)]
pub(super) struct CacheGraph {
    nodes: Vec<CachedNode>,
    forward: HashMap<DependentObject, CacheId>,
    usages: HashMap<DependentObject, BTreeSet<DependentObject>>,
    /// The slot of every type and internal id ever cached, removed ones included
    slots: HashMap<(EntityType, String), CacheId>,
}

impl CacheGraph {
    /// Merge an object and its immediate dependencies.
    ///
    /// Dependencies that are not cached yet are added as unexplored nodes first. The
    /// usage index is updated for every added and every dropped dependency.
    pub(super) fn merge(
        &mut self,
        dependent: &DependentObject,
        dependencies: Option<&[DependentObject]>,
    ) -> CacheId {
        let id = self.resolve(dependent);
        self.nodes[id.0].dependent = dependent.clone();
        let previous = self.nodes[id.0].dependencies.clone().unwrap_or_default();

        match dependencies {
            Some(children) => {
                let mut linked = HashSet::new();
                let mut ids = Vec::with_capacity(children.len());
                for child in children {
                    if !linked.insert(child) {
                        continue;
                    }
                    ids.push(self.resolve(child));
                }
                self.nodes[id.0].dependencies = Some(ids);
            }
            None => {
                if let Some(existing) = &mut self.nodes[id.0].dependencies {
                    existing.clear();
                }
            }
        }

        let current: Vec<DependentObject> = self.nodes[id.0]
            .dependencies
            .iter()
            .flatten()
            .map(|&child| self.nodes[child.0].dependent.clone())
            .collect();
        for child in &current {
            self.usages
                .entry(child.clone())
                .or_default()
                .insert(dependent.clone());
        }
        for old in previous {
            let old = &self.nodes[old.0].dependent;
            if current.contains(old) {
                continue;
            }
            if let Some(users) = self.usages.get_mut(old) {
                users.remove(dependent);
            }
        }
        id
    }

    /// Drop an object from the forward map and its usage set, and withdraw it as a user
    /// of its own dependencies. Returns whether it was cached.
    pub(super) fn remove(&mut self, dependent: &DependentObject) -> bool {
        self.usages.remove(dependent);
        let Some(id) = self.forward.remove(dependent) else {
            return false;
        };
        let nodes = &self.nodes;
        for &child in nodes[id.0].dependencies.iter().flatten() {
            if let Some(users) = self.usages.get_mut(&nodes[child.0].dependent) {
                users.remove(dependent);
            }
        }
        trace!(dependent = %dependent, "Removed dependent object from dependency cache");
        true
    }

    /// Remove the cached object with this type and internal id, whatever its name.
    pub(super) fn remove_by_id(&mut self, object_type: EntityType, internal_id: &str) -> bool {
        let Some(&slot) = self.slots.get(&(object_type, internal_id.to_string())) else {
            return false;
        };
        let dependent = self.nodes[slot.0].dependent.clone();
        self.remove(&dependent)
    }

    pub(super) fn clear(&mut self) {
        self.nodes.clear();
        self.forward.clear();
        self.usages.clear();
        self.slots.clear();
    }

    pub(super) fn lookup(&self, dependent: &DependentObject) -> Option<CacheId> {
        self.forward.get(dependent).copied()
    }

    pub(super) fn node(&self, id: CacheId) -> &CachedNode {
        &self.nodes[id.0]
    }

    /// Objects using `dependent`, in identity order.
    pub(super) fn usages_of(&self, dependent: &DependentObject) -> Option<&BTreeSet<DependentObject>> {
        self.usages.get(dependent)
    }

    /// Number of cached objects.
    pub(super) fn len(&self) -> usize {
        self.forward.len()
    }

    /// The slot `dependent` lives in, renaming, reviving or allocating it as needed.
    ///
    /// A renamed or revived slot keeps its dependencies; a new one starts unexplored.
    fn resolve(&mut self, dependent: &DependentObject) -> CacheId {
        if let Some(&id) = self.forward.get(dependent) {
            return id;
        }
        let key = (dependent.object_type, dependent.internal_id.clone());
        let Some(&id) = self.slots.get(&key) else {
            let id = CacheId(self.nodes.len());
            self.nodes.push(CachedNode {
                dependent: dependent.clone(),
                dependencies: None,
            });
            self.forward.insert(dependent.clone(), id);
            self.slots.insert(key, id);
            return id;
        };

        let old = self.nodes[id.0].dependent.clone();
        if self.forward.get(&old) == Some(&id) {
            self.rename(id, &old, dependent);
        } else {
            self.revive(id, dependent);
        }
        id
    }

    /// Move a live slot from `old` to `new`, carrying its users along.
    fn rename(&mut self, id: CacheId, old: &DependentObject, new: &DependentObject) {
        self.forward.remove(old);
        self.forward.insert(new.clone(), id);
        self.nodes[id.0].dependent = new.clone();
        if let Some(users) = self.usages.remove(old) {
            self.usages.entry(new.clone()).or_default().extend(users);
        }
        let nodes = &self.nodes;
        for &child in nodes[id.0].dependencies.iter().flatten() {
            if let Some(users) = self.usages.get_mut(&nodes[child.0].dependent) {
                if users.remove(old) {
                    users.insert(new.clone());
                }
            }
        }
        trace!(from = %old, to = %new, "Renamed object in dependency cache");
    }

    /// Bring a removed slot back as `dependent`, unexplored, used again by every cached
    /// object that still lists it.
    fn revive(&mut self, id: CacheId, dependent: &DependentObject) {
        self.nodes[id.0] = CachedNode {
            dependent: dependent.clone(),
            dependencies: None,
        };
        self.forward.insert(dependent.clone(), id);
        let users: BTreeSet<DependentObject> = self
            .forward
            .iter()
            .filter(|&(_, &parent)| {
                self.nodes[parent.0]
                    .dependencies
                    .as_ref()
                    .is_some_and(|children| children.contains(&id))
            })
            .map(|(parent, _)| parent.clone())
            .collect();
        if !users.is_empty() {
            self.usages.entry(dependent.clone()).or_default().extend(users);
        }
        trace!(dependent = %dependent, "Revived object in dependency cache");
    }

    #[cfg(test)]
    fn dependencies_of(&self, dependent: &DependentObject) -> Option<Vec<DependentObject>> {
        let id = self.lookup(dependent)?;
        self.node(id).dependencies.as_ref().map(|children| {
            children
                .iter()
                .map(|&child| self.node(child).dependent.clone())
                .collect()
        })
    }

    /// Every (user, used) pair in the forward map, skipping references to removed nodes.
    #[cfg(test)]
    fn forward_edges(&self) -> BTreeSet<(DependentObject, DependentObject)> {
        self.forward
            .iter()
            .flat_map(|(parent, &id)| {
                self.node(id)
                    .dependencies
                    .iter()
                    .flatten()
                    .filter(|&&child| self.lookup(&self.node(child).dependent) == Some(child))
                    .map(move |&child| (parent.clone(), self.node(child).dependent.clone()))
            })
            .collect()
    }

    /// Every (user, used) pair recorded in the usage index.
    #[cfg(test)]
    fn reverse_edges(&self) -> BTreeSet<(DependentObject, DependentObject)> {
        self.usages
            .iter()
            .flat_map(|(child, users)| users.iter().map(move |user| (user.clone(), child.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn object(id: &str) -> DependentObject {
        DependentObject::new(EntityType::Policy, None, id, id)
    }

    fn users(graph: &CacheGraph, id: &str) -> Vec<String> {
        graph
            .usages_of(&object(id))
            .map(|set| set.iter().map(|d| d.internal_id.clone()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_merge_inserts_missing_children_as_unexplored() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependencies_of(&object("a")), Some(vec![object("b")]));
        assert_eq!(graph.dependencies_of(&object("b")), None);
        assert_eq!(users(&graph, "b"), vec!["a"]);
    }

    #[test]
    fn test_refresh_in_place_is_seen_by_parents() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));
        graph.merge(&object("b"), Some(&[object("c")]));

        let a = graph.lookup(&object("a")).unwrap();
        let b = graph.node(a).dependencies.as_ref().unwrap()[0];
        let c = graph.node(b).dependencies.as_ref().unwrap()[0];
        assert_eq!(graph.node(c).dependent, object("c"));
    }

    #[test]
    fn test_dropped_child_loses_parent_usage() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b"), object("c")]));
        graph.merge(&object("x"), Some(&[object("b")]));
        graph.merge(&object("a"), Some(&[object("c")]));

        assert_eq!(users(&graph, "b"), vec!["x"]);
        assert_eq!(users(&graph, "c"), vec!["a"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut once = CacheGraph::default();
        once.merge(&object("a"), Some(&[object("b"), object("c")]));

        let mut twice = CacheGraph::default();
        twice.merge(&object("a"), Some(&[object("b"), object("c")]));
        twice.merge(&object("a"), Some(&[object("b"), object("c")]));

        assert_eq!(once.len(), twice.len());
        assert_eq!(once.forward_edges(), twice.forward_edges());
        assert_eq!(once.reverse_edges(), twice.reverse_edges());
    }

    #[test]
    fn test_remove_keeps_stale_parent_reference() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));

        assert!(graph.remove(&object("b")));
        assert!(graph.lookup(&object("b")).is_none());
        assert!(graph.usages_of(&object("b")).is_none());
        // the parent is not pruned
        assert_eq!(graph.dependencies_of(&object("a")), Some(vec![object("b")]));
    }

    #[test]
    fn test_remove_withdraws_usages_of_removed_object() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));
        graph.merge(&object("x"), Some(&[object("b")]));

        graph.remove(&object("a"));
        assert_eq!(users(&graph, "b"), vec!["x"]);
    }

    #[test]
    fn test_remove_by_id_matches_type_and_internal_id() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[]));
        graph.merge(
            &DependentObject::new(EntityType::Folder, None, "a", "a"),
            Some(&[]),
        );

        assert!(graph.remove_by_id(EntityType::Policy, "a"));
        assert_eq!(graph.len(), 1);
        assert!(!graph.remove_by_id(EntityType::Policy, "a"));
    }

    fn named(id: &str, name: &str) -> DependentObject {
        DependentObject::new(EntityType::Policy, Some(name.to_string()), id, id)
    }

    #[test]
    fn test_rename_moves_slot_and_usages() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("x"), Some(&[named("p", "Old")]));
        let slot = graph.merge(&named("p", "Old"), Some(&[object("c")]));

        assert_eq!(graph.merge(&named("p", "New"), Some(&[object("c")])), slot);
        assert_eq!(graph.len(), 3);
        assert!(graph.lookup(&named("p", "Old")).is_none());
        assert_eq!(graph.dependencies_of(&object("x")), Some(vec![named("p", "New")]));

        let users_of_p: Vec<_> = graph.usages_of(&named("p", "New")).into_iter().flatten().collect();
        assert_eq!(users_of_p, vec![&object("x")]);
        assert!(graph.usages_of(&named("p", "Old")).is_none());

        let users_of_c: Vec<_> = graph.usages_of(&object("c")).into_iter().flatten().collect();
        assert_eq!(users_of_c, vec![&named("p", "New")]);
    }

    #[test]
    fn test_rename_of_child_keeps_its_dependencies() {
        let mut graph = CacheGraph::default();
        graph.merge(&named("p", "Old"), Some(&[object("c")]));
        graph.merge(&object("x"), Some(&[named("p", "New")]));

        assert_eq!(graph.dependencies_of(&named("p", "New")), Some(vec![object("c")]));
        let users_of_c: Vec<_> = graph.usages_of(&object("c")).into_iter().flatten().collect();
        assert_eq!(users_of_c, vec![&named("p", "New")]);
    }

    #[test]
    fn test_remove_by_id_finds_renamed_object() {
        let mut graph = CacheGraph::default();
        graph.merge(&named("p", "Old"), Some(&[]));
        graph.merge(&named("p", "New"), Some(&[]));

        assert!(graph.remove_by_id(EntityType::Policy, "p"));
        assert_eq!(graph.len(), 0);
    }

    #[test]
    fn test_recreate_reuses_slot_and_restores_usages() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));
        let slot = graph.merge(&object("b"), Some(&[object("c")]));
        graph.remove(&object("b"));
        assert!(users(&graph, "c").is_empty());

        assert_eq!(graph.merge(&object("b"), Some(&[])), slot);
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(users(&graph, "b"), vec!["a"]);
        assert_eq!(graph.dependencies_of(&object("b")), Some(vec![]));
        assert!(users(&graph, "c").is_empty());
    }

    #[test]
    fn test_unexplored_merge_clears_explored_children() {
        let mut graph = CacheGraph::default();
        graph.merge(&object("a"), Some(&[object("b")]));
        graph.merge(&object("a"), None);

        assert_eq!(graph.dependencies_of(&object("a")), Some(vec![]));
        assert!(users(&graph, "b").is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Merge(usize, Vec<usize>),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => (0..6usize, prop::collection::vec(0..6usize, 0..4)).prop_map(|(p, c)| Op::Merge(p, c)),
            1 => (0..6usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_usage_index_mirrors_forward_graph(ops in prop::collection::vec(op(), 1..40)) {
            let mut graph = CacheGraph::default();
            for op in ops {
                match op {
                    Op::Merge(parent, children) => {
                        let children: Vec<_> =
                            children.iter().map(|c| object(&c.to_string())).collect();
                        graph.merge(&object(&parent.to_string()), Some(&children));
                    }
                    Op::Remove(id) => {
                        graph.remove(&object(&id.to_string()));
                    }
                }
            }

            prop_assert_eq!(graph.forward_edges(), graph.reverse_edges());
        }
    }
}
