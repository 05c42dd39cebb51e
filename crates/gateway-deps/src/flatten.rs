//! Linearization of dependency graphs into a creation order.
//!
//! Search results are copied into a `petgraph` [`DiGraph`] keyed by
//! [`DependentObject`], with edges directed from dependent to dependency and added in
//! child order. Three walks over that graph then produce the output:
//!
//! 1. security zones, in the order they are first reached
//! 2. folders, in the order they are first reached
//! 3. everything else, post-order, so an object's dependencies precede it
//!
//! Zones and folders are referenced by nearly everything, which is why they are hoisted
//! ahead of the post-order walk instead of being ordered with the rest. Inside a cycle
//! no order can put every dependency first; the walk simply breaks the cycle where it
//! first re-enters it.

use crate::domain::{DependencyGraph, DependencySearchResults, DependentObject, EntityType, NodeId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, DfsPostOrder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One entry of a flattened graph: an object and only its immediate dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatDependency {
    /// The object
    pub dependent: DependentObject,

    /// Immediate dependencies, or `None` if the object was never explored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<DependentObject>>,
}

/// Flatten one or more search results into a single ordered list without duplicates.
///
/// With `include_roots`, each result's queried object is part of the graph and is
/// emitted like any other node; otherwise the walks start at the roots' dependencies.
pub fn flatten_search_results(
    results: &[DependencySearchResults],
    include_roots: bool,
) -> Vec<FlatDependency> {
    let mut flat = FlatGraph::default();
    for result in results {
        flat.add_result(result, include_roots);
    }
    flat.linearize()
}

#[derive(Default)]
struct FlatGraph {
    graph: DiGraph<DependentObject, ()>,
    node_map: HashMap<DependentObject, NodeIndex>,
    /// Immediate children per node index, `None` while unexplored
    children: Vec<Option<Vec<DependentObject>>>,
    starts: Vec<NodeIndex>,
}

impl FlatGraph {
    fn add_result(&mut self, result: &DependencySearchResults, include_roots: bool) {
        let arena = result.graph();
        let top = result.dependency_ids().unwrap_or_default();
        if include_roots {
            let root = self.node(result.dependent());
            self.starts.push(root);
            if let Some(ids) = result.dependency_ids() {
                self.record_children(root, arena, ids);
            }
        } else {
            for &id in top {
                let start = self.node(arena[id].dependent());
                self.starts.push(start);
            }
        }
        self.add_reachable(arena, top);
    }

    /// Copy every node reachable from `from` in `arena`.
    fn add_reachable(&mut self, arena: &DependencyGraph, from: &[NodeId]) {
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeId> = from.to_vec();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = &arena[id];
            let index = self.node(node.dependent());
            if let Some(ids) = node.dependencies() {
                self.record_children(index, arena, ids);
                stack.extend(ids.iter().rev());
            }
        }
    }

    fn record_children(&mut self, index: NodeIndex, arena: &DependencyGraph, ids: &[NodeId]) {
        if self.children[index.index()].is_some() {
            return;
        }
        let dependents: Vec<DependentObject> =
            ids.iter().map(|&id| arena[id].dependent().clone()).collect();
        for dependent in &dependents {
            let child = self.node(dependent);
            self.graph.add_edge(index, child, ());
        }
        self.children[index.index()] = Some(dependents);
    }

    fn node(&mut self, dependent: &DependentObject) -> NodeIndex {
        if let Some(&index) = self.node_map.get(dependent) {
            return index;
        }
        let index = self.graph.add_node(dependent.clone());
        self.node_map.insert(dependent.clone(), index);
        self.children.push(None);
        index
    }

    fn linearize(self) -> Vec<FlatDependency> {
        let mut order = Vec::with_capacity(self.graph.node_count());
        let mut emitted = HashSet::new();

        for hoisted in [EntityType::SecurityZone, EntityType::Folder] {
            let mut dfs = Dfs::empty(&self.graph);
            for &start in &self.starts {
                dfs.move_to(start);
                while let Some(index) = dfs.next(&self.graph) {
                    if self.graph[index].object_type == hoisted && emitted.insert(index) {
                        order.push(index);
                    }
                }
            }
        }

        let mut post_order = DfsPostOrder::empty(&self.graph);
        for &start in &self.starts {
            post_order.move_to(start);
            while let Some(index) = post_order.next(&self.graph) {
                if emitted.insert(index) {
                    order.push(index);
                }
            }
        }

        let FlatGraph {
            graph,
            mut children,
            ..
        } = self;
        order
            .into_iter()
            .map(|index| FlatDependency {
                dependent: graph[index].clone(),
                dependencies: children[index.index()].take(),
            })
            .collect()
    }
}
