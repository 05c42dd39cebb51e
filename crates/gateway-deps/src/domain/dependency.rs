//! Dependency graph model: identities, arena-backed nodes and search results.
//!
//! A dependency graph may contain cycles and shared subtrees, so nodes are never
//! embedded in one another. Every [`Dependency`] lives in a [`DependencyGraph`] arena
//! and refers to its children by [`NodeId`]. Two nodes with the same
//! [`DependentObject`] are the same graph node; discovery and cache filtering
//! guarantee that each object occurs at most once per arena.

use super::{EntityHeader, EntityType, SearchOptions};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

/// Value-identity descriptor of anything that can appear in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DependentObject {
    /// Type tag
    #[serde(rename = "type")]
    pub object_type: EntityType,

    /// Display name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Public identifier
    pub public_id: String,

    /// Internal identifier
    pub internal_id: String,
}

impl DependentObject {
    /// Create a descriptor.
    pub fn new(
        object_type: EntityType,
        name: Option<String>,
        public_id: impl Into<String>,
        internal_id: impl Into<String>,
    ) -> Self {
        Self {
            object_type,
            name,
            public_id: public_id.into(),
            internal_id: internal_id.into(),
        }
    }

    /// Header addressing the described entity in the store.
    pub fn to_header(&self) -> EntityHeader {
        let mut header = EntityHeader::new(self.object_type, self.internal_id.clone());
        header.name.clone_from(&self.name);
        if self.public_id != self.internal_id {
            header.guid = Some(self.public_id.clone());
        }
        header
    }
}

impl fmt::Display for DependentObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} '{}' [{}]", self.object_type, name, self.internal_id),
            None => write!(f, "{} [{}]", self.object_type, self.internal_id),
        }
    }
}

/// Handle of a node inside one [`DependencyGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A graph node: an object plus its immediate dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    dependent: DependentObject,
    dependencies: Option<Vec<NodeId>>,
}

impl Dependency {
    /// The object this node stands for.
    pub fn dependent(&self) -> &DependentObject {
        &self.dependent
    }

    /// Children, or `None` when the node has not been explored.
    pub fn dependencies(&self) -> Option<&[NodeId]> {
        self.dependencies.as_deref()
    }

    /// Whether the node's dependencies have been explored.
    pub fn is_discovered(&self) -> bool {
        self.dependencies.is_some()
    }
}

/// Arena owning the nodes of one or more dependency graphs.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Dependency>,
}

impl DependencyGraph {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an undiscovered node.
    pub fn add(&mut self, dependent: DependentObject) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Dependency {
            dependent,
            dependencies: None,
        });
        id
    }

    /// Set (or reset to undiscovered) the children of a node.
    pub fn set_dependencies(&mut self, id: NodeId, dependencies: Option<Vec<NodeId>>) {
        self.nodes[id.0].dependencies = dependencies;
    }

    /// Borrowing view of a node, for navigation.
    pub fn get(&self, id: NodeId) -> DependencyRef<'_> {
        DependencyRef { graph: self, id }
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes with their ids.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Dependency)> {
        self.nodes.iter().enumerate().map(|(i, node)| (NodeId(i), node))
    }
}

impl Index<NodeId> for DependencyGraph {
    type Output = Dependency;

    fn index(&self, id: NodeId) -> &Dependency {
        &self.nodes[id.0]
    }
}

/// Borrowed navigation handle for a node in a [`DependencyGraph`].
#[derive(Debug, Clone, Copy)]
pub struct DependencyRef<'g> {
    graph: &'g DependencyGraph,
    id: NodeId,
}

impl<'g> DependencyRef<'g> {
    /// The node's handle.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The object this node stands for.
    pub fn dependent(&self) -> &'g DependentObject {
        &self.graph[self.id].dependent
    }

    /// Children, or `None` when the node has not been explored.
    pub fn dependencies(&self) -> Option<Children<'g>> {
        self.graph[self.id]
            .dependencies
            .as_deref()
            .map(|ids| Children::new(self.graph, ids))
    }
}

/// Iterator over the children of a node.
#[derive(Debug, Clone)]
pub struct Children<'g> {
    graph: &'g DependencyGraph,
    ids: std::slice::Iter<'g, NodeId>,
}

impl<'g> Children<'g> {
    fn new(graph: &'g DependencyGraph, ids: &'g [NodeId]) -> Self {
        Self {
            graph,
            ids: ids.iter(),
        }
    }
}

impl<'g> Iterator for Children<'g> {
    type Item = DependencyRef<'g>;

    fn next(&mut self) -> Option<Self::Item> {
        self.ids.next().map(|&id| self.graph.get(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ids.size_hint()
    }
}

impl ExactSizeIterator for Children<'_> {}

/// Immutable snapshot of one dependency query.
///
/// `dependencies` is `None` when nothing was expanded (depth 0, or an object the cache
/// has not explored). Several results returned by one call may share an arena.
#[derive(Debug, Clone)]
pub struct DependencySearchResults {
    dependent: DependentObject,
    dependencies: Option<Vec<NodeId>>,
    graph: Arc<DependencyGraph>,
    options: SearchOptions,
}

impl DependencySearchResults {
    /// Create a result over an arena.
    pub fn new(
        dependent: DependentObject,
        dependencies: Option<Vec<NodeId>>,
        graph: Arc<DependencyGraph>,
        options: SearchOptions,
    ) -> Self {
        Self {
            dependent,
            dependencies,
            graph,
            options,
        }
    }

    /// A one-level result: each object becomes an undiscovered child.
    pub fn one_level(
        dependent: DependentObject,
        objects: impl IntoIterator<Item = DependentObject>,
        options: SearchOptions,
    ) -> Self {
        let mut graph = DependencyGraph::new();
        let ids = objects.into_iter().map(|object| graph.add(object)).collect();
        Self::new(dependent, Some(ids), Arc::new(graph), options)
    }

    /// The queried object.
    pub fn dependent(&self) -> &DependentObject {
        &self.dependent
    }

    /// The top-level dependencies.
    pub fn dependencies(&self) -> Option<Children<'_>> {
        self.dependencies
            .as_deref()
            .map(|ids| Children::new(&self.graph, ids))
    }

    /// Handles of the top-level dependencies.
    pub fn dependency_ids(&self) -> Option<&[NodeId]> {
        self.dependencies.as_deref()
    }

    /// The arena the handles refer to.
    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// The options the query ran with.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }
}

/// Structural equality: same queried object, same options, and isomorphic graphs
/// reachable from the top-level dependencies (child order significant).
impl PartialEq for DependencySearchResults {
    fn eq(&self, other: &Self) -> bool {
        if self.dependent != other.dependent || self.options != other.options {
            return false;
        }
        let mut matcher = GraphMatcher {
            left: &self.graph,
            right: &other.graph,
            mapping: HashMap::new(),
        };
        matcher.lists_eq(self.dependencies.as_deref(), other.dependencies.as_deref())
    }
}

impl Eq for DependencySearchResults {}

struct GraphMatcher<'a> {
    left: &'a DependencyGraph,
    right: &'a DependencyGraph,
    mapping: HashMap<NodeId, NodeId>,
}

impl GraphMatcher<'_> {
    fn lists_eq(&mut self, left: Option<&[NodeId]>, right: Option<&[NodeId]>) -> bool {
        match (left, right) {
            (None, None) => true,
            (Some(l), Some(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(&a, &b)| self.nodes_eq(a, b))
            }
            _ => false,
        }
    }

    fn nodes_eq(&mut self, left: NodeId, right: NodeId) -> bool {
        if let Some(&mapped) = self.mapping.get(&left) {
            return mapped == right;
        }
        self.mapping.insert(left, right);
        let (l, r) = (&self.left[left], &self.right[right]);
        l.dependent == r.dependent && self.lists_eq(l.dependencies(), r.dependencies())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(entity_type: EntityType, id: &str) -> DependentObject {
        DependentObject::new(entity_type, Some(id.to_uppercase()), id, id)
    }

    #[test]
    fn test_dependent_object_value_identity() {
        let a = object(EntityType::Policy, "p");
        let b = object(EntityType::Policy, "p");
        let renamed = DependentObject::new(EntityType::Policy, Some("Other".into()), "p", "p");
        assert_eq!(a, b);
        assert_ne!(a, renamed);
    }

    #[test]
    fn test_to_header_keeps_public_id_only_when_distinct() {
        let same = object(EntityType::Policy, "p");
        assert_eq!(same.to_header().guid, None);

        let distinct = DependentObject::new(EntityType::Policy, None, "guid-1", "p");
        assert_eq!(distinct.to_header().guid.as_deref(), Some("guid-1"));
    }

    #[test]
    fn test_graph_navigation() {
        let mut graph = DependencyGraph::new();
        let a = graph.add(object(EntityType::Service, "a"));
        let b = graph.add(object(EntityType::Policy, "b"));
        graph.set_dependencies(a, Some(vec![b]));

        let node = graph.get(a);
        let children: Vec<_> = node.dependencies().unwrap().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].dependent().internal_id, "b");
        assert!(children[0].dependencies().is_none());
        assert!(graph[a].is_discovered());
    }

    #[test]
    fn test_one_level_results() {
        let results = DependencySearchResults::one_level(
            object(EntityType::Policy, "p"),
            vec![object(EntityType::Service, "s1"), object(EntityType::Service, "s2")],
            SearchOptions::default(),
        );
        let ids: Vec<_> = results
            .dependencies()
            .unwrap()
            .map(|d| d.dependent().internal_id.clone())
            .collect();
        assert_eq!(ids, vec!["s1", "s2"]);
        assert!(results.dependencies().unwrap().all(|d| d.dependencies().is_none()));
    }

    #[test]
    fn test_structural_equality_ignores_arena_layout() {
        // a -> b -> a (cycle), built in two different insertion orders
        let mut left = DependencyGraph::new();
        let la = left.add(object(EntityType::Policy, "a"));
        let lb = left.add(object(EntityType::Policy, "b"));
        left.set_dependencies(la, Some(vec![lb]));
        left.set_dependencies(lb, Some(vec![la]));

        let mut right = DependencyGraph::new();
        let rb = right.add(object(EntityType::Policy, "b"));
        let ra = right.add(object(EntityType::Policy, "a"));
        right.set_dependencies(ra, Some(vec![rb]));
        right.set_dependencies(rb, Some(vec![ra]));

        let root = object(EntityType::Policy, "a");
        let l = DependencySearchResults::new(
            root.clone(),
            Some(vec![lb]),
            Arc::new(left),
            SearchOptions::default(),
        );
        let r = DependencySearchResults::new(
            root,
            Some(vec![rb]),
            Arc::new(right),
            SearchOptions::default(),
        );
        assert_eq!(l, r);
    }

    #[test]
    fn test_structural_equality_detects_undiscovered_difference() {
        let mut left = DependencyGraph::new();
        let lb = left.add(object(EntityType::Policy, "b"));
        left.set_dependencies(lb, Some(vec![]));

        let mut right = DependencyGraph::new();
        let rb = right.add(object(EntityType::Policy, "b"));

        let root = object(EntityType::Service, "s");
        let l = DependencySearchResults::new(
            root.clone(),
            Some(vec![lb]),
            Arc::new(left),
            SearchOptions::default(),
        );
        let r = DependencySearchResults::new(
            root,
            Some(vec![rb]),
            Arc::new(right),
            SearchOptions::default(),
        );
        assert_ne!(l, r);
    }
}
