//! Dependency tree rendering for `gwdeps dependencies` and `gwdeps usages` output.
//!
//! Search results are graphs, so a node reachable along several paths (or through a
//! cycle) is expanded only the first time it is printed; later occurrences are marked
//! as repeated.

use std::collections::HashSet;
use std::io::{self, Write};

use colored::Colorize;
use serde::Serialize;

use super::OutputConfig;
use super::color::{dimmed, format_object};
use crate::domain::{DependencyRef, DependencySearchResults, DependentObject, NodeId};

/// A node in a dependency tree for rendering purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DepTreeNode {
    /// The object at this position.
    pub dependent: DependentObject,
    /// Whether the object was already expanded higher up in the tree.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub repeated: bool,
    /// Children, or `None` when the object was not explored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<DepTreeNode>>,
}

impl DepTreeNode {
    /// Unfold a search result into a tree, expanding each graph node once.
    pub fn from_results(results: &DependencySearchResults) -> Self {
        let mut expanded = HashSet::new();
        Self {
            dependent: results.dependent().clone(),
            repeated: false,
            dependencies: results
                .dependencies()
                .map(|children| children.map(|child| Self::unfold(child, &mut expanded)).collect()),
        }
    }

    fn unfold(node: DependencyRef<'_>, expanded: &mut HashSet<NodeId>) -> Self {
        if !expanded.insert(node.id()) {
            return Self {
                dependent: node.dependent().clone(),
                repeated: true,
                dependencies: None,
            };
        }
        Self {
            dependent: node.dependent().clone(),
            repeated: false,
            dependencies: node
                .dependencies()
                .map(|children| children.map(|child| Self::unfold(child, expanded)).collect()),
        }
    }
}

/// Render a dependency tree with ASCII/Unicode connectors.
///
/// Renders a tree like:
/// ```text
/// ◆ service 'Orders' [s-1]
/// ├── folder 'Root' [f-1]
/// └── policy 'Auth' [p-1]
///     └── folder 'Root' [f-1] (see above)
/// ```
pub fn print_dep_tree<W: Write>(
    w: &mut W,
    root: &DepTreeNode,
    config: &OutputConfig,
) -> io::Result<()> {
    let root_icon = if config.use_ascii { "*" } else { "◆" };
    let root_icon_str = if config.use_colors {
        root_icon.cyan().bold().to_string()
    } else {
        root_icon.to_string()
    };
    writeln!(w, "{} {}", root_icon_str, format_object(&root.dependent, config))?;

    match &root.dependencies {
        Some(children) => print_dep_tree_children(w, children, &[], config),
        None => writeln!(w, "    {}", dimmed("(not explored)", config)),
    }
}

/// Recursively render tree children with proper connector lines.
///
/// `prefix_segments` tracks which ancestor levels still have siblings below,
/// used to draw the vertical continuation lines (`│`).
fn print_dep_tree_children<W: Write>(
    w: &mut W,
    children: &[DepTreeNode],
    prefix_segments: &[bool],
    config: &OutputConfig,
) -> io::Result<()> {
    let (branch, corner, pipe, space) = if config.use_ascii {
        ("|-- ", "`-- ", "|   ", "    ")
    } else {
        ("├── ", "└── ", "│   ", "    ")
    };

    for (i, child) in children.iter().enumerate() {
        let is_last = i == children.len() - 1;

        let mut prefix = String::new();
        for &has_more in prefix_segments {
            prefix.push_str(&dimmed(if has_more { pipe } else { space }, config));
        }
        let connector = dimmed(if is_last { corner } else { branch }, config);
        let repeated = if child.repeated {
            format!(" {}", dimmed("(see above)", config))
        } else {
            String::new()
        };

        writeln!(
            w,
            "{}{}{}{}",
            prefix,
            connector,
            format_object(&child.dependent, config),
            repeated
        )?;

        if let Some(grandchildren) = child.dependencies.as_deref().filter(|c| !c.is_empty()) {
            let mut next_segments = prefix_segments.to_vec();
            next_segments.push(!is_last);
            print_dep_tree_children(w, grandchildren, &next_segments, config)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Entity, EntityHeader, EntityType, SearchOptions};
    use crate::finder::DependencyFinder;
    use crate::store::InMemoryEntityStore;
    use std::sync::Arc;

    fn results() -> DependencySearchResults {
        let store = InMemoryEntityStore::from_entities([
            Entity::new(EntityType::Service, "s")
                .with_name("Orders")
                .in_folder("f")
                .with_reference(EntityHeader::new(EntityType::Policy, "p")),
            Entity::new(EntityType::Folder, "f").with_name("Root"),
            Entity::new(EntityType::Policy, "p")
                .with_name("Auth")
                .in_folder("f"),
        ]);
        DependencyFinder::with_store(Arc::new(store))
            .get_dependencies(
                &[EntityHeader::new(EntityType::Service, "s")],
                &SearchOptions::default(),
            )
            .unwrap()
            .remove(0)
    }

    fn render(root: &DepTreeNode, config: &OutputConfig) -> String {
        let mut buffer = Vec::new();
        print_dep_tree(&mut buffer, root, config).expect("tree rendering should succeed");
        String::from_utf8(buffer).expect("output should be valid UTF-8")
    }

    #[test]
    fn test_shared_node_is_expanded_once() {
        let tree = DepTreeNode::from_results(&results());
        let children = tree.dependencies.as_ref().unwrap();
        assert!(!children[0].repeated);
        let nested = children[1].dependencies.as_ref().unwrap();
        assert!(nested[0].repeated);
    }

    #[test]
    fn test_tree_text_unicode() {
        let config = OutputConfig::new(false, false);
        let output = render(&DepTreeNode::from_results(&results()), &config);
        assert_eq!(
            output,
            "◆ service 'Orders' [s]\n\
             ├── folder 'Root' [f]\n\
             └── policy 'Auth' [p]\n\
             \x20   └── folder 'Root' [f] (see above)\n"
        );
    }

    #[test]
    fn test_tree_text_ascii() {
        let config = OutputConfig::new(true, false);
        let output = render(&DepTreeNode::from_results(&results()), &config);
        assert!(output.starts_with("* service"));
        assert!(output.contains("|-- folder"));
        assert!(output.contains("`-- policy"));
    }

    #[test]
    fn test_unexplored_root() {
        let tree = DepTreeNode {
            dependent: DependentObject::new(EntityType::Policy, None, "p", "p"),
            repeated: false,
            dependencies: None,
        };
        let output = render(&tree, &OutputConfig::new(false, false));
        assert!(output.contains("(not explored)"));
    }

    #[test]
    fn test_json_omits_defaults() {
        let tree = DepTreeNode::from_results(&results());
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["dependent"]["internal-id"], "s");
        assert!(json["dependencies"][0].get("repeated").is_none());
        assert_eq!(json["dependencies"][1]["dependencies"][0]["repeated"], true);
    }
}
