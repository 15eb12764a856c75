//! Graph Nodes
//!
//! This module defines the per-property adjacency record stored in the
//! dependency graph.

use indexmap::IndexSet;

/// Adjacency of one property in the dependency graph.
///
/// Sets keep insertion order so that traversals are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Properties that this property's formula reads.
    dependencies: IndexSet<String>,

    /// Properties whose formulas read this property.
    dependents: IndexSet<String>,
}

impl Node {
    /// Create a node with no edges.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a dependency (a property that this one reads from).
    pub fn add_dependency(&mut self, name: &str) {
        if !self.dependencies.contains(name) {
            self.dependencies.insert(name.to_string());
        }
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, name: &str) {
        self.dependencies.shift_remove(name);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &IndexSet<String> {
        &self.dependencies
    }

    /// Add a dependent (a property that reads from this one).
    pub fn add_dependent(&mut self, name: &str) {
        if !self.dependents.contains(name) {
            self.dependents.insert(name.to_string());
        }
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, name: &str) {
        self.dependents.shift_remove(name);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &IndexSet<String> {
        &self.dependents
    }

    /// Drop all dependencies, returning them.
    pub fn take_dependencies(&mut self) -> IndexSet<String> {
        std::mem::take(&mut self.dependencies)
    }

    /// True when the node has no edges in either direction.
    pub fn is_isolated(&self) -> bool {
        self.dependencies.is_empty() && self.dependents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependency_management() {
        let mut node = Node::new();

        node.add_dependency("con");
        node.add_dependency("siz");
        node.add_dependency("con");

        assert!(node.dependencies().contains("con"));
        assert!(node.dependencies().contains("siz"));
        assert_eq!(node.dependencies().len(), 2);

        node.remove_dependency("con");
        assert!(!node.dependencies().contains("con"));
        assert_eq!(node.dependencies().len(), 1);
    }

    #[test]
    fn dependents_keep_insertion_order() {
        let mut node = Node::new();
        node.add_dependent("hp");
        node.add_dependent("idea");
        node.add_dependent("damageLoss");
        node.remove_dependent("idea");

        let order: Vec<&str> = node.dependents().iter().map(String::as_str).collect();
        assert_eq!(order, ["hp", "damageLoss"]);
    }

    #[test]
    fn take_dependencies_leaves_node_empty() {
        let mut node = Node::new();
        assert!(node.is_isolated());

        node.add_dependency("a");
        let taken = node.take_dependencies();
        assert_eq!(taken.len(), 1);
        assert!(node.is_isolated());
    }
}
