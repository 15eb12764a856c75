//! Dependency Map
//!
//! Bidirectional adjacency store over property names. Forward edges record
//! what a formula reads; reverse edges are the transpose, kept in step on
//! every mutation.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::warn;

use super::node::Node;
use crate::error::{ReactionError, Result};

/// The dependency graph of one reactive context.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Adjacency per property name.
    nodes: IndexMap<String, Node>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the dependencies of `name` with `deps`.
    ///
    /// The cycle check runs against the graph as it stands before the call,
    /// and a rejected set leaves the graph untouched. Re-declaring the same
    /// set is idempotent.
    pub fn add_dependencies<S: AsRef<str>>(&mut self, name: &str, deps: &[S]) -> Result<()> {
        self.check_acyclic(name, deps)?;

        let previous = self
            .nodes
            .entry(name.to_string())
            .or_default()
            .take_dependencies();
        for old in &previous {
            if let Some(node) = self.nodes.get_mut(old) {
                node.remove_dependent(name);
            }
        }

        for dep in deps {
            let dep = dep.as_ref();
            self.nodes.entry(dep.to_string()).or_default().add_dependent(name);
            if let Some(node) = self.nodes.get_mut(name) {
                node.add_dependency(dep);
            }
        }
        Ok(())
    }

    /// Remove every dependency of `name`. Its dependents are kept.
    pub fn clear_dependencies(&mut self, name: &str) {
        let Some(node) = self.nodes.get_mut(name) else {
            return;
        };
        for old in node.take_dependencies() {
            if let Some(dep) = self.nodes.get_mut(&old) {
                dep.remove_dependent(name);
            }
        }
    }

    /// Fail with [`ReactionError::CycleDetected`] if giving `name` the
    /// dependencies `deps` would let `name` reach itself.
    pub fn check_acyclic<S: AsRef<str>>(&self, name: &str, deps: &[S]) -> Result<()> {
        let cycle = || {
            warn!(property = name, "rejecting cyclic dependency");
            Err(ReactionError::CycleDetected {
                name: name.to_string(),
            })
        };

        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();
        for dep in deps {
            let dep = dep.as_ref();
            if dep == name {
                return cycle();
            }
            stack.push(dep);
        }

        // Walk the existing transitive dependencies of every candidate.
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for next in self.dependencies(current) {
                if next == name {
                    return cycle();
                }
                stack.push(next);
            }
        }
        Ok(())
    }

    /// Direct dependents of `name`.
    pub fn dependents<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.dependents().iter().map(String::as_str))
    }

    /// Direct dependencies of `name`.
    pub fn dependencies<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .get(name)
            .into_iter()
            .flat_map(|node| node.dependencies().iter().map(String::as_str))
    }

    /// Get a node by name.
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Number of properties that have ever taken part in an edge.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of forward edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.dependencies().len()).sum()
    }
}
