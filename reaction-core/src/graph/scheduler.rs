//! Update Scheduler
//!
//! The scheduler determines the order in which formula properties are
//! recomputed after a property changes. It ensures that dependencies are
//! always recomputed before their dependents.
//!
//! # Algorithm
//!
//! 1. Starting from the changed property, collect every transitive dependent
//!    with a breadth-first walk over reverse edges.
//! 2. Sort the collected set topologically (dependencies before dependents),
//!    counting only edges inside the set.
//! 3. The caller recomputes each property once, in that order.
//!
//! Because every property in the set is visited once after all of its
//! affected inputs, a property reachable through several paths is not
//! recomputed repeatedly, and the walk needs no native recursion however long
//! the dependency chain is.

use std::collections::{HashMap, HashSet, VecDeque};

use super::dependency_map::DependencyGraph;

/// Plans recomputation cascades over a dependency graph.
pub struct UpdateScheduler<'g> {
    graph: &'g DependencyGraph,
}

impl<'g> UpdateScheduler<'g> {
    /// Create a scheduler over `graph`.
    pub fn new(graph: &'g DependencyGraph) -> Self {
        Self { graph }
    }

    /// Mark `source` as changed.
    ///
    /// Returns the transitive dependents of `source`, excluding `source`
    /// itself, in the order they must be recomputed.
    pub fn mark_changed(&self, source: &str) -> Vec<&'g str> {
        let mut affected = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: VecDeque<&'g str> = self.graph.dependents(source).collect();

        // BFS to collect everything downstream
        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) {
                continue;
            }
            affected.push(name);
            queue.extend(self.graph.dependents(name));
        }

        // Sort topologically so dependencies are processed first
        self.topological_sort(affected)
    }

    /// Perform a topological sort of the given properties.
    ///
    /// Returns properties in order such that dependencies come before
    /// dependents.
    fn topological_sort(&self, names: Vec<&'g str>) -> Vec<&'g str> {
        let name_set: HashSet<&str> = names.iter().copied().collect();
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut result = Vec::with_capacity(names.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the set)
        for &name in &names {
            let degree = self
                .graph
                .dependencies(name)
                .filter(|d| name_set.contains(d))
                .count();
            in_degree.insert(name, degree);
            if degree == 0 {
                queue.push_back(name);
            }
        }

        // Kahn's algorithm
        while let Some(name) = queue.pop_front() {
            result.push(name);

            for dependent in self.graph.dependents(name) {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(order: &[&str], name: &str) -> usize {
        order.iter().position(|n| *n == name).unwrap()
    }

    #[test]
    fn mark_changed_propagates() {
        let mut graph = DependencyGraph::new();

        // Create a chain: siz -> hp -> damageLoss
        graph.add_dependencies("hp", &["con", "siz"]).unwrap();
        graph.add_dependencies("damageLoss", &["hp"]).unwrap();

        let order = UpdateScheduler::new(&graph).mark_changed("siz");

        // Both derived properties should be scheduled, in chain order
        assert_eq!(order, ["hp", "damageLoss"]);
    }

    #[test]
    fn source_without_dependents_schedules_nothing() {
        let mut graph = DependencyGraph::new();
        graph.add_dependencies("hp", &["con"]).unwrap();

        assert!(UpdateScheduler::new(&graph).mark_changed("hp").is_empty());
        assert!(UpdateScheduler::new(&graph).mark_changed("unknown").is_empty());
    }

    #[test]
    fn diamond_is_scheduled_once_per_property() {
        let mut graph = DependencyGraph::new();
        graph.add_dependencies("left", &["a"]).unwrap();
        graph.add_dependencies("right", &["a"]).unwrap();
        graph.add_dependencies("bottom", &["left", "right", "a"]).unwrap();

        let order = UpdateScheduler::new(&graph).mark_changed("a");

        assert_eq!(order.len(), 3);
        assert!(position(&order, "left") < position(&order, "bottom"));
        assert!(position(&order, "right") < position(&order, "bottom"));
    }

    #[test]
    fn order_respects_edges_regardless_of_declaration_order() {
        let mut graph = DependencyGraph::new();
        // Declared downstream-first.
        graph.add_dependencies("d", &["c"]).unwrap();
        graph.add_dependencies("c", &["b", "a"]).unwrap();
        graph.add_dependencies("b", &["a"]).unwrap();

        let order = UpdateScheduler::new(&graph).mark_changed("a");

        assert_eq!(order, ["b", "c", "d"]);
    }

    #[test]
    fn long_chains_do_not_recurse() {
        let mut graph = DependencyGraph::new();
        let names: Vec<String> = (0..2_000).map(|i| format!("p{}", i)).collect();
        for pair in names.windows(2) {
            graph.add_dependencies(&pair[1], &[pair[0].as_str()]).unwrap();
        }

        let order = UpdateScheduler::new(&graph).mark_changed("p0");

        assert_eq!(order.len(), 1_999);
        assert_eq!(order.first(), Some(&"p1"));
        assert_eq!(order.last(), Some(&"p1999"));
    }
}
