//! Dependency Graph
//!
//! This module implements the dependency graph that tracks relationships
//! between the properties of a reactive context.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes are property names
//! - Edges represent dependencies: if `hp` reads `con`, `hp` depends on
//!   `con` and `con` has `hp` as a dependent
//!
//! When a property changes, we traverse the graph to find every property
//! downstream of it and recompute them in dependency order.
//!
//! # Design Decisions
//!
//! 1. The graph is pure data: it knows names and edges, never values or
//!    formulas.
//!
//! 2. Both forward (dependencies) and reverse (dependents) edges are stored,
//!    and every mutation updates both, so reverse edges are always the exact
//!    transpose of forward edges.
//!
//! 3. Cycles are rejected before any edge is written, leaving the graph as it
//!    was.

mod dependency_map;
mod node;
mod scheduler;

pub use dependency_map::DependencyGraph;
pub use node::Node;
pub use scheduler::UpdateScheduler;
