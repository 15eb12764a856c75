//! Reactive Properties
//!
//! This module implements the reactive engine: a context object whose
//! properties are either stored values or formulas over other properties,
//! and which recomputes formulas eagerly whenever an input changes.
//!
//! # Concepts
//!
//! ## Formula properties
//!
//! A formula property holds formula text such as `(con + siz)/2`. Its free
//! variables become its dependencies, and its value is recomputed whenever
//! one of them is written. Assigning a string or a number to a formula
//! property replaces its formula.
//!
//! ## Stored (monitor-only) properties
//!
//! A stored property holds whatever was last assigned. It takes part in the
//! dependency graph as an input only. Free variables that are not declared
//! when a formula mentions them are declared this way automatically.
//!
//! # Ordering
//!
//! Because recomputation is eager, every formula property is up to date when
//! it is read, regardless of the order in which formulas were assigned or
//! inputs became available.

mod context;
mod property;

pub use context::{DeclareOptions, ReactiveContext};
pub use property::{Declaration, Property, PropertyInfo, PropertyKind, PropertyStore};
