//! Reaction Core
//!
//! This crate implements formula-driven reactive properties: an object whose
//! properties can be declared either as stored values or as formulas over
//! other properties, and which recomputes every affected formula when any
//! input changes.
//!
//! It provides:
//!
//! - A dependency extractor that finds the free variables of formula text
//! - A bidirectional dependency graph that rejects cycles before writing
//! - An engine that recomputes dependents in topological order
//! - An embedded expression language behind the [`Evaluator`] trait
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: The reactive context and its property store
//! - `graph`: Dependency graph and update scheduling
//! - `expr`: Formula lexer, parser and interpreter
//! - `extract`: Free-variable extraction
//! - `value`: Dynamic values and their coercions
//! - `builtins`: The `Math` and `Date` environment
//! - `serialize`: Conversion of values back to formula text
//!
//! # Example
//!
//! ```rust
//! use reaction_core::ReactiveContext;
//!
//! let mut sheet = ReactiveContext::new();
//! sheet.reactive(["hp", "damageLoss"])?;
//!
//! // Formulas may mention properties that do not exist yet.
//! sheet.set("damageLoss", "hp / 10")?;
//! sheet.set("hp", "(con + siz)/2")?;
//!
//! sheet.set("con", 10)?;
//! sheet.set("siz", 12)?;
//! assert_eq!(sheet.get("hp").as_number(), Some(11.0));
//! assert_eq!(sheet.get("damageLoss").as_number(), Some(1.1));
//! # Ok::<(), reaction_core::ReactionError>(())
//! ```

pub mod builtins;
pub mod config;
pub mod error;
pub mod expr;
pub mod extract;
pub mod graph;
pub mod reactive;
pub mod serialize;
pub mod value;

pub use config::ReactionConfig;
pub use error::{EvalError, ReactionError, Result};
pub use expr::{Bindings, Evaluator, Formula, Interpreter};
pub use extract::extract_dependencies;
pub use reactive::{DeclareOptions, ReactiveContext};
pub use serialize::serialize;
pub use value::{Object, Value};
