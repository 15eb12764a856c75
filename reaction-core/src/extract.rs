//! Dependency Extractor
//!
//! Derives the free variables of a formula, which become its dependencies.
//!
//! Extraction runs over the syntax tree rather than raw text, which gives the
//! exclusion rules directly:
//!
//! - `a.b` and `a. b` only reference `a`; member names are not identifiers.
//! - Reserved words (`new`, `function`, `return`, ...) never become names.
//! - Function literal names and parameters are bound inside the literal, so
//!   neither they nor their uses in the body escape as dependencies.
//! - Object literal keys are not references (`{c: 0}` has no free variables).
//! - Text inside string literals is never scanned.
//!
//! The result is ordered by first occurrence, left to right, without
//! duplicates.

use indexmap::IndexSet;

use crate::config::ReactionConfig;
use crate::error::EvalError;
use crate::expr::{self, Expr};

/// Extract the dependency names of formula text.
pub fn extract_dependencies(source: &str) -> Result<Vec<String>, EvalError> {
    let expr = expr::parse(source, &ReactionConfig::default())?;
    Ok(free_variables(&expr).into_iter().collect())
}

pub(crate) fn free_variables(expr: &Expr) -> IndexSet<String> {
    let mut found = IndexSet::new();
    let mut bound = Vec::new();
    collect(expr, &mut bound, &mut found);
    found
}

fn collect<'e>(expr: &'e Expr, bound: &mut Vec<&'e str>, found: &mut IndexSet<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(name) => {
            if !bound.contains(&name.as_str()) && !found.contains(name) {
                found.insert(name.clone());
            }
        }
        Expr::Array(items) => {
            for item in items {
                collect(item, bound, found);
            }
        }
        Expr::Object(entries) => {
            for (_, value) in entries {
                collect(value, bound, found);
            }
        }
        Expr::Function(function) => {
            let mark = bound.len();
            bound.extend(function.name.as_deref());
            bound.extend(function.params.iter().map(String::as_str));
            collect(&function.body, bound, found);
            bound.truncate(mark);
        }
        Expr::Member { object, .. } => collect(object, bound, found),
        Expr::Index { object, index } => {
            collect(object, bound, found);
            collect(index, bound, found);
        }
        Expr::Call { callee, args } | Expr::New { callee, args } => {
            collect(callee, bound, found);
            for arg in args {
                collect(arg, bound, found);
            }
        }
        Expr::Unary { operand, .. } => collect(operand, bound, found),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect(left, bound, found);
            collect(right, bound, found);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect(test, bound, found);
            collect(consequent, bound, found);
            collect(alternate, bound, found);
        }
    }
}
