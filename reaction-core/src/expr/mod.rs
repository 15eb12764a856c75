//! Formula Language
//!
//! Formulas are small expressions over other properties:
//!
//! ```text
//! (con + siz) / 2
//! Math.max(con, siz)
//! new Date(year, month - 1, day)
//! items.map(function (x) { return x * rate; })
//! ```
//!
//! The language covers literals (numbers, strings, booleans, `null`,
//! `undefined`, arrays, objects), arithmetic, comparison and logical
//! operators, the conditional operator, member access, calls, `new`, and
//! single-expression function literals. There is no assignment and no
//! statement form, so evaluating a formula cannot change anything outside it.
//!
//! A [`Formula`] is parsed once when it is assigned and keeps its syntax tree
//! together with its free variables; recomputation only re-evaluates the tree.

mod ast;
mod eval;
mod lexer;
mod parser;

use std::rc::Rc;

use indexmap::IndexSet;

pub use ast::{BinaryOp, Expr, FunctionLiteral, Literal, LogicalOp, UnaryOp};
pub use eval::{get_member, Bindings, Closure, Evaluator, Frame, Interpreter};
pub use lexer::{is_identifier, is_keyword, tokenize, Punct, Token, TokenKind, KEYWORDS};
pub use parser::parse;

use crate::config::ReactionConfig;
use crate::error::EvalError;
use crate::extract;

/// A parsed formula.
#[derive(Debug, Clone)]
pub struct Formula {
    source: String,
    expr: Rc<Expr>,
    free_variables: IndexSet<String>,
}

impl Formula {
    /// Parse formula text and extract its free variables.
    pub fn parse(source: &str, config: &ReactionConfig) -> Result<Self, EvalError> {
        let expr = parser::parse(source, config)?;
        let free_variables = extract::free_variables(&expr);
        Ok(Self {
            source: source.to_string(),
            expr: Rc::new(expr),
            free_variables,
        })
    }

    /// The formula text as assigned.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Free variables in order of first occurrence. Built-in names are
    /// included; filtering them is up to the caller.
    pub fn free_variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.free_variables.iter().map(String::as_str)
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
