//! Error types for the reactive engine.
//!
//! Two layers: [`EvalError`] is produced by the expression language
//! (parsing and evaluation of a single formula), [`ReactionError`] is what
//! callers of [`ReactiveContext`](crate::reactive::ReactiveContext) see.

use thiserror::Error;

/// Faults raised while parsing or evaluating a formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("Syntax error at offset {position}: {message}")]
    Syntax {
        position: usize,
        message: String,
    },

    #[error("'{name}' is not defined")]
    UnboundVariable {
        name: String,
    },

    #[error("TypeError: {message}")]
    TypeError {
        message: String,
    },

    #[error("Expression exceeds the maximum depth of {limit}")]
    DepthExceeded {
        limit: usize,
    },
}

impl EvalError {
    pub(crate) fn syntax(position: usize, message: impl Into<String>) -> Self {
        Self::Syntax {
            position,
            message: message.into(),
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError {
            message: message.into(),
        }
    }
}

/// Faults surfaced by property writes and declarations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReactionError {
    /// Accepting the formula would make `name` depend on itself.
    #[error("Cyclic dependency detected while defining '{name}'")]
    CycleDetected {
        name: String,
    },

    #[error("Failed to evaluate '{name}': {source}")]
    Evaluation {
        name: String,
        #[source]
        source: EvalError,
    },

    #[error("Evaluating '{name}' exhausted the depth budget of {limit}")]
    ResourceExhaustion {
        name: String,
        limit: usize,
    },

    #[error("'{name}' is reserved and cannot be declared as a property")]
    ReservedName {
        name: String,
    },

    #[error("'{name}' is not a valid property name")]
    InvalidName {
        name: String,
    },
}

impl ReactionError {
    /// Attribute an expression fault to the property being defined or recomputed.
    pub(crate) fn from_eval(name: &str, error: EvalError) -> Self {
        match error {
            EvalError::DepthExceeded { limit } => Self::ResourceExhaustion {
                name: name.to_string(),
                limit,
            },
            source => Self::Evaluation {
                name: name.to_string(),
                source,
            },
        }
    }

    /// Name of the property the fault is attributed to.
    pub fn property(&self) -> &str {
        match self {
            Self::CycleDetected { name }
            | Self::Evaluation { name, .. }
            | Self::ResourceExhaustion { name, .. }
            | Self::ReservedName { name }
            | Self::InvalidName { name } => name,
        }
    }
}

pub type Result<T, E = ReactionError> = std::result::Result<T, E>;
