//! Engine configuration.

use serde::Deserialize;

/// Limits applied while parsing and evaluating formulas.
///
/// All three budgets guard the native call stack. Going past any of them
/// fails with
/// [`ReactionError::ResourceExhaustion`](crate::ReactionError::ResourceExhaustion).
/// The defaults fit the 2 MiB stack of a spawned thread in a debug build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReactionConfig {
    /// Maximum syntactic nesting of a single formula: parentheses,
    /// brackets, braces, unary operators and `new`.
    pub max_nesting_depth: usize,
    /// Maximum number of nested function-literal invocations.
    pub max_call_depth: usize,
    /// Maximum height of a formula's syntax tree, and of the evaluation
    /// stack across function calls.
    pub max_eval_depth: usize,
}

impl Default for ReactionConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: 64,
            max_call_depth: 64,
            max_eval_depth: 256,
        }
    }
}

impl ReactionConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = ReactionConfig::from_json(r#"{"max_call_depth": 16}"#).unwrap();
        assert_eq!(config.max_call_depth, 16);
        assert_eq!(config.max_nesting_depth, 64);
        assert_eq!(config.max_eval_depth, 256);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(ReactionConfig::from_json("{}").unwrap(), ReactionConfig::default());
    }
}
