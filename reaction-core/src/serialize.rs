//! Value to formula text.
//!
//! When a property that already holds a value becomes formula-capable, the
//! value is captured as equivalent formula text. JSON is a subset of the
//! formula language, so anything `serde_json` can represent round-trips
//! through [`Formula::parse`](crate::expr::Formula::parse).

use serde_json::{Map, Number};

use crate::value::{format_number, Value};

/// Text used when a value has no formula equivalent.
pub const FALLBACK_FORMULA: &str = "undefined";

/// Render `value` as formula text, falling back to [`FALLBACK_FORMULA`].
pub fn serialize(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Date(t) => format!("new Date({})", format_number(*t)),
        _ => match to_json(value) {
            Some(json) => json.to_string(),
            None => {
                tracing::debug!(kind = value.type_of(), "value has no formula form, using fallback");
                FALLBACK_FORMULA.to_string()
            }
        },
    }
}

fn to_json(value: &Value) -> Option<serde_json::Value> {
    let json = match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::Value::Number(json_number(*n)?),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect::<Option<_>>()?),
        Value::Object(object) => {
            let mut map = Map::new();
            for (key, value) in object {
                map.insert(key.clone(), to_json(value)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Undefined | Value::Date(_) | Value::Builtin(_) | Value::Function(_) => return None,
    };
    Some(json)
}

/// Integral numbers print without a fraction, as [`format_number`] does.
fn json_number(n: f64) -> Option<Number> {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Some(Number::from(n as i64))
    } else {
        Number::from_f64(n)
    }
}
