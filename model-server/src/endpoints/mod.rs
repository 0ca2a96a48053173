//! Bundled demonstration plugins.

pub mod dummy_model_a;
pub mod dummy_model_b;

use serde_json::Value;

/// Numeric view of an input value; numeric strings are accepted.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
