// ── Value codec ──
//
// The tree stores flat values only. Arrays and objects travel as JSON
// text and are parsed back when the node's declared type says so.

use serde_json::Value;
use tracing::info;

use crate::tree::{LocalTree, StorageValue, ValueType};

/// Hub value -> storage value. Composites become JSON text.
pub fn encode(value: &Value) -> StorageValue {
    match value {
        Value::Null => StorageValue::Null,
        Value::Bool(b) => StorageValue::Bool(*b),
        Value::Number(n) => StorageValue::Number(n.clone()),
        Value::String(s) => StorageValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => StorageValue::Text(value.to_string()),
    }
}

/// Storage value -> hub value, given the node's declared type.
///
/// Text is parsed only for structured types; a parse failure yields the
/// raw text.
pub fn decode_with(value_type: Option<ValueType>, stored: &StorageValue) -> Value {
    match stored {
        StorageValue::Text(text) if value_type.is_some_and(ValueType::is_structured) => {
            serde_json::from_str(text).unwrap_or_else(|e| {
                info!(error = %e, "stored text is not valid JSON; passing it through");
                Value::String(text.clone())
            })
        }
        other => other.to_json(),
    }
}

/// Decode a stored value using the metadata of the node at `address`.
/// A missing node or a tree failure decodes as plain text.
pub async fn decode(tree: &dyn LocalTree, address: &str, stored: &StorageValue) -> Value {
    let value_type = match tree.get_node(address).await {
        Ok(node) => node.and_then(|n| n.common.value_type),
        Err(e) => {
            info!(error = %e, address, "could not read node metadata for decoding");
            None
        }
    };
    decode_with(value_type, stored)
}

/// Whether a stored value already represents `incoming`.
///
/// Numbers compare by magnitude so `20` and `20.0` are the same reading.
pub fn values_equal(stored: &StorageValue, incoming: &StorageValue) -> bool {
    match (stored, incoming) {
        (StorageValue::Number(a), StorageValue::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a == b,
        },
        (a, b) => a == b,
    }
}
