//! Value coercion and fragment helpers shared by both compilation forms

use crate::config::FieldType;
use crate::expression::json_number;
use crate::filter::Logic;
use serde_json::{json, Map, Value};

/// Stand-in for a missing literal
pub const NULL: &Value = &Value::Null;

/// Numeric strings become numbers; everything else is kept
pub fn coerce_number(value: &Value) -> Value {
    match value {
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(n) if n.is_finite() && !s.trim().is_empty() => json_number(n),
            _ => value.clone(),
        },
        other => other.clone(),
    }
}

/// Coerce a comparison operand according to the field's type
///
/// String fields keep their text (`"007"` must not become `7`), boolean
/// fields accept `"true"`/`"false"`.
pub fn coerce_for(field_type: Option<FieldType>, value: &Value) -> Value {
    match (field_type, value) {
        (Some(FieldType::String), v) => v.clone(),
        (Some(FieldType::Boolean), Value::String(s)) => match s.trim() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        (_, v) => coerce_number(v),
    }
}

/// Numeric view of a number or numeric string
pub fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Text of a regex operand
pub fn regex_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Pattern for `$contains`/`$startsWith`/`$endsWith`
pub fn literal_pattern(value: &Value, anchor_start: bool, anchor_end: bool) -> String {
    let escaped = regex::escape(&regex_text(value));
    match (anchor_start, anchor_end) {
        (true, false) => format!("^{}", escaped),
        (false, true) => format!("{}$", escaped),
        _ => escaped,
    }
}

/// Arrays pass through, scalars are wrapped
pub fn wrap_array(value: &Value) -> Value {
    match value {
        Value::Array(_) => value.clone(),
        other => Value::Array(vec![other.clone()]),
    }
}

/// `false` or `"false"`
pub fn is_false(value: &Value) -> bool {
    matches!(value, Value::Bool(false)) || value.as_str().is_some_and(|s| s.trim() == "false")
}

/// Bounds of a two-element range
pub fn range_bounds(value: &Value) -> Option<(Value, Value)> {
    match value {
        Value::Array(items) if items.len() == 2 => {
            Some((coerce_number(&items[0]), coerce_number(&items[1])))
        }
        _ => None,
    }
}

/// Object with a single key
pub fn single(key: impl Into<String>, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.into(), value);
    Value::Object(map)
}

/// Combine child fragments; one child passes through unwrapped
pub fn combine(logic: Logic, mut parts: Vec<Value>) -> Option<Value> {
    match parts.len() {
        0 => None,
        1 => parts.pop(),
        _ => Some(single(logic.key(), Value::Array(parts))),
    }
}

/// Negate a query fragment
///
/// `{$expr: X}` becomes `{$expr: {$not: [X]}}`; any other fragment is wrapped
/// as `{$nor: [fragment]}`.
pub fn negate_query(fragment: Value) -> Value {
    if let Value::Object(map) = &fragment {
        if map.len() == 1 {
            if let Some(inner) = map.get("$expr") {
                return json!({"$expr": negate_expr(inner.clone())});
            }
        }
    }
    json!({"$nor": [fragment]})
}

/// Negate an aggregation expression
pub fn negate_expr(expr: Value) -> Value {
    json!({"$not": [expr]})
}

/// `$ifNull` guard used as the input of every array traversal
pub fn array_input(reference: impl Into<Value>) -> Value {
    json!({"$ifNull": [reference.into(), []]})
}
