//! Deterministic JSON serialization used for fingerprinting.

use serde_json::{Number, Value};

/// Serialize `value` with sorted object keys and every number printed as a
/// shortest round-trip `f64`, so `11`, `11.0` and `1.1e1` are byte-identical.
/// Integers beyond `f64` precision are printed exactly instead.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Remove null-valued object fields and null array items, recursively.
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, inner)| !inner.is_null())
                .map(|(key, inner)| (key, strip_nulls(inner)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|inner| !inner.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => write_number(out, number),
        Value::String(text) => write_string(out, text),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Key order must not depend on serde_json's `preserve_order` feature.
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|left, right| left.0.cmp(right.0));

            out.push('{');
            for (index, (key, inner)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, inner);
            }
            out.push('}');
        }
    }
}

/// Integers that `f64` cannot hold exactly keep their exact digits.
fn write_number(out: &mut String, number: &Number) {
    let exact_integer = number
        .as_i64()
        .map(i128::from)
        .or_else(|| number.as_u64().map(i128::from));
    if let Some(integer) = exact_integer {
        if integer as f64 as i128 != integer {
            out.push_str(&number.to_string());
            return;
        }
    }
    match number.as_f64().and_then(Number::from_f64) {
        Some(normalized) => out.push_str(&normalized.to_string()),
        None => out.push_str(&number.to_string()),
    }
}

fn write_string(out: &mut String, text: &str) {
    out.push_str(&Value::String(text.to_owned()).to_string());
}
