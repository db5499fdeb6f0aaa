//! Declarative argument validation.
//!
//! Covers the JSON-Schema subset the tool catalogue actually declares:
//! `type`, `properties`, `required`, `minimum`, `maximum`, `enum`, and
//! `items` for arrays.  Validation runs before every handler; a failure is
//! reported in the tool result and the handler never runs.

use serde_json::Value;

/// Validate `args` against `schema`.  Returns a human-readable description of
/// the first violation found.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    validate_value(schema, args, "parameters")
}

fn validate_value(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        check_type(expected, value, path)?;
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
            return Err(format!(
                "{path} must be one of [{}], got {value}",
                options.join(", ")
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
            if number < min {
                return Err(format!("{path} must be >= {min}, got {number}"));
            }
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
            if number > max {
                return Err(format!("{path} must be <= {max}, got {number}"));
            }
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{path} is missing required field '{key}'"));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, subschema) in properties {
                if let Some(subvalue) = object.get(key) {
                    validate_value(subschema, subvalue, &format!("{path}.{key}"))?;
                }
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (index, item) in array.iter().enumerate() {
            validate_value(items, item, &format!("{path}[{index}]"))?;
        }
    }

    Ok(())
}

fn check_type(expected: &str, value: &Value, path: &str) -> Result<(), String> {
    let ok = match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.is_i64() || value.is_u64(),
        // Integers are acceptable wherever a number is expected.
        "number" => value.is_number(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(format!("{path} must be of type {expected}, got {value}"))
    }
}
