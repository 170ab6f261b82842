//! Minimal JSON-schema checks applied to tool arguments before dispatch.
//!
//! Covers what tool schemas actually use: an object root, required
//! properties, primitive property types, string enums and the item type of
//! arrays. Unknown properties are allowed.

use serde_json::Value;

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn check_property(name: &str, prop: &Value, value: &Value) -> Result<(), String> {
    if let Some(expected) = prop["type"].as_str() {
        if !type_matches(expected, value) {
            return Err(format!(
                "'{name}' must be {expected}, got {}",
                type_name(value)
            ));
        }
    }
    if let Some(allowed) = prop["enum"].as_array() {
        if !allowed.contains(value) {
            return Err(format!("'{name}' must be one of {}", Value::Array(allowed.clone())));
        }
    }
    if let (Some(items), Some(expected)) = (value.as_array(), prop["items"]["type"].as_str()) {
        if let Some((i, bad)) = items
            .iter()
            .enumerate()
            .find(|(_, item)| !type_matches(expected, item))
        {
            return Err(format!(
                "'{name}[{i}]' must be {expected}, got {}",
                type_name(bad)
            ));
        }
    }
    Ok(())
}

/// Validate `args` against a tool's parameter schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let root_type = schema["type"].as_str().unwrap_or("object");
    if root_type != "object" {
        return Ok(());
    }
    let Some(obj) = args.as_object() else {
        return Err(format!("arguments must be an object, got {}", type_name(args)));
    };

    if let Some(required) = schema["required"].as_array() {
        for name in required.iter().filter_map(|v| v.as_str()) {
            match obj.get(name) {
                None | Some(Value::Null) => {
                    return Err(format!("missing required argument '{name}'"));
                }
                Some(_) => {}
            }
        }
    }

    if let Some(props) = schema["properties"].as_object() {
        for (name, value) in obj {
            if value.is_null() {
                continue;
            }
            if let Some(prop) = props.get(name) {
                check_property(name, prop, value)?;
            }
        }
    }
    Ok(())
}
