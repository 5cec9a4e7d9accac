//! 工具参数 Schema：schemars 生成 + 分发前校验
//!
//! 参数结构体 derive JsonSchema 后由 json_schema_of 转为 JSON Schema；
//! validate_args 在分发前对 required 与属性类型做最小校验，未通过时处理器不会被调用。

use schemars::{schema_for, JsonSchema};
use serde_json::Value;

/// 生成参数结构体的 JSON Schema
pub fn json_schema_of<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

/// 校验 args 是否满足 schema：顶层必须是对象，required 键齐全，声明过类型的属性类型匹配
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), String> {
    let obj = args
        .as_object()
        .ok_or_else(|| format!("arguments must be a JSON object, got: {}", args))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            if !obj.contains_key(key) {
                return Err(format!("missing required argument '{}'", key));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
        for (key, value) in obj {
            let Some(prop_schema) = properties.get(key) else {
                continue; // 未声明的属性放行，交由工具自行忽略
            };
            if let Some(expected) = prop_schema.get("type") {
                if !type_matches(expected, value) {
                    return Err(format!(
                        "argument '{}' has wrong type, expected {}",
                        key, expected
                    ));
                }
            }
        }
    }

    Ok(())
}

/// expected 可以是单个类型名或类型名数组（如 ["string", "null"]）
fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(name) => value_is_type(name, value),
        Value::Array(names) => names
            .iter()
            .filter_map(|n| n.as_str())
            .any(|name| value_is_type(name, value)),
        _ => true,
    }
}

fn value_is_type(name: &str, value: &Value) -> bool {
    match name {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}
