//! 模型输出解码
//!
//! 服务端不保证输出符合声明的结构，这里在本地再解析一次：
//! 去掉代码块包裹 → 解析 JSON → 按结构声明校验 → 反序列化为目标类型。

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// 解码结果
#[derive(Debug, PartialEq)]
pub enum Decoded<T> {
    Ok(T),
    /// 不是合法 JSON
    ParseError(String),
    /// JSON 合法但形状不符
    SchemaViolation(String),
}

impl<T> Decoded<T> {
    pub fn into_result(self) -> Result<T, String> {
        match self {
            Decoded::Ok(value) => Ok(value),
            Decoded::ParseError(msg) => Err(format!("JSON解析失败: {}", msg)),
            Decoded::SchemaViolation(msg) => Err(format!("结构不符: {}", msg)),
        }
    }
}

/// 解码模型返回的文本
pub fn decode<T: DeserializeOwned>(text: &str, schema: Option<&JsonValue>) -> Decoded<T> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Decoded::ParseError("响应为空".to_string());
    }

    let value: JsonValue = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => return Decoded::ParseError(e.to_string()),
    };

    if let Some(schema) = schema {
        if let Err(msg) = validate(&value, schema, "$") {
            return Decoded::SchemaViolation(msg);
        }
    }

    match serde_json::from_value(value) {
        Ok(typed) => Decoded::Ok(typed),
        Err(e) => Decoded::SchemaViolation(e.to_string()),
    }
}

/// 去掉 ```json ... ``` 包裹
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // 跳过语言标记所在的第一行
    match rest.find('\n') {
        Some(idx) if !rest[..idx].contains('{') && !rest[..idx].contains('[') => rest[idx + 1..].trim(),
        _ => rest.trim(),
    }
}

/// 按 JSON Schema 子集校验：type / properties / required / items / minItems / maxItems / enum
pub fn validate(value: &JsonValue, schema: &JsonValue, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(JsonValue::as_str) {
        if !type_matches(value, expected) {
            return Err(format!("{} 应为 {}，实际为 {}", path, expected, type_name(value)));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(JsonValue::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{} 的值 {} 不在允许范围内", path, value));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(JsonValue::as_array) {
            for key in required.iter().filter_map(JsonValue::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{} 缺少字段 '{}'", path, key));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(JsonValue::as_object) {
            for (key, sub_schema) in properties {
                if let Some(field) = object.get(key) {
                    validate(field, sub_schema, &format!("{}.{}", path, key))?;
                }
            }
        }
    }

    if let Some(items) = value.as_array() {
        let len = items.len() as u64;
        if let Some(min) = schema.get("minItems").and_then(JsonValue::as_u64) {
            if len < min {
                return Err(format!("{} 至少需要 {} 项，实际 {} 项", path, min, len));
            }
        }
        if let Some(max) = schema.get("maxItems").and_then(JsonValue::as_u64) {
            if len > max {
                return Err(format!("{} 最多 {} 项，实际 {} 项", path, max, len));
            }
        }
        if let Some(item_schema) = schema.get("items") {
            for (i, item) in items.iter().enumerate() {
                validate(item, item_schema, &format!("{}[{}]", path, i))?;
            }
        }
    }

    Ok(())
}

fn type_matches(value: &JsonValue, expected: &str) -> bool {
    match expected.to_ascii_lowercase().as_str() {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
