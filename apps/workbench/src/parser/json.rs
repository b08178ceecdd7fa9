//! Helpers for poking at loosely-shaped JSON coming back from models.

use serde_json::Value;

/// Loose truthiness: `null`, `false`, `0`, `""` are falsy; containers are
/// always truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Returns the value only when it is truthy.
pub fn truthy_value(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| truthy(v))
}

/// `result.result` when present and non-null, otherwise `result` itself.
pub fn payload_of(result: &Value) -> &Value {
    match result.get("result") {
        Some(inner) if !inner.is_null() => inner,
        _ => result,
    }
}

/// Follows a dotted path through objects. Missing segments yield `None`.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// The slice from the first `{` to the last `}`, if both exist in order.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses model text as JSON: fences stripped, falling back to the outermost
/// `{…}` when the text has prose around it. A JSON string that itself holds
/// JSON is decoded once more.
pub fn decode_json_text(text: &str) -> Option<Value> {
    let cleaned = strip_json_fences(text);
    serde_json::from_str::<Value>(cleaned)
        .ok()
        .or_else(|| extract_json_object(cleaned).and_then(|obj| serde_json::from_str(obj).ok()))
        .map(decode_nested)
}

/// Like [`decode_json_text`] but without the `{…}` fallback: `None` unless
/// the whole text (fences aside) is JSON.
pub fn decode_whole_json_text(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(strip_json_fences(text))
        .ok()
        .map(decode_nested)
}

fn decode_nested(parsed: Value) -> Value {
    match parsed {
        Value::String(inner) => {
            let inner = strip_json_fences(&inner);
            match serde_json::from_str::<Value>(inner) {
                Ok(value) if !value.is_string() => value,
                _ => Value::String(inner.to_string()),
            }
        }
        other => other,
    }
}
