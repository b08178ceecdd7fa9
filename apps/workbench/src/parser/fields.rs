use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::json::{
    decode_json_text, decode_whole_json_text, get_path, payload_of, truthy, truthy_value,
};

const COVER_LETTER_PATHS: [&str; 5] = [
    "coverLetter",
    "cover_letter",
    "letter",
    "result.coverLetter",
    "result.cover_letter",
];

const ANALYSIS_PATHS: [&str; 4] = ["analysis", "matchAnalysis", "match_analysis", "result.analysis"];

/// Bare text shorter than this is not taken for a letter.
const MIN_PLAIN_LETTER_LEN: usize = 100;

pub fn parse_cover_letter(result: &Value) -> Option<String> {
    let payload = payload_of(result);

    let from_paths = COVER_LETTER_PATHS
        .iter()
        .filter_map(|path| truthy_value(get_path(payload, path)))
        .find_map(|v| v.as_str().map(str::to_string));
    if from_paths.is_some() {
        return from_paths;
    }

    // Prose that merely quotes a JSON object is still a letter.
    if let Value::String(text) = payload {
        match decode_whole_json_text(text) {
            Some(parsed) if !parsed.is_string() => {
                let letter = truthy_value(parsed.get("coverLetter"))
                    .or_else(|| truthy_value(parsed.get("cover_letter")))
                    .and_then(Value::as_str);
                if let Some(letter) = letter {
                    return Some(letter.to_string());
                }
            }
            _ => {
                if text.chars().count() > MIN_PLAIN_LETTER_LEN {
                    return Some(text.clone());
                }
            }
        }
    }

    warn!("Could not extract cover letter from AI response");
    None
}

pub fn parse_match_analysis(result: &Value) -> Option<Value> {
    let payload = payload_of(result);

    if let Some(found) = ANALYSIS_PATHS
        .iter()
        .find_map(|path| truthy_value(get_path(payload, path)))
    {
        return Some(found.clone());
    }

    if let Value::String(text) = payload {
        if let Some(parsed) = decode_json_text(text) {
            let found = truthy_value(parsed.get("analysis"))
                .or_else(|| truthy_value(parsed.get("matchAnalysis")));
            if let Some(found) = found {
                return Some(found.clone());
            }
        }
    }

    warn!("Could not extract match analysis from AI response");
    None
}

pub fn parse_key_points(result: &Value) -> Vec<String> {
    first_array(payload_of(result), &["keyPoints", "key_points", "result.keyPoints"])
}

pub fn parse_changes(result: &Value) -> Vec<String> {
    first_array(payload_of(result), &["changes", "result.changes"])
}

fn first_array(payload: &Value, paths: &[&str]) -> Vec<String> {
    paths
        .iter()
        .find_map(|path| get_path(payload, path).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseMetadata {
    pub provider: String,
    pub model: String,
    pub tokens: Option<u64>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

pub fn extract_metadata(result: &Value) -> ResponseMetadata {
    let text_field = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|key| truthy_value(result.get(*key)).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string()
    };

    let tokens = truthy_value(result.get("tokens"))
        .or_else(|| truthy_value(get_path(result, "usage.total_tokens")))
        .and_then(Value::as_u64);

    ResponseMetadata {
        provider: text_field(["usedProvider", "provider"]),
        model: text_field(["usedModel", "model"]),
        tokens,
        timestamp: Utc::now(),
        success: result.get("result").is_some_and(truthy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn long_letter() -> String {
        format!("Dear Hiring Manager,\n\n{}", "I am writing to apply. ".repeat(10))
    }

    #[test]
    fn test_cover_letter_from_stringified_result() {
        let response = json!({"result": "{\"coverLetter\":\"Dear...\"}"});
        assert_eq!(parse_cover_letter(&response).as_deref(), Some("Dear..."));
    }

    #[test]
    fn test_cover_letter_common_paths() {
        let response = json!({"result": {"cover_letter": "Hello"}});
        assert_eq!(parse_cover_letter(&response).as_deref(), Some("Hello"));

        let response = json!({"letter": "Hi there"});
        assert_eq!(parse_cover_letter(&response).as_deref(), Some("Hi there"));
    }

    #[test]
    fn test_plain_text_letter_needs_length() {
        let letter = long_letter();
        let response = json!({ "result": letter });
        assert_eq!(parse_cover_letter(&response), Some(letter));

        let short = json!({"result": "Too short to be a letter"});
        assert_eq!(parse_cover_letter(&short), None);
    }

    #[test]
    fn test_json_string_without_letter_is_not_the_letter() {
        let body = format!("{{\"note\": \"{}\"}}", "x".repeat(200));
        let response = json!({ "result": body });
        assert_eq!(parse_cover_letter(&response), None);
    }

    #[test]
    fn test_letter_quoting_json_stays_plain_text() {
        let letter = format!(
            "Dear Hiring Manager,\n\nMy last service returned {{\"status\": \"ok\"}} for {}",
            "ten million requests a day. ".repeat(4)
        );
        let response = json!({ "result": letter });
        assert_eq!(parse_cover_letter(&response), Some(letter));

        let fenced = json!({"result": "```json\n{\"coverLetter\": \"Dear team\"}\n```"});
        assert_eq!(parse_cover_letter(&fenced).as_deref(), Some("Dear team"));
    }

    #[test]
    fn test_match_analysis_paths() {
        let response = json!({"result": {"matchAnalysis": {"score": 80}}});
        assert_eq!(parse_match_analysis(&response), Some(json!({"score": 80})));

        let response = json!({"result": "{\"analysis\": {\"score\": 55}}"});
        assert_eq!(parse_match_analysis(&response), Some(json!({"score": 55})));

        assert_eq!(parse_match_analysis(&json!({"result": {}})), None);
    }

    #[test]
    fn test_key_points_and_changes_default_empty() {
        let response = json!({"result": {"keyPoints": ["a", "b"], "changes": "not a list"}});
        assert_eq!(parse_key_points(&response), vec!["a", "b"]);
        assert!(parse_changes(&response).is_empty());
        assert!(parse_key_points(&json!(null)).is_empty());
    }

    #[test]
    fn test_extract_metadata() {
        let response = json!({
            "result": {"x": 1},
            "usedProvider": "openai",
            "model": "gpt-4o",
            "usage": {"total_tokens": 321}
        });
        let meta = extract_metadata(&response);
        assert_eq!(meta.provider, "openai");
        assert_eq!(meta.model, "gpt-4o");
        assert_eq!(meta.tokens, Some(321));
        assert!(meta.success);

        let empty = extract_metadata(&json!({}));
        assert_eq!(empty.provider, "unknown");
        assert_eq!(empty.tokens, None);
        assert!(!empty.success);
    }
}
