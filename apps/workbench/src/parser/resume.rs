//! Tailored resume extraction.
//!
//! Providers wrap the resume differently (`tailoredResume`, `result.tailored`,
//! a JSON string inside `result`, ...). Strategies run in a fixed order and
//! the first hit wins:
//!
//! 1. known paths under the payload, strict resume check
//! 2. depth-first search of the whole response, strict check
//! 3. re-parse string payloads / double-encoded wrappers
//! 4. any nested object sharing at least two top-level resume sections

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::json::{decode_json_text, get_path, payload_of, truthy, truthy_value};
use crate::models::ResumeDocument;

const COMMON_PATHS: [&str; 7] = [
    "tailoredResume",
    "tailored_resume",
    "tailored",
    "resume",
    "result.tailoredResume",
    "result.tailored",
    "data.tailoredResume",
];

const RESUME_SECTIONS: [&str; 11] = [
    "basics",
    "work",
    "education",
    "skills",
    "projects",
    "volunteer",
    "awards",
    "publications",
    "languages",
    "interests",
    "references",
];

const MAX_SEARCH_DEPTH: usize = 5;

pub fn parse_tailored_resume(result: &Value) -> Option<ResumeDocument> {
    if let Some(found) = from_common_paths(result) {
        debug!("Tailored resume found via common paths");
        return Some(found);
    }
    if let Some(found) = deep_search(result, 0) {
        debug!("Tailored resume found via deep search");
        return Some(found.clone());
    }
    if let Some(found) = from_string_payload(result) {
        debug!("Tailored resume found via JSON re-parse");
        return Some(found);
    }
    if let Some(found) = find_resume_structure(result, 0) {
        debug!("Tailored resume found via structure matching");
        return Some(found.clone());
    }

    warn!("Could not extract tailored resume from AI response");
    None
}

/// `basics` object, `work` array or `skills` array.
pub fn is_resume_object(value: &Value) -> bool {
    let Some(obj) = value.as_object() else {
        return false;
    };
    let has_basics = obj
        .get("basics")
        .is_some_and(|b| truthy(b) && (b.is_object() || b.is_array()));
    let has_work = obj.get("work").is_some_and(Value::is_array);
    let has_skills = obj.get("skills").is_some_and(Value::is_array);
    has_basics || has_work || has_skills
}

fn has_resume_fields(value: &Value) -> bool {
    value.as_object().is_some_and(|obj| {
        RESUME_SECTIONS
            .iter()
            .filter(|key| obj.contains_key(**key))
            .count()
            >= 2
    })
}

fn from_common_paths(result: &Value) -> Option<ResumeDocument> {
    let payload = payload_of(result);
    if !payload.is_object() {
        return None;
    }
    COMMON_PATHS
        .iter()
        .filter_map(|path| get_path(payload, path))
        .find(|value| is_resume_object(value))
        .cloned()
}

fn children(value: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match value {
        Value::Object(map) => Box::new(map.values()),
        Value::Array(items) => Box::new(items.iter()),
        _ => Box::new(std::iter::empty()),
    }
}

fn deep_search(value: &Value, depth: usize) -> Option<&Value> {
    if depth > MAX_SEARCH_DEPTH || !(value.is_object() || value.is_array()) {
        return None;
    }
    if is_resume_object(value) {
        return Some(value);
    }
    children(value).find_map(|child| deep_search(child, depth + 1))
}

fn from_string_payload(result: &Value) -> Option<ResumeDocument> {
    if let Value::String(text) = payload_of(result) {
        if let Some(parsed) = decode_json_text(text) {
            if is_resume_object(&parsed) {
                return Some(parsed);
            }
            let nested = truthy_value(parsed.get("tailoredResume"))
                .or_else(|| truthy_value(parsed.get("resume")));
            if let Some(found) = nested.and_then(as_document) {
                return Some(found);
            }
        }
    }

    truthy_value(get_path(result, "result.tailoredResume"))
        .or_else(|| truthy_value(result.get("tailoredResume")))
        .and_then(as_document)
}

/// Objects pass through; strings are decoded once more.
fn as_document(value: &Value) -> Option<ResumeDocument> {
    match value {
        Value::Object(_) => Some(value.clone()),
        Value::String(text) => decode_json_text(text).filter(Value::is_object),
        _ => None,
    }
}

fn find_resume_structure(value: &Value, depth: usize) -> Option<&Value> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    for child in children(value) {
        if !(child.is_object() || child.is_array()) {
            continue;
        }
        if has_resume_fields(child) {
            return Some(child);
        }
        if let Some(found) = find_resume_structure(child, depth + 1) {
            return Some(found);
        }
    }
    None
}

// ────────────────────────────────────────────────────────────────────────────
// Structural validation
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumeValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

pub fn validate_resume_structure(resume: &Value) -> ResumeValidation {
    let Some(obj) = resume.as_object() else {
        return ResumeValidation {
            valid: false,
            errors: vec!["Resume must be an object".to_string()],
        };
    };

    let mut errors = Vec::new();
    let present = |key: &str| obj.get(key).filter(|v| truthy(v));

    let has_major_section = ["basics", "work", "skills", "education"]
        .iter()
        .any(|key| present(key).is_some());
    if !has_major_section {
        errors.push(
            "Resume must have at least one major section (basics, work, skills, or education)"
                .to_string(),
        );
    }

    if present("basics").is_some_and(|b| !(b.is_object() || b.is_array())) {
        errors.push("basics must be an object".to_string());
    }
    for key in ["work", "skills", "education"] {
        if present(key).is_some_and(|v| !v.is_array()) {
            errors.push(format!("{key} must be an array"));
        }
    }

    ResumeValidation {
        valid: errors.is_empty(),
        errors,
    }
}
