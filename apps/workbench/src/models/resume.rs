use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{generate_id, RESUME_PREFIX};

/// A JSON Resume document (basics/work/education/skills/projects…).
///
/// Kept untyped: AI providers return partial and extended variants of the
/// schema and those must round-trip unchanged.
pub type ResumeDocument = Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeMetadata {
    /// Job id this resume was tailored for. Weak reference.
    pub tailored_for: Option<String>,
    /// Resume the tailored copy was derived from. Weak reference.
    pub original_resume_id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub ai_generated: bool,
    pub last_tailored: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(alias = "data", default)]
    pub content: ResumeDocument,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResumeMetadata>,
}

impl Resume {
    pub fn new(name: impl Into<String>, content: ResumeDocument) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(RESUME_PREFIX),
            name: name.into(),
            content,
            date_created: now,
            date_modified: now,
            metadata: None,
        }
    }

    /// `basics.name` from the document, when present.
    pub fn candidate_name(&self) -> Option<&str> {
        self.content
            .get("basics")
            .and_then(|b| b.get("name"))
            .and_then(|n| n.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_data_key_is_accepted() {
        let json = r#"{
            "id": "resume_1",
            "name": "Base",
            "data": {"basics": {"name": "Ada"}},
            "dateCreated": "2024-01-01T00:00:00Z",
            "dateModified": "2024-01-01T00:00:00Z"
        }"#;
        let resume: Resume = serde_json::from_str(json).unwrap();
        assert_eq!(resume.candidate_name(), Some("Ada"));
        assert!(resume.metadata.is_none());
    }

    #[test]
    fn test_serializes_content_key() {
        let resume = Resume::new("Base", json!({"skills": []}));
        let value = serde_json::to_value(&resume).unwrap();
        assert_eq!(value["content"], json!({"skills": []}));
        assert!(value.get("data").is_none());
        assert!(value["id"].as_str().unwrap().starts_with("resume_"));
    }
}
