use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoverLetterMetadata {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub ai_generated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverLetter {
    pub id: String,
    /// Weak reference; the job may have been deleted since.
    #[serde(default)]
    pub job_id: Option<String>,
    /// Weak reference; the resume may have been deleted since.
    #[serde(default)]
    pub resume_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub key_points: Vec<String>,
    #[serde(default)]
    pub analysis: Option<Value>,
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub metadata: CoverLetterMetadata,
}
