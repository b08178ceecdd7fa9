use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    ApiCall,
    JobAction,
    ResumeAction,
    System,
    AiAction,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::ApiCall => "api_call",
            LogType::JobAction => "job_action",
            LogType::ResumeAction => "resume_action",
            LogType::System => "system",
            LogType::AiAction => "ai_action",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    /// Operation-specific payload. Weak references live here as
    /// `jobId` / `resumeId` string fields.
    #[serde(default)]
    pub details: Value,
}

impl LogEntry {
    pub fn new(id: String, log_type: LogType, action: impl Into<String>, details: Value) -> Self {
        Self {
            id,
            log_type,
            action: action.into(),
            timestamp: Utc::now(),
            details,
        }
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.details.get(key).and_then(|v| v.as_str())
    }
}
