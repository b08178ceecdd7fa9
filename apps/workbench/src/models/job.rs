use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{generate_id, JOB_PREFIX};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Saved,
    Applied,
    Interviewing,
    Offered,
    Accepted,
    Rejected,
    Declined,
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Saved,
        JobStatus::Applied,
        JobStatus::Interviewing,
        JobStatus::Offered,
        JobStatus::Accepted,
        JobStatus::Rejected,
        JobStatus::Declined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Saved => "saved",
            JobStatus::Applied => "applied",
            JobStatus::Interviewing => "interviewing",
            JobStatus::Offered => "offered",
            JobStatus::Accepted => "accepted",
            JobStatus::Rejected => "rejected",
            JobStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let valid: Vec<&str> = JobStatus::ALL.iter().map(|s| s.as_str()).collect();
                format!("Unknown job status '{}'. Valid: {}", s, valid.join(", "))
            })
    }
}

/// One transition recorded by the status-update path. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: JobStatus,
    pub to: JobStatus,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
}

/// AI enrichment attached to a job after a match analysis or import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AiMatch {
    pub score: Option<f64>,
    pub matched_keywords: Vec<String>,
    pub tags: Vec<String>,
    pub skills: Vec<String>,
    pub requirements: Vec<String>,
    pub summary: Option<String>,
    pub source_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    #[serde(default)]
    pub date_applied: Option<DateTime<Utc>>,
    /// Weak reference into `resumes`; may dangle.
    #[serde(default)]
    pub resume_id: Option<String>,
    /// Weak reference into `coverLetters`; may dangle.
    #[serde(default)]
    pub cover_letter_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_match: Option<AiMatch>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ai_documents: BTreeMap<String, Value>,
}

impl Job {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(JOB_PREFIX),
            title: title.into(),
            company: company.into(),
            location: String::new(),
            description: String::new(),
            url: String::new(),
            notes: String::new(),
            status: JobStatus::Saved,
            status_history: Vec::new(),
            date_created: now,
            date_updated: now,
            date_applied: None,
            resume_id: None,
            cover_letter_id: None,
            ai_match: None,
            ai_documents: BTreeMap::new(),
        }
    }

    /// Moves the job to `to`, appending the transition to `status_history`.
    ///
    /// `date_applied` is stamped only the first time the job reaches `applied`.
    pub fn transition(&mut self, to: JobStatus, notes: &str, at: DateTime<Utc>) {
        let from = self.status;
        self.status = to;
        self.date_updated = at;
        self.status_history.push(StatusChange {
            from,
            to,
            date: at,
            notes: notes.to_string(),
        });
        if to == JobStatus::Applied && self.date_applied.is_none() {
            self.date_applied = Some(at);
        }
    }

    /// Title/company/location triple handed to cover letter prompts.
    pub fn info(&self) -> JobInfo {
        JobInfo {
            title: self.title.clone(),
            company: self.company.clone(),
            location: self.location.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub title: String,
    pub company: String,
    pub location: String,
}
