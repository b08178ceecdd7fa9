//! The root document held by the global store, and partial updates to it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{CoverLetter, Job, LogEntry, Resume, Settings};

/// Top-level keys of [`StoreState`]. A change is always reported at this
/// granularity; nested values are replaced wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKey {
    Jobs,
    Resumes,
    CurrentJob,
    CurrentResume,
    CoverLetters,
    Logs,
    Settings,
    Ui,
}

impl StateKey {
    pub const ALL: [StateKey; 8] = [
        StateKey::Jobs,
        StateKey::Resumes,
        StateKey::CurrentJob,
        StateKey::CurrentResume,
        StateKey::CoverLetters,
        StateKey::Logs,
        StateKey::Settings,
        StateKey::Ui,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKey::Jobs => "jobs",
            StateKey::Resumes => "resumes",
            StateKey::CurrentJob => "currentJob",
            StateKey::CurrentResume => "currentResume",
            StateKey::CoverLetters => "coverLetters",
            StateKey::Logs => "logs",
            StateKey::Settings => "settings",
            StateKey::Ui => "ui",
        }
    }

    /// Storage key this top-level key is snapshotted under, if any.
    pub fn snapshot_key(&self) -> Option<&'static str> {
        match self {
            StateKey::Jobs => Some("saved_jobs"),
            StateKey::Resumes => Some("saved_resumes"),
            StateKey::CoverLetters => Some("cover_letters"),
            StateKey::Logs => Some("activity_logs"),
            StateKey::Settings => Some("app_settings"),
            StateKey::CurrentJob | StateKey::CurrentResume | StateKey::Ui => None,
        }
    }

    pub fn from_path_segment(segment: &str) -> Option<Self> {
        StateKey::ALL.into_iter().find(|k| k.as_str() == segment)
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UiState {
    pub active_view: String,
    pub selected_job_id: Option<String>,
    pub selected_resume_id: Option<String>,
    pub is_loading: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            active_view: "jobs".to_string(),
            selected_job_id: None,
            selected_resume_id: None,
            is_loading: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreState {
    pub jobs: BTreeMap<String, Job>,
    pub resumes: Vec<Resume>,
    pub current_job: Option<Job>,
    pub current_resume: Option<Resume>,
    pub cover_letters: Vec<CoverLetter>,
    pub logs: Vec<LogEntry>,
    pub settings: Settings,
    pub ui: UiState,
}

impl StoreState {
    pub fn find_resume(&self, id: &str) -> Option<&Resume> {
        self.resumes.iter().find(|r| r.id == id)
    }

    /// Structural problems that the type system cannot rule out.
    pub fn validate(&self, max_logs: usize) -> StateValidation {
        let mut errors = Vec::new();

        for (key, job) in &self.jobs {
            if key != &job.id {
                errors.push(format!("jobs entry '{}' holds job with id '{}'", key, job.id));
            }
            if let Some(last) = job.status_history.last() {
                if last.to != job.status {
                    errors.push(format!(
                        "job '{}' status '{}' does not match last history entry '{}'",
                        job.id, job.status, last.to
                    ));
                }
            }
        }

        let mut seen = HashSet::new();
        for resume in &self.resumes {
            if !seen.insert(resume.id.as_str()) {
                errors.push(format!("duplicate resume id '{}'", resume.id));
            }
        }

        let mut seen = HashSet::new();
        for letter in &self.cover_letters {
            if !seen.insert(letter.id.as_str()) {
                errors.push(format!("duplicate cover letter id '{}'", letter.id));
            }
        }

        if self.logs.len() > max_logs {
            errors.push(format!(
                "{} log entries exceed the cap of {}",
                self.logs.len(),
                max_logs
            ));
        }

        StateValidation {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Partial update
// ────────────────────────────────────────────────────────────────────────────

/// A shallow patch: every `Some` field replaces the matching top-level key.
#[derive(Debug, Clone, Default)]
pub struct StatePatch {
    pub jobs: Option<BTreeMap<String, Job>>,
    pub resumes: Option<Vec<Resume>>,
    pub current_job: Option<Option<Job>>,
    pub current_resume: Option<Option<Resume>>,
    pub cover_letters: Option<Vec<CoverLetter>>,
    pub logs: Option<Vec<LogEntry>>,
    pub settings: Option<Settings>,
    pub ui: Option<UiState>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(mut self, jobs: BTreeMap<String, Job>) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn resumes(mut self, resumes: Vec<Resume>) -> Self {
        self.resumes = Some(resumes);
        self
    }

    pub fn current_job(mut self, job: Option<Job>) -> Self {
        self.current_job = Some(job);
        self
    }

    pub fn current_resume(mut self, resume: Option<Resume>) -> Self {
        self.current_resume = Some(resume);
        self
    }

    pub fn cover_letters(mut self, letters: Vec<CoverLetter>) -> Self {
        self.cover_letters = Some(letters);
        self
    }

    pub fn logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn ui(mut self, ui: UiState) -> Self {
        self.ui = Some(ui);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changed_keys().is_empty()
    }

    pub fn changed_keys(&self) -> Vec<StateKey> {
        let present = [
            (StateKey::Jobs, self.jobs.is_some()),
            (StateKey::Resumes, self.resumes.is_some()),
            (StateKey::CurrentJob, self.current_job.is_some()),
            (StateKey::CurrentResume, self.current_resume.is_some()),
            (StateKey::CoverLetters, self.cover_letters.is_some()),
            (StateKey::Logs, self.logs.is_some()),
            (StateKey::Settings, self.settings.is_some()),
            (StateKey::Ui, self.ui.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(key, set)| set.then_some(key))
            .collect()
    }

    pub(crate) fn apply_to(self, state: &mut StoreState) {
        if let Some(jobs) = self.jobs {
            state.jobs = jobs;
        }
        if let Some(resumes) = self.resumes {
            state.resumes = resumes;
        }
        if let Some(job) = self.current_job {
            state.current_job = job;
        }
        if let Some(resume) = self.current_resume {
            state.current_resume = resume;
        }
        if let Some(letters) = self.cover_letters {
            state.cover_letters = letters;
        }
        if let Some(logs) = self.logs {
            state.logs = logs;
        }
        if let Some(settings) = self.settings {
            state.settings = settings;
        }
        if let Some(ui) = self.ui {
            state.ui = ui;
        }
    }
}
