//! Turns parsed AI results into store mutations.
//!
//! Every save creates a fresh record with a new id, so repeated or
//! interleaved saves never overwrite each other. Creating the primary record
//! is the only fatal step; links and pointer updates that follow are
//! attempted one by one and reported in [`SaveOutcome::skipped`].

mod history;

use chrono::{Local, Utc};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::ids::{generate_id, COVER_LETTER_PREFIX, RESUME_PREFIX};
use crate::models::{
    CoverLetter, CoverLetterMetadata, Job, LogType, Resume, ResumeDocument, ResumeMetadata,
};
use crate::parser::json::truthy;
use crate::parser::ResponseMetadata;
use crate::store::{activity, GlobalStore, StatePatch, StoreError};

pub use history::{
    delete_ai_history_entry, get_job_ai_history, get_job_cover_letters, get_resume_ai_history,
    save_result_to_history, HistoryParams,
};

const DEFAULT_RESUME_NAME: &str = "Tailored Resume";

/// A secondary step that failed after the primary record was committed.
#[derive(Debug)]
pub struct SkippedStep {
    pub step: &'static str,
    pub error: StoreError,
}

#[derive(Debug)]
pub struct SaveOutcome<T> {
    pub record: T,
    pub skipped: Vec<SkippedStep>,
}

impl<T> SaveOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

fn ensure_ready(store: &GlobalStore, step: &'static str) -> Result<(), AppError> {
    if store.is_ready() {
        Ok(())
    } else {
        Err(AppError::persistence(step, StoreError::NotReady))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tailored resumes
// ────────────────────────────────────────────────────────────────────────────

pub struct SaveResumeParams<'a> {
    pub tailored_resume: ResumeDocument,
    pub current_job: Option<&'a Job>,
    pub current_resume: Option<&'a Resume>,
    pub metadata: &'a ResponseMetadata,
}

/// `"<job title> - <M/D/YYYY>"`, or a default title without a job.
pub fn tailored_resume_name(job: Option<&Job>) -> String {
    let title = job
        .map(|j| j.title.trim())
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_RESUME_NAME);
    format!("{} - {}", title, Local::now().format("%-m/%-d/%Y"))
}

/// Saves the tailored resume as a new record, links it to the current job
/// and makes it the current resume.
pub fn save_tailored_resume(
    store: &GlobalStore,
    params: SaveResumeParams<'_>,
) -> Result<SaveOutcome<Resume>, AppError> {
    const CREATE: &str = "save tailored resume";
    ensure_ready(store, CREATE)?;

    let now = Utc::now();
    let resume = Resume {
        id: generate_id(RESUME_PREFIX),
        name: tailored_resume_name(params.current_job),
        content: params.tailored_resume,
        date_created: now,
        date_modified: now,
        metadata: Some(ResumeMetadata {
            tailored_for: params.current_job.map(|j| j.id.clone()),
            original_resume_id: params.current_resume.map(|r| r.id.clone()),
            provider: Some(params.metadata.provider.clone()),
            model: Some(params.metadata.model.clone()),
            ai_generated: true,
            last_tailored: Some(now),
        }),
    };

    store
        .add_resume(resume.clone())
        .map_err(|e| AppError::persistence(CREATE, e))?;
    info!(resume_id = %resume.id, "Saved tailored resume");

    let mut skipped = Vec::new();

    if let Some(job) = params.current_job {
        let linked = store.update_job(&job.id, |j| {
            j.resume_id = Some(resume.id.clone());
        });
        match linked {
            Ok(true) => info!(job_id = %job.id, resume_id = %resume.id, "Linked resume to job"),
            Ok(false) => warn!(job_id = %job.id, "Current job is not in the store; resume not linked"),
            Err(error) => {
                warn!(job_id = %job.id, "Failed to link resume to job: {}", error);
                skipped.push(SkippedStep {
                    step: "link resume to job",
                    error,
                });
            }
        }
    }

    if let Err(error) = store.set_current_resume(Some(resume.clone())) {
        warn!(resume_id = %resume.id, "Failed to set current resume: {}", error);
        skipped.push(SkippedStep {
            step: "set current resume",
            error,
        });
    }

    Ok(SaveOutcome {
        record: resume,
        skipped,
    })
}

pub struct ApplyChangesParams<'a> {
    pub current_resume: Option<&'a Resume>,
    pub tailored_resume: Option<&'a ResumeDocument>,
    pub current_job: Option<&'a Job>,
}

/// Overwrites the current resume's content in place.
pub fn apply_tailored_changes(
    store: &GlobalStore,
    params: ApplyChangesParams<'_>,
) -> Result<Resume, AppError> {
    let current = params
        .current_resume
        .ok_or_else(|| AppError::Validation("No current resume to update".to_string()))?;
    let tailored = params
        .tailored_resume
        .filter(|v| truthy(v))
        .ok_or_else(|| AppError::Validation("No tailored resume data provided".to_string()))?;
    ensure_ready(store, "apply tailored changes")?;

    let now = Utc::now();
    let mut updated = current.clone();
    updated.content = tailored.clone();
    updated.date_modified = now;
    let mut metadata = updated.metadata.take().unwrap_or_default();
    metadata.tailored_for = params.current_job.map(|j| j.id.clone());
    metadata.last_tailored = Some(now);
    updated.metadata = Some(metadata);

    let mut patch = StatePatch::new().current_resume(Some(updated.clone()));
    if let Some(state) = store.get_state() {
        if state.find_resume(&updated.id).is_some() {
            let resumes = state
                .resumes
                .iter()
                .map(|r| if r.id == updated.id { updated.clone() } else { r.clone() })
                .collect();
            patch = patch.resumes(resumes);
        }
    }

    store
        .set_state(patch, "applyTailoredChanges")
        .map_err(|e| AppError::persistence("apply tailored changes", e))?;
    info!(resume_id = %updated.id, "Applied tailored changes to resume");
    Ok(updated)
}

// ────────────────────────────────────────────────────────────────────────────
// Cover letters
// ────────────────────────────────────────────────────────────────────────────

pub struct SaveCoverLetterParams<'a> {
    pub cover_letter: String,
    pub current_job: Option<&'a Job>,
    pub current_resume: Option<&'a Resume>,
    pub key_points: Vec<String>,
    pub analysis: Option<Value>,
    pub metadata: &'a ResponseMetadata,
}

pub fn save_cover_letter(
    store: &GlobalStore,
    params: SaveCoverLetterParams<'_>,
) -> Result<CoverLetter, AppError> {
    const CREATE: &str = "save cover letter";
    ensure_ready(store, CREATE)?;

    let letter = CoverLetter {
        id: generate_id(COVER_LETTER_PREFIX),
        job_id: params.current_job.map(|j| j.id.clone()),
        resume_id: params.current_resume.map(|r| r.id.clone()),
        content: params.cover_letter,
        key_points: params.key_points,
        analysis: params.analysis.filter(|v| truthy(v)),
        created_date: Utc::now(),
        metadata: CoverLetterMetadata {
            provider: Some(params.metadata.provider.clone()),
            model: Some(params.metadata.model.clone()),
            ai_generated: true,
        },
    };

    store
        .add_cover_letter(letter.clone())
        .map_err(|e| AppError::persistence(CREATE, e))?;
    info!(cover_letter_id = %letter.id, "Saved cover letter");
    Ok(letter)
}

/// Points the job the letter was written for at the letter. The stored
/// record and the current job are read fresh, so changes made while the
/// letter was being generated survive. The current pointer only moves when it
/// still names that job. Without a job this only warns.
pub fn associate_cover_letter_with_job(
    store: &GlobalStore,
    job: Option<&Job>,
    cover_letter_id: &str,
) -> Result<(), AppError> {
    const STEP: &str = "associate cover letter";
    let Some(job) = job else {
        warn!("No current job to associate cover letter with");
        return Ok(());
    };
    let Some(state) = store.get_state() else {
        return Err(AppError::persistence(STEP, StoreError::NotReady));
    };

    let with_letter = |j: &Job| {
        let mut j = j.clone();
        j.cover_letter_id = Some(cover_letter_id.to_string());
        j
    };
    let stored = state.jobs.get(&job.id).map(with_letter);
    let current = state
        .current_job
        .as_ref()
        .filter(|current| current.id == job.id)
        .map(|current| stored.clone().unwrap_or_else(|| with_letter(current)));

    let mut patch = StatePatch::new();
    if let Some(stored) = stored {
        let mut jobs = state.jobs.clone();
        jobs.insert(stored.id.clone(), stored);
        patch = patch.jobs(jobs);
    }
    if let Some(current) = current {
        patch = patch.current_job(Some(current));
    }
    if patch.is_empty() {
        warn!(job_id = %job.id, "Job is neither stored nor current; cover letter not associated");
        return Ok(());
    }

    store
        .set_state(patch, "associateCoverLetter")
        .map_err(|e| AppError::persistence(STEP, e))?;
    info!(job_id = %job.id, cover_letter_id, "Associated cover letter with job");
    Ok(())
}

// ────────────────────────────────────────────────────────────────────────────
// Audit trail
// ────────────────────────────────────────────────────────────────────────────

pub struct LogOperationParams<'a> {
    pub operation_type: &'a str,
    pub result: &'a Value,
    pub current_job: Option<&'a Job>,
    pub current_resume: Option<&'a Resume>,
    pub resume_id: Option<&'a str>,
}

/// Records an `api_call` audit entry. Never fails; problems are only logged.
pub fn log_ai_operation(store: &GlobalStore, params: LogOperationParams<'_>) {
    let field = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|k| params.result.get(*k).filter(|v| truthy(v)).and_then(Value::as_str))
            .unwrap_or("unknown")
            .to_string()
    };
    let provider = field(["usedProvider", "provider"]);
    let model = field(["usedModel", "model"]);

    let details = json!({
        "apiType": provider,
        "operation": params.operation_type,
        "model": model,
        "success": true,
        "jobId": params.current_job.map(|j| j.id.as_str()),
        "resumeId": params.resume_id.or(params.current_resume.map(|r| r.id.as_str())),
    });

    match activity::record(store, LogType::ApiCall, params.operation_type, details) {
        Ok(entry) => info!(log_id = %entry.id, operation = params.operation_type, "Logged AI operation"),
        Err(e) => warn!(operation = params.operation_type, "Failed to log AI operation: {}", e),
    }
}
