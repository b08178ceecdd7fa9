//! User-visible AI history: `ai_action` log entries and per-job lookups.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::ids::{generate_id, LOG_PREFIX};
use crate::models::{CoverLetter, Job, LogEntry, LogType, Resume};
use crate::parser::json::{get_path, truthy_value};
use crate::store::{GlobalStore, StatePatch};

use super::ensure_ready;

pub struct HistoryParams<'a> {
    pub result: &'a Value,
    /// `tailor-resume`, `cover-letter`, `match-analysis`, ...
    pub result_type: &'a str,
    pub current_job: Option<&'a Job>,
    pub current_resume: Option<&'a Resume>,
}

/// Stores the result as an `ai_action` entry. Results may arrive wrapped in
/// a `data` envelope; its fields win over top-level ones.
pub fn save_result_to_history(
    store: &GlobalStore,
    params: HistoryParams<'_>,
) -> Result<LogEntry, AppError> {
    const STEP: &str = "save result to history";
    ensure_ready(store, STEP)?;

    let result = params.result;
    let details = json!({
        "jobId": params.current_job.map(|j| j.id.as_str()),
        "resumeId": params.current_resume.map(|r| r.id.as_str()),
        "provider": first_truthy(result, &["data.provider", "provider", "usedProvider"]),
        "model": first_truthy(result, &["data.model", "model", "usedModel"]),
        "result": first_truthy(result, &["data.result", "result"]),
    });
    let entry = LogEntry::new(
        generate_id(LOG_PREFIX),
        LogType::AiAction,
        params.result_type,
        details,
    );

    store
        .add_log(entry.clone())
        .map_err(|e| AppError::persistence(STEP, e))?;
    info!(log_id = %entry.id, action = params.result_type, "Saved result to history");
    Ok(entry)
}

fn first_truthy(value: &Value, paths: &[&str]) -> Value {
    paths
        .iter()
        .find_map(|path| truthy_value(get_path(value, path)))
        .cloned()
        .unwrap_or(Value::Null)
}

fn ai_history_where(store: &GlobalStore, key: &str, id: &str) -> Vec<LogEntry> {
    store
        .logs()
        .into_iter()
        .filter(|log| log.log_type == LogType::AiAction && log.detail_str(key) == Some(id))
        .collect()
}

pub fn get_job_ai_history(store: &GlobalStore, job_id: &str) -> Vec<LogEntry> {
    ai_history_where(store, "jobId", job_id)
}

pub fn get_resume_ai_history(store: &GlobalStore, resume_id: &str) -> Vec<LogEntry> {
    ai_history_where(store, "resumeId", resume_id)
}

pub fn get_job_cover_letters(store: &GlobalStore, job_id: &str) -> Vec<CoverLetter> {
    store
        .cover_letters()
        .into_iter()
        .filter(|letter| letter.job_id.as_deref() == Some(job_id))
        .collect()
}

/// Removes one history entry. `false` when no entry has that id or the
/// write was refused.
pub fn delete_ai_history_entry(store: &GlobalStore, log_id: &str) -> bool {
    let logs = store.logs();
    if !logs.iter().any(|log| log.id == log_id) {
        return false;
    }

    let remaining = logs.into_iter().filter(|log| log.id != log_id).collect();
    match store.set_state(StatePatch::new().logs(remaining), "deleteHistoryEntry") {
        Ok(()) => {
            info!(log_id, "Deleted history entry");
            true
        }
        Err(e) => {
            warn!(log_id, "Failed to delete history entry: {}", e);
            false
        }
    }
}
