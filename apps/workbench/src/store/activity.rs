//! Activity log helpers layered on [`GlobalStore::add_log`].

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::{GlobalStore, StoreError};
use crate::ids::{generate_id, LOG_PREFIX};
use crate::models::{LogEntry, LogType};

pub fn record(
    store: &GlobalStore,
    log_type: LogType,
    action: &str,
    details: Value,
) -> Result<LogEntry, StoreError> {
    let entry = LogEntry::new(generate_id(LOG_PREFIX), log_type, action, details);
    store.add_log(entry.clone())?;
    Ok(entry)
}

/// Records one provider round-trip. `error` wins over `response`.
pub fn log_api_call(
    store: &GlobalStore,
    api_type: &str,
    prompt: &str,
    response: Option<&str>,
    job_id: Option<&str>,
    error: Option<&str>,
) -> Result<LogEntry, StoreError> {
    let response = if error.is_some() { None } else { response };
    let details = json!({
        "apiType": api_type,
        "prompt": prompt,
        "response": response,
        "error": error,
        "success": error.is_none(),
        "jobId": job_id,
    });
    record(store, LogType::ApiCall, "api_request", details)
}

pub fn log_job_action(
    store: &GlobalStore,
    action: &str,
    job_id: &str,
    extra: Value,
) -> Result<LogEntry, StoreError> {
    record(store, LogType::JobAction, action, with_id("jobId", job_id, extra))
}

pub fn log_resume_action(
    store: &GlobalStore,
    action: &str,
    resume_id: &str,
    extra: Value,
) -> Result<LogEntry, StoreError> {
    record(
        store,
        LogType::ResumeAction,
        action,
        with_id("resumeId", resume_id, extra),
    )
}

fn with_id(key: &str, id: &str, extra: Value) -> Value {
    let mut details = match extra {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    details.insert(key.to_string(), Value::String(id.to_string()));
    Value::Object(details)
}

pub fn logs_by_type(store: &GlobalStore, log_type: LogType) -> Vec<LogEntry> {
    filter_logs(
        store,
        &LogFilter {
            log_type: Some(log_type),
            ..LogFilter::default()
        },
    )
}

#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub log_type: Option<LogType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Case-insensitive match against the serialized entry.
    pub search: Option<String>,
}

/// Matching entries, newest first.
pub fn filter_logs(store: &GlobalStore, filter: &LogFilter) -> Vec<LogEntry> {
    let needle = filter.search.as_ref().map(|s| s.to_lowercase());
    store
        .logs()
        .into_iter()
        .rev()
        .filter(|log| filter.log_type.map_or(true, |t| log.log_type == t))
        .filter(|log| filter.since.map_or(true, |t| log.timestamp >= t))
        .filter(|log| filter.until.map_or(true, |t| log.timestamp <= t))
        .filter(|log| match &needle {
            Some(needle) => serde_json::to_string(log)
                .map(|s| s.to_lowercase().contains(needle.as_str()))
                .unwrap_or(false),
            None => true,
        })
        .collect()
}
