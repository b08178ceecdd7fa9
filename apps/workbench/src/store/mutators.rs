//! Convenience reads and writes over [`GlobalStore`], each write under its
//! own source tag.

use chrono::Utc;

use super::{GlobalStore, StatePatch, StoreError};
use crate::models::{CoverLetter, Job, JobStatus, LogEntry, Resume, Settings};

impl GlobalStore {
    // ── reads ───────────────────────────────────────────────────────────────

    pub fn jobs(&self) -> Vec<Job> {
        self.get_state()
            .map(|s| s.jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.get_state()?.jobs.get(id).cloned()
    }

    pub fn resumes(&self) -> Vec<Resume> {
        self.get_state()
            .map(|s| s.resumes.clone())
            .unwrap_or_default()
    }

    pub fn get_resume(&self, id: &str) -> Option<Resume> {
        self.get_state()?.find_resume(id).cloned()
    }

    pub fn cover_letters(&self) -> Vec<CoverLetter> {
        self.get_state()
            .map(|s| s.cover_letters.clone())
            .unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.get_state().map(|s| s.logs.clone()).unwrap_or_default()
    }

    pub fn settings(&self) -> Settings {
        self.get_state()
            .map(|s| s.settings.clone())
            .unwrap_or_default()
    }

    pub fn current_job(&self) -> Option<Job> {
        self.get_state()?.current_job.clone()
    }

    pub fn current_resume(&self) -> Option<Resume> {
        self.get_state()?.current_resume.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.get_state().is_some_and(|s| s.ui.is_loading)
    }

    // ── jobs ────────────────────────────────────────────────────────────────

    /// Inserts the job, replacing any record with the same id. A replaced
    /// current job is refreshed too.
    pub fn add_job(&self, job: Job) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "addJob");
        };
        let mut patch = StatePatch::new();
        if state.current_job.as_ref().is_some_and(|j| j.id == job.id) {
            patch = patch.current_job(Some(job.clone()));
        }
        let mut jobs = state.jobs.clone();
        jobs.insert(job.id.clone(), job);
        self.set_state(patch.jobs(jobs), "addJob")
    }

    /// Applies `update` to a copy of the job and stores it, keeping the
    /// current-job copy in sync. Returns `false` when no such job exists.
    pub fn update_job(&self, id: &str, update: impl FnOnce(&mut Job)) -> Result<bool, StoreError> {
        self.replace_job(id, "updateJob", |job| {
            update(job);
            job.date_updated = Utc::now();
        })
    }

    /// Status change through the history-keeping path.
    pub fn update_job_status(
        &self,
        id: &str,
        status: JobStatus,
        notes: &str,
    ) -> Result<bool, StoreError> {
        self.replace_job(id, "updateJobStatus", |job| {
            job.transition(status, notes, Utc::now())
        })
    }

    fn replace_job(
        &self,
        id: &str,
        source: &str,
        update: impl FnOnce(&mut Job),
    ) -> Result<bool, StoreError> {
        let Some(state) = self.get_state() else {
            return Ok(false);
        };
        let Some(existing) = state.jobs.get(id) else {
            return Ok(false);
        };

        let mut job = existing.clone();
        update(&mut job);
        job.id = id.to_string();

        let mut patch = StatePatch::new();
        if state.current_job.as_ref().is_some_and(|j| j.id == id) {
            patch = patch.current_job(Some(job.clone()));
        }
        let mut jobs = state.jobs.clone();
        jobs.insert(job.id.clone(), job);

        self.set_state(patch.jobs(jobs), source)?;
        Ok(true)
    }

    pub fn delete_job(&self, id: &str) -> Result<bool, StoreError> {
        let Some(state) = self.get_state() else {
            return Ok(false);
        };
        if !state.jobs.contains_key(id) {
            return Ok(false);
        }

        let mut jobs = state.jobs.clone();
        jobs.remove(id);
        let mut patch = StatePatch::new().jobs(jobs);
        if state.current_job.as_ref().is_some_and(|j| j.id == id) {
            let mut ui = state.ui.clone();
            ui.selected_job_id = None;
            patch = patch.current_job(None).ui(ui);
        }

        self.set_state(patch, "deleteJob")?;
        Ok(true)
    }

    pub fn set_current_job(&self, job: Option<Job>) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "setCurrentJob");
        };
        let mut ui = state.ui.clone();
        ui.selected_job_id = job.as_ref().map(|j| j.id.clone());
        self.set_state(StatePatch::new().current_job(job).ui(ui), "setCurrentJob")
    }

    // ── resumes ─────────────────────────────────────────────────────────────

    pub fn add_resume(&self, resume: Resume) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "addResume");
        };
        let mut resumes = state.resumes.clone();
        resumes.push(resume);
        self.set_state(StatePatch::new().resumes(resumes), "addResume")
    }

    pub fn update_resume(
        &self,
        id: &str,
        update: impl FnOnce(&mut Resume),
    ) -> Result<bool, StoreError> {
        let Some(state) = self.get_state() else {
            return Ok(false);
        };
        let Some(index) = state.resumes.iter().position(|r| r.id == id) else {
            return Ok(false);
        };

        let mut resumes = state.resumes.clone();
        let resume = &mut resumes[index];
        update(resume);
        resume.id = id.to_string();
        resume.date_modified = Utc::now();

        let mut patch = StatePatch::new();
        if state.current_resume.as_ref().is_some_and(|r| r.id == id) {
            patch = patch.current_resume(Some(resumes[index].clone()));
        }

        self.set_state(patch.resumes(resumes), "updateResume")?;
        Ok(true)
    }

    /// Removes the resume and clears every job and pointer that referenced
    /// it. Cover letters keep their `resumeId`.
    pub fn delete_resume(&self, id: &str) -> Result<bool, StoreError> {
        let Some(state) = self.get_state() else {
            return Ok(false);
        };
        if state.find_resume(id).is_none() {
            return Ok(false);
        }

        let resumes = state.resumes.iter().filter(|r| r.id != id).cloned().collect();
        let mut patch = StatePatch::new().resumes(resumes);

        if state.jobs.values().any(|j| j.resume_id.as_deref() == Some(id)) {
            let mut jobs = state.jobs.clone();
            for job in jobs.values_mut() {
                if job.resume_id.as_deref() == Some(id) {
                    job.resume_id = None;
                }
            }
            patch = patch.jobs(jobs);
        }
        if let Some(current) = &state.current_job {
            if current.resume_id.as_deref() == Some(id) {
                let mut job = current.clone();
                job.resume_id = None;
                patch = patch.current_job(Some(job));
            }
        }
        if state.current_resume.as_ref().is_some_and(|r| r.id == id) {
            let mut ui = state.ui.clone();
            ui.selected_resume_id = None;
            patch = patch.current_resume(None).ui(ui);
        }

        self.set_state(patch, "deleteResume")?;
        Ok(true)
    }

    pub fn set_current_resume(&self, resume: Option<Resume>) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "setCurrentResume");
        };
        let mut ui = state.ui.clone();
        ui.selected_resume_id = resume.as_ref().map(|r| r.id.clone());
        self.set_state(
            StatePatch::new().current_resume(resume).ui(ui),
            "setCurrentResume",
        )
    }

    // ── cover letters, logs, settings, ui ───────────────────────────────────

    pub fn add_cover_letter(&self, letter: CoverLetter) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "addCoverLetter");
        };
        let mut letters = state.cover_letters.clone();
        letters.push(letter);
        self.set_state(StatePatch::new().cover_letters(letters), "addCoverLetter")
    }

    /// Appends a log entry; the oldest entries are evicted past `max_logs`.
    pub fn add_log(&self, entry: LogEntry) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "addLog");
        };
        let mut logs = state.logs.clone();
        logs.push(entry);
        self.set_state(StatePatch::new().logs(logs), "addLog")
    }

    pub fn update_settings(&self, update: impl FnOnce(&mut Settings)) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "updateSettings");
        };
        let mut settings = state.settings.clone();
        update(&mut settings);
        self.set_state(StatePatch::new().settings(settings), "updateSettings")
    }

    pub fn set_loading(&self, loading: bool) -> Result<(), StoreError> {
        let Some(state) = self.get_state() else {
            return self.set_state(StatePatch::new(), "setLoading");
        };
        let mut ui = state.ui.clone();
        ui.is_loading = loading;
        self.set_state(StatePatch::new().ui(ui), "setLoading")
    }

    /// Raises the loading flag for one more in-flight operation.
    pub fn begin_loading(&self) -> Result<(), StoreError> {
        self.in_flight.set(self.in_flight.get() + 1);
        self.set_loading(true)
    }

    /// Ends one in-flight operation; the flag drops with the last of them.
    pub fn end_loading(&self) -> Result<(), StoreError> {
        let remaining = self.in_flight.get().saturating_sub(1);
        self.in_flight.set(remaining);
        if remaining == 0 {
            self.set_loading(false)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::ids::{generate_id, LOG_PREFIX};
    use crate::models::LogType;
    use crate::store::{GlobalStore, StoreOptions};

    use super::*;

    fn ready_store() -> GlobalStore {
        let store = GlobalStore::new(StoreOptions::default());
        store.initialize();
        store
    }

    #[test]
    fn test_status_history_tracks_each_transition() {
        let store = ready_store();
        let job = Job::new("Engineer", "Acme");
        let id = job.id.clone();
        store.add_job(job).unwrap();

        for status in [JobStatus::Applied, JobStatus::Interviewing, JobStatus::Offered] {
            assert!(store.update_job_status(&id, status, "").unwrap());
        }

        let job = store.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Offered);
        assert_eq!(job.status_history.len(), 3);
        assert_eq!(job.status_history.last().unwrap().to, job.status);
        assert_eq!(job.status_history[0].from, JobStatus::Saved);
        assert!(job.date_applied.is_some());
        assert!(store.validate_state().unwrap().valid);
    }

    #[test]
    fn test_add_job_replacing_current_refreshes_pointer() {
        let store = ready_store();
        let job = Job::new("Engineer", "Acme");
        store.add_job(job.clone()).unwrap();
        store.set_current_job(Some(job.clone())).unwrap();

        let mut renamed = job.clone();
        renamed.title = "Staff Engineer".to_string();
        store.add_job(renamed).unwrap();

        assert_eq!(store.jobs().len(), 1);
        assert_eq!(store.current_job().unwrap().title, "Staff Engineer");
        assert_eq!(store.get_job(&job.id), store.current_job());

        let other = Job::new("Designer", "Globex");
        store.add_job(other).unwrap();
        assert_eq!(store.current_job().unwrap().id, job.id);
    }

    #[test]
    fn test_loading_flag_waits_for_last_operation() {
        let store = ready_store();
        store.begin_loading().unwrap();
        store.begin_loading().unwrap();

        store.end_loading().unwrap();
        assert!(store.is_loading());
        store.end_loading().unwrap();
        assert!(!store.is_loading());

        store.end_loading().unwrap();
        assert!(!store.is_loading());
    }

    #[test]
    fn test_date_applied_is_set_once() {
        let store = ready_store();
        let job = Job::new("Engineer", "Acme");
        let id = job.id.clone();
        store.add_job(job).unwrap();

        store.update_job_status(&id, JobStatus::Applied, "first").unwrap();
        let first = store.get_job(&id).unwrap().date_applied;
        store.update_job_status(&id, JobStatus::Rejected, "").unwrap();
        store.update_job_status(&id, JobStatus::Applied, "again").unwrap();

        assert_eq!(store.get_job(&id).unwrap().date_applied, first);
    }

    #[test]
    fn test_log_cap_evicts_oldest() {
        let store = GlobalStore::new(StoreOptions {
            max_logs: 100,
            ..StoreOptions::default()
        });
        store.initialize();

        for i in 0..101 {
            let entry = LogEntry::new(
                format!("{}-{i}", generate_id(LOG_PREFIX)),
                LogType::System,
                format!("entry {i}"),
                json!({}),
            );
            store.add_log(entry).unwrap();
        }

        let logs = store.logs();
        assert_eq!(logs.len(), 100);
        assert_eq!(logs[0].action, "entry 1");
        assert_eq!(logs[99].action, "entry 100");
    }

    #[test]
    fn test_update_job_refreshes_current_copy() {
        let store = ready_store();
        let job = Job::new("Engineer", "Acme");
        let id = job.id.clone();
        store.add_job(job.clone()).unwrap();
        store.set_current_job(Some(job)).unwrap();

        store.update_job(&id, |j| j.notes = "call back".to_string()).unwrap();
        assert_eq!(store.current_job().unwrap().notes, "call back");
        assert!(!store.update_job("missing", |_| {}).unwrap());
    }

    #[test]
    fn test_delete_job_clears_selection() {
        let store = ready_store();
        let job = Job::new("Engineer", "Acme");
        let id = job.id.clone();
        store.add_job(job.clone()).unwrap();
        store.set_current_job(Some(job)).unwrap();
        assert_eq!(store.get_state().unwrap().ui.selected_job_id.as_deref(), Some(id.as_str()));

        assert!(store.delete_job(&id).unwrap());
        assert!(store.current_job().is_none());
        assert!(store.get_state().unwrap().ui.selected_job_id.is_none());
        assert!(!store.delete_job(&id).unwrap());
    }

    #[test]
    fn test_delete_resume_clears_weak_references() {
        let store = ready_store();
        let resume = Resume::new("Base", json!({"basics": {"name": "Ada"}}));
        let resume_id = resume.id.clone();
        store.add_resume(resume.clone()).unwrap();
        store.set_current_resume(Some(resume)).unwrap();

        let mut job = Job::new("Engineer", "Acme");
        job.resume_id = Some(resume_id.clone());
        let job_id = job.id.clone();
        store.add_job(job.clone()).unwrap();
        store.set_current_job(Some(job)).unwrap();

        assert!(store.delete_resume(&resume_id).unwrap());
        assert!(store.get_resume(&resume_id).is_none());
        assert!(store.get_job(&job_id).unwrap().resume_id.is_none());
        assert!(store.current_job().unwrap().resume_id.is_none());
        assert!(store.current_resume().is_none());
    }

    #[test]
    fn test_update_resume_bumps_modified_date() {
        let store = ready_store();
        let resume = Resume::new("Base", json!({}));
        let id = resume.id.clone();
        let created = resume.date_modified;
        store.add_resume(resume).unwrap();

        assert!(store.update_resume(&id, |r| r.name = "Renamed".to_string()).unwrap());
        let stored = store.get_resume(&id).unwrap();
        assert_eq!(stored.name, "Renamed");
        assert!(stored.date_modified >= created);
    }
}
