//! AI operation handlers.
//!
//! Each handler checks the provider configuration before anything else, so a
//! workbench without usable providers never reaches the gateway. After that it
//! requests, parses and persists, in that order.

use serde_json::Value;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::gateway::providers::{build_provider_list, has_valid_api_key};
use crate::gateway::service::AiService;
use crate::gateway::{AiOperation, AiPayload, ProgressFn, ProviderConfig};
use crate::models::{AiMatch, CoverLetter, Job, Provider, Resume};
use crate::parser::json::{get_path, truthy_value};
use crate::parser::{
    extract_metadata, parse_changes, parse_cover_letter, parse_key_points, parse_match_analysis,
    parse_tailored_resume, validate_resume_structure,
};
use crate::persist::{
    associate_cover_letter_with_job, log_ai_operation, save_cover_letter, save_result_to_history,
    save_tailored_resume, HistoryParams, LogOperationParams, SaveCoverLetterParams, SaveOutcome,
    SaveResumeParams, SkippedStep,
};
use crate::store::GlobalStore;

const API_KEY_TEST_REPLY: &str = "API key test successful";

#[derive(Debug)]
pub struct TailorOutcome {
    pub resume: Resume,
    pub changes: Vec<String>,
    pub analysis: Option<Value>,
    pub skipped: Vec<SkippedStep>,
}

#[derive(Debug)]
pub struct CoverLetterOutcome {
    pub letter: CoverLetter,
    pub skipped: Vec<SkippedStep>,
}

#[derive(Debug)]
pub struct MatchOutcome {
    pub analysis: Value,
    pub score: Option<f64>,
    pub skipped: Vec<SkippedStep>,
}

fn has_selection(store: &GlobalStore) -> bool {
    store.current_resume().is_some()
        && store
            .current_job()
            .is_some_and(|job| !job.description.trim().is_empty())
}

pub fn can_tailor_resume(store: &GlobalStore) -> bool {
    has_valid_api_key(&store.settings()) && has_selection(store)
}

pub fn can_generate_cover_letter(store: &GlobalStore) -> bool {
    has_valid_api_key(&store.settings()) && has_selection(store)
}

pub fn can_analyze_match(store: &GlobalStore) -> bool {
    has_valid_api_key(&store.settings()) && has_selection(store)
}

fn selection(store: &GlobalStore) -> Result<(Resume, Job), AppError> {
    let resume = store
        .current_resume()
        .ok_or_else(|| AppError::Validation("No resume selected".to_string()))?;
    let job = store
        .current_job()
        .ok_or_else(|| AppError::Validation("No job selected".to_string()))?;
    if job.description.trim().is_empty() {
        return Err(AppError::Validation(format!(
            "Job '{}' has no description",
            job.title
        )));
    }
    Ok((resume, job))
}

/// Runs one gateway request with the store's loading flag raised until the
/// last overlapping request finishes.
async fn run_request(
    store: &GlobalStore,
    ai: &AiService,
    operation: AiOperation,
    payload: AiPayload,
    progress: Option<ProgressFn>,
) -> Result<Value, AppError> {
    if let Err(e) = store.begin_loading() {
        warn!("Failed to raise loading flag: {}", e);
    }
    let response = ai.request(operation, payload, progress).await;
    if let Err(e) = store.end_loading() {
        warn!("Failed to clear loading flag: {}", e);
    }
    Ok(response?.to_value())
}

fn record_history(store: &GlobalStore, result: &Value, result_type: &str, job: &Job, resume: &Resume) {
    let saved = save_result_to_history(
        store,
        HistoryParams {
            result,
            result_type,
            current_job: Some(job),
            current_resume: Some(resume),
        },
    );
    if let Err(e) = saved {
        warn!(result_type, "Failed to save result to history: {}", e);
    }
}

/// Persistence errors become skipped steps; anything else is only logged.
fn push_skipped(skipped: &mut Vec<SkippedStep>, outcome: Result<(), AppError>) {
    match outcome {
        Ok(()) => {}
        Err(AppError::Persistence { step, source }) => skipped.push(SkippedStep {
            step,
            error: source,
        }),
        Err(e) => warn!("Follow-up step failed: {}", e),
    }
}

pub async fn execute_tailor_resume(
    store: &GlobalStore,
    ai: &AiService,
    progress: Option<ProgressFn>,
) -> Result<TailorOutcome, AppError> {
    let settings = store.settings();
    let provider_list = build_provider_list(&settings)?;
    let (resume, job) = selection(store)?;

    let payload = AiPayload {
        resume: resume.content.clone(),
        job_description: job.description.clone(),
        job_info: Some(job.info()),
        provider_list,
        include_analysis: settings.preferences.include_analysis_in_requests,
    };
    let result = run_request(store, ai, AiOperation::TailorResume, payload, progress).await?;

    let tailored = parse_tailored_resume(&result).ok_or_else(|| {
        AppError::Parse("AI response did not contain a valid tailored resume".to_string())
    })?;
    let validation = validate_resume_structure(&tailored);
    if !validation.valid {
        warn!(errors = ?validation.errors, "Tailored resume is incomplete");
    }
    let changes = parse_changes(&result);
    let analysis = parse_match_analysis(&result);
    let metadata = extract_metadata(&result);

    let SaveOutcome { record, skipped } = save_tailored_resume(
        store,
        SaveResumeParams {
            tailored_resume: tailored,
            current_job: Some(&job),
            current_resume: Some(&resume),
            metadata: &metadata,
        },
    )?;

    log_ai_operation(
        store,
        LogOperationParams {
            operation_type: AiOperation::TailorResume.as_str(),
            result: &result,
            current_job: Some(&job),
            current_resume: Some(&resume),
            resume_id: Some(&record.id),
        },
    );
    record_history(store, &result, "tailor-resume", &job, &resume);

    info!(resume_id = %record.id, job_id = %job.id, changes = changes.len(), "Tailored resume");
    Ok(TailorOutcome {
        resume: record,
        changes,
        analysis,
        skipped,
    })
}

pub async fn execute_generate_cover_letter(
    store: &GlobalStore,
    ai: &AiService,
    progress: Option<ProgressFn>,
) -> Result<CoverLetterOutcome, AppError> {
    let settings = store.settings();
    let provider_list = build_provider_list(&settings)?;
    let (resume, job) = selection(store)?;

    let payload = AiPayload {
        resume: resume.content.clone(),
        job_description: job.description.clone(),
        job_info: Some(job.info()),
        provider_list,
        include_analysis: settings.preferences.include_analysis_in_requests,
    };
    let result =
        run_request(store, ai, AiOperation::GenerateCoverLetter, payload, progress).await?;

    let content = parse_cover_letter(&result).ok_or_else(|| {
        AppError::Parse("AI response did not contain a valid cover letter".to_string())
    })?;
    let metadata = extract_metadata(&result);

    let letter = save_cover_letter(
        store,
        SaveCoverLetterParams {
            cover_letter: content,
            current_job: Some(&job),
            current_resume: Some(&resume),
            key_points: parse_key_points(&result),
            analysis: parse_match_analysis(&result),
            metadata: &metadata,
        },
    )?;

    let mut skipped = Vec::new();
    push_skipped(
        &mut skipped,
        associate_cover_letter_with_job(store, Some(&job), &letter.id),
    );

    log_ai_operation(
        store,
        LogOperationParams {
            operation_type: AiOperation::GenerateCoverLetter.as_str(),
            result: &result,
            current_job: Some(&job),
            current_resume: Some(&resume),
            resume_id: None,
        },
    );
    record_history(store, &result, "cover-letter", &job, &resume);

    info!(cover_letter_id = %letter.id, job_id = %job.id, "Generated cover letter");
    Ok(CoverLetterOutcome { letter, skipped })
}

pub async fn execute_analyze_match(
    store: &GlobalStore,
    ai: &AiService,
    progress: Option<ProgressFn>,
) -> Result<MatchOutcome, AppError> {
    let provider_list = build_provider_list(&store.settings())?;
    let (resume, job) = selection(store)?;

    let payload = AiPayload {
        resume: resume.content.clone(),
        job_description: job.description.clone(),
        job_info: Some(job.info()),
        provider_list,
        include_analysis: true,
    };
    let result = run_request(store, ai, AiOperation::AnalyzeMatch, payload, progress).await?;

    let analysis = parse_match_analysis(&result).ok_or_else(|| {
        AppError::Parse("AI response did not contain a valid match analysis".to_string())
    })?;
    let score = match_score(&analysis);

    let mut skipped = Vec::new();
    let recorded = store.update_job(&job.id, |j| {
        j.ai_match = Some(merge_ai_match(j.ai_match.take().unwrap_or_default(), &analysis, score));
    });
    match recorded {
        Ok(true) => {}
        Ok(false) => warn!(job_id = %job.id, "Current job is not in the store; match not recorded"),
        Err(error) => {
            warn!(job_id = %job.id, "Failed to record match on job: {}", error);
            skipped.push(SkippedStep {
                step: "record match on job",
                error,
            });
        }
    }

    log_ai_operation(
        store,
        LogOperationParams {
            operation_type: AiOperation::AnalyzeMatch.as_str(),
            result: &result,
            current_job: Some(&job),
            current_resume: Some(&resume),
            resume_id: None,
        },
    );
    record_history(store, &result, "match-analysis", &job, &resume);

    info!(job_id = %job.id, score = ?score, "Analyzed match");
    Ok(MatchOutcome {
        analysis,
        score,
        skipped,
    })
}

/// Sends the fixed key-test prompt to a single provider.
pub async fn test_api_key(ai: &AiService, config: ProviderConfig) -> Result<bool, AppError> {
    if config.provider.requires_api_key() && config.api_key.trim().is_empty() {
        return Err(AppError::Validation(
            "API key is required for non-browser providers".to_string(),
        ));
    }
    let provider: Provider = config.provider;
    let payload = AiPayload {
        provider_list: vec![config],
        ..AiPayload::default()
    };
    let response = ai.request(AiOperation::TestApiKey, payload, None).await?;
    let ok = response
        .result
        .as_str()
        .is_some_and(|text| text.contains(API_KEY_TEST_REPLY));
    info!(provider = %provider, ok, "Tested API key");
    Ok(ok)
}

fn match_score(analysis: &Value) -> Option<f64> {
    ["overallScore", "matchScore", "score"]
        .iter()
        .find_map(|key| analysis.get(*key).and_then(Value::as_f64))
}

fn strings_at(value: &Value, path: &str) -> Vec<String> {
    get_path(value, path)
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn merge_ai_match(mut existing: AiMatch, analysis: &Value, score: Option<f64>) -> AiMatch {
    if score.is_some() {
        existing.score = score;
    }
    let matched = strings_at(analysis, "skillsMatch.matchedSkills");
    if !matched.is_empty() {
        existing.matched_keywords = matched;
    }
    let summary = truthy_value(analysis.get("summary"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| strings_at(analysis, "strengths").into_iter().next());
    if summary.is_some() {
        existing.summary = summary;
    }
    existing
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::gateway::{AiGateway, AiResponse, GatewayError, Route};
    use crate::store::StoreOptions;

    /// Answers every request with the same result and counts calls.
    struct ScriptedGateway {
        result: Value,
        calls: AtomicUsize,
    }

    impl ScriptedGateway {
        fn new(result: Value) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl AiGateway for ScriptedGateway {
        async fn request(
            &self,
            _operation: AiOperation,
            payload: &AiPayload,
            _progress: Option<ProgressFn>,
        ) -> Result<AiResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let used = payload.provider_list.first().ok_or(GatewayError::NoProviders)?;
            Ok(AiResponse {
                result: self.result.clone(),
                used_provider: used.provider.to_string(),
                used_model: used.model.clone(),
            })
        }
    }

    /// Answers each operation after its own delay.
    struct DelayedGateway {
        replies: Vec<(AiOperation, Duration, Value)>,
    }

    #[async_trait]
    impl AiGateway for DelayedGateway {
        async fn request(
            &self,
            operation: AiOperation,
            _payload: &AiPayload,
            _progress: Option<ProgressFn>,
        ) -> Result<AiResponse, GatewayError> {
            let (_, delay, result) = self
                .replies
                .iter()
                .find(|(op, _, _)| *op == operation)
                .ok_or_else(|| GatewayError::InvalidRequest(operation.as_str().to_string()))?;
            tokio::time::sleep(*delay).await;
            Ok(AiResponse {
                result: result.clone(),
                used_provider: "claude".to_string(),
                used_model: "claude-3-5-sonnet-20241022".to_string(),
            })
        }
    }

    fn base_resume() -> Value {
        json!({"basics": {"name": "Ada"}, "work": [], "skills": [{"name": "Rust"}]})
    }

    /// Ready store with a selected resume and job, optionally with Claude configured.
    fn workbench(configured: bool) -> (GlobalStore, Resume, Job) {
        let store = GlobalStore::new(StoreOptions::default());
        store.initialize();
        if configured {
            store
                .update_settings(|s| {
                    s.api_providers.claude.enabled = true;
                    s.api_providers.claude.api_key = "sk-test".to_string();
                })
                .unwrap();
        }

        let resume = Resume::new("Base", base_resume());
        store.add_resume(resume.clone()).unwrap();
        store.set_current_resume(Some(resume.clone())).unwrap();

        let mut job = Job::new("Engineer", "Acme");
        job.description = "Write Rust services".to_string();
        store.add_job(job.clone()).unwrap();
        store.set_current_job(Some(job.clone())).unwrap();
        (store, resume, job)
    }

    #[tokio::test]
    async fn test_tailor_resume_end_to_end() {
        let (store, base, job) = workbench(true);
        let gateway = ScriptedGateway::new(json!({
            "tailoredResume": {"basics": {"name": "Ada"}, "work": [{"name": "Acme"}]},
            "changes": ["Emphasized Rust"]
        }));
        let ai = AiService::new(gateway.clone());

        let outcome = execute_tailor_resume(&store, &ai, None).await.unwrap();

        assert!(outcome.skipped.is_empty());
        assert_eq!(outcome.changes, vec!["Emphasized Rust"]);
        let resumes = store.resumes();
        assert_eq!(resumes.len(), 2);
        assert_ne!(outcome.resume.id, base.id);
        assert!(resumes.iter().any(|r| r.id == outcome.resume.id));
        assert_eq!(
            store.get_job(&job.id).unwrap().resume_id.as_deref(),
            Some(outcome.resume.id.as_str())
        );
        assert_eq!(store.current_resume().unwrap(), outcome.resume);
        assert_eq!(
            outcome.resume.metadata.as_ref().unwrap().provider.as_deref(),
            Some("claude")
        );
        assert!(!store.is_loading());
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_providers_rejected_before_gateway() {
        let (store, _, _) = workbench(false);
        let gateway = ScriptedGateway::new(json!({}));
        let ai = AiService::new(gateway.clone());

        let tailor = execute_tailor_resume(&store, &ai, None).await.unwrap_err();
        let letter = execute_generate_cover_letter(&store, &ai, None).await.unwrap_err();
        let analyze = execute_analyze_match(&store, &ai, None).await.unwrap_err();

        for err in [tailor, letter, analyze] {
            assert!(err.to_string().contains("API providers configured."));
            assert_eq!(err.code(), "NO_PROVIDERS");
        }
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
        assert!(!can_tailor_resume(&store));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_operations_finishing_out_of_order() {
        let (store, _, job) = workbench(true);
        let ai = AiService::new(Arc::new(DelayedGateway {
            replies: vec![
                (
                    AiOperation::TailorResume,
                    Duration::from_secs(5),
                    json!({"tailoredResume": {"basics": {"name": "Ada"}, "work": [{"name": "Acme"}]}}),
                ),
                (
                    AiOperation::GenerateCoverLetter,
                    Duration::from_secs(1),
                    json!({"coverLetter": "Dear Hiring Manager..."}),
                ),
            ],
        }));

        let (tailored, letter) = tokio::join!(
            execute_tailor_resume(&store, &ai, None),
            execute_generate_cover_letter(&store, &ai, None),
        );
        let tailored = tailored.unwrap();
        let letter = letter.unwrap();
        assert!(tailored.skipped.is_empty());
        assert!(letter.skipped.is_empty());

        let record = store.get_job(&job.id).unwrap();
        assert_eq!(record.resume_id.as_deref(), Some(tailored.resume.id.as_str()));
        assert_eq!(record.cover_letter_id.as_deref(), Some(letter.letter.id.as_str()));
        assert_eq!(store.current_job(), Some(record));
        assert_eq!(store.resumes().len(), 2);
        assert_eq!(store.cover_letters().len(), 1);
        assert!(!store.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_stays_raised_until_last_request_finishes() {
        let (store, _, _) = workbench(true);
        let ai = AiService::new(Arc::new(DelayedGateway {
            replies: vec![
                (
                    AiOperation::AnalyzeMatch,
                    Duration::from_secs(1),
                    json!({"analysis": {"overallScore": 70}}),
                ),
                (
                    AiOperation::GenerateCoverLetter,
                    Duration::from_secs(3),
                    json!({"coverLetter": "Dear Hiring Manager..."}),
                ),
            ],
        }));

        let analyze = async {
            let outcome = execute_analyze_match(&store, &ai, None).await;
            let still_loading = store.is_loading();
            (outcome, still_loading)
        };
        let ((analysis, still_loading), letter) =
            tokio::join!(analyze, execute_generate_cover_letter(&store, &ai, None));

        assert_eq!(analysis.unwrap().score, Some(70.0));
        assert!(still_loading);
        letter.unwrap();
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_unparseable_tailor_response_saves_nothing() {
        let (store, _, _) = workbench(true);
        let ai = AiService::new(ScriptedGateway::new(json!("I cannot help with that")));

        let err = execute_tailor_resume(&store, &ai, None).await.unwrap_err();
        assert_eq!(err.to_string(), "AI response did not contain a valid tailored resume");
        assert_eq!(store.resumes().len(), 1);
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_cover_letter_is_saved_and_associated() {
        let (store, resume, job) = workbench(true);
        let ai = AiService::new(ScriptedGateway::new(json!({
            "coverLetter": "Dear Hiring Manager...",
            "keyPoints": ["Rust"]
        })));

        let outcome = execute_generate_cover_letter(&store, &ai, None).await.unwrap();

        assert_eq!(outcome.letter.content, "Dear Hiring Manager...");
        assert_eq!(outcome.letter.key_points, vec!["Rust"]);
        assert_eq!(outcome.letter.resume_id.as_deref(), Some(resume.id.as_str()));
        assert_eq!(
            store.current_job().unwrap().cover_letter_id.as_deref(),
            Some(outcome.letter.id.as_str())
        );
        assert_eq!(store.cover_letters().len(), 1);
        assert_eq!(crate::persist::get_job_cover_letters(&store, &job.id).len(), 1);
        assert_eq!(crate::persist::get_job_ai_history(&store, &job.id).len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_match_records_on_job() {
        let (store, _, job) = workbench(true);
        let ai = AiService::new(ScriptedGateway::new(json!({
            "analysis": {
                "overallScore": 82,
                "skillsMatch": {"score": 80, "matchedSkills": ["Rust", "Tokio"], "missingSkills": []},
                "strengths": ["Systems background"]
            }
        })));

        let outcome = execute_analyze_match(&store, &ai, None).await.unwrap();

        assert_eq!(outcome.score, Some(82.0));
        let ai_match = store.get_job(&job.id).unwrap().ai_match.unwrap();
        assert_eq!(ai_match.score, Some(82.0));
        assert_eq!(ai_match.matched_keywords, vec!["Rust", "Tokio"]);
        assert_eq!(ai_match.summary.as_deref(), Some("Systems background"));
        assert_eq!(store.current_job().unwrap().ai_match.unwrap().score, Some(82.0));
    }

    #[tokio::test]
    async fn test_missing_selection_is_validation_error() {
        let store = GlobalStore::new(StoreOptions::default());
        store.initialize();
        store
            .update_settings(|s| {
                s.api_providers.openai.enabled = true;
                s.api_providers.openai.api_key = "sk".to_string();
            })
            .unwrap();
        let ai = AiService::new(ScriptedGateway::new(json!({})));

        let err = execute_analyze_match(&store, &ai, None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(!can_analyze_match(&store));
    }

    #[tokio::test]
    async fn test_api_key_check() {
        let ai = AiService::new(ScriptedGateway::new(json!("API key test successful")));
        let config = ProviderConfig {
            provider: Provider::Openai,
            api_key: "sk".to_string(),
            model: "gpt-4o".to_string(),
            route: Route::Direct,
        };
        assert!(test_api_key(&ai, config.clone()).await.unwrap());

        let blank = ProviderConfig {
            api_key: String::new(),
            ..config
        };
        assert!(test_api_key(&ai, blank).await.is_err());
    }

    #[test]
    fn test_predicates_with_selection() {
        let (store, _, _) = workbench(true);
        assert!(can_tailor_resume(&store));
        assert!(can_generate_cover_letter(&store));
        assert!(can_analyze_match(&store));
    }
}
