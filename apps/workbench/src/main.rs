mod config;
mod errors;
mod gateway;
mod ids;
mod models;
mod operations;
mod parser;
mod persist;
mod state;
mod store;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::errors::AppError;
use crate::gateway::providers::{build_provider_list, validate_provider_config};
use crate::gateway::service::AiService;
use crate::gateway::ProgressFn;
use crate::models::{Job, JobStatus, LogType, Provider, Resume};
use crate::state::AppContext;
use crate::store::activity::{self, LogFilter};
use crate::store::GlobalStore;

#[derive(Parser)]
#[command(name = "workbench")]
#[command(about = "Track job applications and tailor resumes with AI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List saved jobs
    Jobs {
        /// Only jobs with this status
        #[arg(short, long)]
        status: Option<JobStatus>,
    },

    /// Save a job posting
    AddJob {
        title: String,
        company: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "")]
        url: String,
        /// Job description text
        #[arg(short, long, conflicts_with = "description_file")]
        description: Option<String>,
        /// Read the job description from a file
        #[arg(long)]
        description_file: Option<PathBuf>,
    },

    /// Move a job to a new status
    Status {
        job_id: String,
        status: JobStatus,
        #[arg(short, long, default_value = "")]
        notes: String,
    },

    /// Import a JSON Resume document
    ImportResume {
        path: PathBuf,
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List resumes
    Resumes,

    /// Tailor a resume to a job
    Tailor {
        job_id: String,
        /// Resume to start from; defaults to the first imported resume
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Generate a cover letter for a job
    CoverLetter {
        job_id: String,
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Analyze how well a resume matches a job
    Analyze {
        job_id: String,
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Show AI history and activity
    History {
        /// Only AI results for this job
        #[arg(short, long)]
        job: Option<String>,
        /// Case-insensitive text filter
        #[arg(short, long)]
        search: Option<String>,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Delete one history entry by id
        #[arg(long, conflicts_with_all = ["job", "search"])]
        delete: Option<String>,
    },

    /// Show configured AI providers
    Providers {
        /// Send a test prompt to each usable provider
        #[arg(long)]
        test: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!("Starting workbench v{}", env!("CARGO_PKG_VERSION"));

    let ctx = AppContext::open(&config)?;
    match run(&ctx, cli.command).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast::<AppError>() {
            Ok(app) => Err(anyhow!("{} [{}]", app.user_message(), app.code())),
            Err(other) => Err(other),
        },
    }
}

async fn run(ctx: &AppContext, command: Commands) -> Result<()> {
    let store: &GlobalStore = &ctx.store;

    match command {
        Commands::Jobs { status } => {
            let jobs: Vec<Job> = store
                .jobs()
                .into_iter()
                .filter(|j| status.map_or(true, |s| j.status == s))
                .collect();
            if jobs.is_empty() {
                println!("No jobs.");
            }
            for job in jobs {
                let score = job
                    .ai_match
                    .as_ref()
                    .and_then(|m| m.score)
                    .map(|s| format!(" match={s:.0}"))
                    .unwrap_or_default();
                println!("{}  [{}] {} @ {}{}", job.id, job.status, job.title, job.company, score);
            }
        }

        Commands::AddJob {
            title,
            company,
            location,
            url,
            description,
            description_file,
        } => {
            let description = match description_file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => description.unwrap_or_default(),
            };
            let mut job = Job::new(title, company);
            job.location = location;
            job.url = url;
            job.description = description;
            let id = job.id.clone();
            store.add_job(job)?;
            record_activity(activity::log_job_action(store, "created", &id, serde_json::Value::Null));
            println!("{id}");
        }

        Commands::Status { job_id, status, notes } => {
            if !store.update_job_status(&job_id, status, &notes)? {
                return Err(AppError::NotFound(format!("job {job_id}")).into());
            }
            record_activity(activity::log_job_action(
                store,
                "status_changed",
                &job_id,
                serde_json::json!({ "status": status }),
            ));
            println!("{job_id} -> {status}");
        }

        Commands::ImportResume { path, name } => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let content: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("{} is not valid JSON", path.display()))?;
            let validation = parser::validate_resume_structure(&content);
            if !validation.valid {
                return Err(AppError::Validation(validation.errors.join("; ")).into());
            }
            let name = name
                .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "Imported Resume".to_string());
            let resume = Resume::new(name, content);
            let id = resume.id.clone();
            store.add_resume(resume)?;
            record_activity(activity::log_resume_action(store, "imported", &id, serde_json::Value::Null));
            println!("{id}");
        }

        Commands::Resumes => {
            let current = store.current_resume().map(|r| r.id);
            for resume in store.resumes() {
                let marker = if current.as_deref() == Some(resume.id.as_str()) { "*" } else { " " };
                let tailored = resume
                    .metadata
                    .as_ref()
                    .and_then(|m| m.tailored_for.as_deref())
                    .map(|job| format!(" (tailored for {job})"))
                    .unwrap_or_default();
                let candidate = resume
                    .candidate_name()
                    .map(|name| format!(" [{name}]"))
                    .unwrap_or_default();
                println!("{marker} {}  {}{}{}", resume.id, resume.name, candidate, tailored);
            }
        }

        Commands::Tailor { job_id, resume } => {
            select(store, &job_id, resume.as_deref())?;
            let outcome = cancellable(&ctx.ai, operations::execute_tailor_resume(store, &ctx.ai, progress())).await?;
            println!("Saved tailored resume {} ({})", outcome.resume.id, outcome.resume.name);
            for change in &outcome.changes {
                println!("  - {change}");
            }
            report_skipped(&outcome.skipped);
        }

        Commands::CoverLetter { job_id, resume } => {
            select(store, &job_id, resume.as_deref())?;
            let outcome =
                cancellable(&ctx.ai, operations::execute_generate_cover_letter(store, &ctx.ai, progress())).await?;
            println!("{}\n", outcome.letter.content);
            println!("Saved cover letter {}", outcome.letter.id);
            report_skipped(&outcome.skipped);
        }

        Commands::Analyze { job_id, resume } => {
            select(store, &job_id, resume.as_deref())?;
            let outcome = cancellable(&ctx.ai, operations::execute_analyze_match(store, &ctx.ai, progress())).await?;
            match outcome.score {
                Some(score) => println!("Match score: {score:.0}"),
                None => println!("Match analysis has no score"),
            }
            println!("{}", serde_json::to_string_pretty(&outcome.analysis)?);
            report_skipped(&outcome.skipped);
        }

        Commands::History {
            job,
            search,
            limit,
            delete,
        } => {
            if let Some(id) = delete {
                if !persist::delete_ai_history_entry(store, &id) {
                    return Err(AppError::NotFound(format!("history entry {id}")).into());
                }
                println!("Deleted {id}");
                return Ok(());
            }

            let entries = match job {
                Some(job_id) => persist::get_job_ai_history(store, &job_id),
                None => activity::filter_logs(
                    store,
                    &LogFilter {
                        search,
                        ..LogFilter::default()
                    },
                ),
            };
            for entry in entries.into_iter().take(limit) {
                println!(
                    "{}  {}  {:<10} {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.id,
                    entry.log_type.as_str(),
                    entry.action
                );
            }
            let ai_actions = activity::logs_by_type(store, LogType::AiAction).len();
            info!(ai_actions, "Listed history");
        }

        Commands::Providers { test } => {
            let settings = store.settings();
            for provider in Provider::ALL {
                let cfg = settings.api_providers.get(provider);
                let model = if cfg.model.trim().is_empty() {
                    gateway::providers::default_model(provider)
                } else {
                    cfg.model.as_str()
                };
                let validation = validate_provider_config(provider.as_str(), &cfg.api_key, model);
                let state = match (cfg.enabled, validation.valid) {
                    (false, _) => "disabled".to_string(),
                    (true, true) => "ready".to_string(),
                    (true, false) => validation.errors.join("; "),
                };
                println!("{:<8} {:<36} {}", provider, model, state);
            }

            if test {
                for config in build_provider_list(&settings).map_err(AppError::from)? {
                    let name = config.provider;
                    match operations::test_api_key(&ctx.ai, config).await {
                        Ok(true) => println!("{name}: ok"),
                        Ok(false) => println!("{name}: unexpected reply"),
                        Err(e) => println!("{name}: {}", e.user_message()),
                    }
                }
            }
        }
    }

    Ok(())
}

/// Makes the job and a resume the selection. Without an explicit resume the
/// current one is kept, or the first imported resume is used.
fn select(store: &GlobalStore, job_id: &str, resume_id: Option<&str>) -> Result<(), AppError> {
    let job = store
        .get_job(job_id)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))?;
    let resume = match resume_id {
        Some(id) => Some(
            store
                .get_resume(id)
                .ok_or_else(|| AppError::NotFound(format!("resume {id}")))?,
        ),
        None => store.current_resume().or_else(|| {
            store
                .resumes()
                .into_iter()
                .find(|r| !r.metadata.as_ref().is_some_and(|m| m.ai_generated))
        }),
    };
    store
        .set_current_job(Some(job))
        .map_err(|e| AppError::persistence("select job", e))?;
    if let Some(resume) = resume {
        store
            .set_current_resume(Some(resume))
            .map_err(|e| AppError::persistence("select resume", e))?;
    }
    Ok(())
}

fn progress() -> Option<ProgressFn> {
    Some(Arc::new(|message: &str| eprintln!("  {message}")))
}

/// Runs an AI operation; Ctrl-C cancels every pending request.
async fn cancellable<T>(
    ai: &AiService,
    operation: impl Future<Output = Result<T, AppError>>,
) -> Result<T, AppError> {
    tokio::pin!(operation);
    tokio::select! {
        result = &mut operation => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; cancelling AI requests");
            ai.cancel_all_requests();
            operation.await
        }
    }
}

fn report_skipped(skipped: &[persist::SkippedStep]) {
    for step in skipped {
        eprintln!("warning: could not {}: {}", step.step, step.error);
    }
}

fn record_activity<T>(result: Result<T, store::StoreError>) {
    if let Err(e) = result {
        warn!("Failed to record activity: {}", e);
    }
}
