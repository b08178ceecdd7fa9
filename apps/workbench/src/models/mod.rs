pub mod cover_letter;
pub mod job;
pub mod log;
pub mod resume;
pub mod settings;

pub use cover_letter::{CoverLetter, CoverLetterMetadata};
pub use job::{AiMatch, Job, JobInfo, JobStatus, StatusChange};
pub use log::{LogEntry, LogType};
pub use resume::{Resume, ResumeDocument, ResumeMetadata};
pub use settings::{ApiProviders, Preferences, Provider, ProviderSettings, Settings};
