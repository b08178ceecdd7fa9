//! Extraction of typed payloads from arbitrarily-shaped AI responses.
//!
//! Everything here is a pure function over `&serde_json::Value`. A miss is
//! `None` (or an empty list), never an error or a panic; callers decide what
//! a miss means.

mod fields;
pub mod json;
mod resume;

pub use fields::{
    extract_metadata, parse_changes, parse_cover_letter, parse_key_points, parse_match_analysis,
    ResponseMetadata,
};
pub use resume::{is_resume_object, parse_tailored_resume, validate_resume_structure, ResumeValidation};
