// Prompt templates for every AI operation.
// Templates carry `{placeholder}` markers that `build_prompt` fills in.

use serde_json::Value;

use crate::models::JobInfo;

use super::{AiOperation, AiPayload};

/// System prompt that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

pub const TEST_API_KEY_PROMPT: &str = r#"Respond with exactly: "API key test successful""#;

/// Tailoring prompt. Replace `{job_description}`, `{resume}`,
/// `{analysis_schema}` and `{analysis_focus}`.
pub const TAILOR_RESUME_TEMPLATE: &str = r#"You are an expert resume writer. Please tailor the following resume to match the job description provided.

JOB DESCRIPTION:
{job_description}

CURRENT RESUME:
{resume}

Please provide your response as a JSON object with this exact structure:
{
  "tailoredResume": {
    // The complete tailored resume in JSON Resume format
  },
  "changes": [
    // Array of strings describing what changes were made
  ]{analysis_schema}
}

Focus on:
1. Highlighting relevant experience and skills
2. Using keywords from the job description
3. Quantifying achievements where possible
4. Maintaining truthfulness - only emphasize existing experience
{analysis_focus}"#;

const TAILOR_ANALYSIS_SCHEMA: &str = r#",
  "analysis": {
    "matchScore": 85,
    "strengths": [],
    "improvements": [],
    "missingSkills": []
  }"#;

/// Cover letter prompt. Replace `{company}`, `{position}`, `{location}`,
/// `{job_description}`, `{resume}`, `{analysis_schema}` and `{analysis_focus}`.
pub const COVER_LETTER_TEMPLATE: &str = r#"You are an expert cover letter writer. Please generate a compelling cover letter based on the resume and job information provided.

JOB INFORMATION:
Company: {company}
Position: {position}
Location: {location}

JOB DESCRIPTION:
{job_description}

RESUME:
{resume}

Please provide your response as a JSON object with this exact structure:
{
  "coverLetter": "The complete cover letter text here...",
  "keyPoints": [
    // Array of key selling points highlighted in the letter
  ]{analysis_schema}
}

Requirements:
1. Professional tone appropriate for the industry
2. Highlight relevant experience from the resume
3. Address the specific job requirements
4. Show enthusiasm and knowledge about the company
5. Include a strong opening and closing
{analysis_focus}"#;

const COVER_LETTER_ANALYSIS_SCHEMA: &str = r#",
  "analysis": {
    "matchScore": 85,
    "alignedSkills": [],
    "uniqueValue": "",
    "recommendations": []
  }"#;

/// Match analysis prompt. Replace `{job_description}` and `{resume}`.
pub const MATCH_ANALYSIS_TEMPLATE: &str = r#"You are an expert career counselor. Please analyze how well this resume matches the job description and provide detailed feedback.

JOB DESCRIPTION:
{job_description}

RESUME:
{resume}

Please provide your response as a JSON object with this exact structure:
{
  "analysis": {
    "overallScore": 85,
    "skillsMatch": {
      "score": 80,
      "matchedSkills": [],
      "missingSkills": []
    },
    "experienceMatch": {
      "score": 90,
      "relevantExperience": [],
      "gaps": []
    },
    "recommendations": [
      // Specific suggestions for improving the match
    ],
    "strengths": [
      // What makes this candidate strong for this role
    ],
    "concerns": [
      // Potential areas of concern or weakness
    ]
  }
}

Provide honest, constructive analysis that will help the candidate understand their fit and improve their application."#;

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn or_na(s: Option<&str>) -> &str {
    match s {
        Some(s) if !s.trim().is_empty() => s,
        _ => "N/A",
    }
}

/// Renders the user prompt for `operation`.
pub fn build_prompt(operation: AiOperation, payload: &AiPayload) -> String {
    let resume = pretty(&payload.resume);
    let analysis = payload.include_analysis;

    match operation {
        AiOperation::TailorResume => TAILOR_RESUME_TEMPLATE
            .replace("{job_description}", &payload.job_description)
            .replace("{resume}", &resume)
            .replace("{analysis_schema}", if analysis { TAILOR_ANALYSIS_SCHEMA } else { "" })
            .replace(
                "{analysis_focus}",
                if analysis { "5. Providing detailed match analysis and recommendations" } else { "" },
            ),
        AiOperation::GenerateCoverLetter => {
            let info: Option<&JobInfo> = payload.job_info.as_ref();
            COVER_LETTER_TEMPLATE
                .replace("{company}", or_na(info.map(|i| i.company.as_str())))
                .replace("{position}", or_na(info.map(|i| i.title.as_str())))
                .replace("{location}", or_na(info.map(|i| i.location.as_str())))
                .replace("{job_description}", &payload.job_description)
                .replace("{resume}", &resume)
                .replace("{analysis_schema}", if analysis { COVER_LETTER_ANALYSIS_SCHEMA } else { "" })
                .replace(
                    "{analysis_focus}",
                    if analysis { "6. Provide detailed analysis of job-candidate fit" } else { "" },
                )
        }
        AiOperation::AnalyzeMatch => MATCH_ANALYSIS_TEMPLATE
            .replace("{job_description}", &payload.job_description)
            .replace("{resume}", &resume),
        AiOperation::TestApiKey => TEST_API_KEY_PROMPT.to_string(),
    }
}

/// System prompt paired with `operation`, if any.
pub fn system_prompt(operation: AiOperation) -> Option<&'static str> {
    match operation {
        AiOperation::TestApiKey => None,
        _ => Some(JSON_ONLY_SYSTEM),
    }
}
