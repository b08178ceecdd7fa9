//! AI provider gateway.
//!
//! [`AiGateway`] is the only way the rest of the crate talks to a model. A
//! request carries an ordered provider list; providers are tried in order
//! and the first success wins. [`HttpGateway`](http::HttpGateway) is the
//! network implementation, [`AiService`](service::AiService) adds request
//! tracking, timeouts and cancellation on top of any gateway.

use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;

use crate::models::{JobInfo, Provider};

pub mod http;
pub mod prompts;
pub mod providers;
pub mod service;

/// Progress messages emitted while a request is in flight.
pub type ProgressFn = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("AI provider returned empty content")]
    EmptyContent,

    #[error("Unsupported AI provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("All {count} AI providers failed. Errors: {summary}")]
    AllProvidersFailed { count: usize, summary: String },

    #[error("No valid API providers configured. Please set your API keys in Settings.")]
    NoProviders,

    #[error("AI request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("AI request was cancelled")]
    Cancelled,
}

/// Coarse failure class used to word fallback progress messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Authentication,
    RateLimit,
    Network,
    InvalidRequest,
    Unknown,
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayError::Api { status: 401 | 403, .. } => FailureKind::Authentication,
            GatewayError::Api { status: 429, .. } | GatewayError::RateLimited { .. } => {
                FailureKind::RateLimit
            }
            GatewayError::Api { status: 400 | 422, .. } | GatewayError::InvalidRequest(_) => {
                FailureKind::InvalidRequest
            }
            GatewayError::Http(_) | GatewayError::Timeout { .. } => FailureKind::Network,
            other => classify_message(&other.to_string()),
        }
    }
}

fn classify_message(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["401", "403", "unauthorized", "authentication", "api key"]) {
        FailureKind::Authentication
    } else if has(&["429", "rate limit", "too many requests", "quota"]) {
        FailureKind::RateLimit
    } else if has(&["network", "connection", "timeout", "timed out"]) {
        FailureKind::Network
    } else if has(&["400", "422", "invalid", "bad request"]) {
        FailureKind::InvalidRequest
    } else {
        FailureKind::Unknown
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AiOperation {
    TailorResume,
    GenerateCoverLetter,
    AnalyzeMatch,
    TestApiKey,
}

impl AiOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiOperation::TailorResume => "tailor-resume",
            AiOperation::GenerateCoverLetter => "generate-cover-letter",
            AiOperation::AnalyzeMatch => "analyze-match",
            AiOperation::TestApiKey => "test-api-key",
        }
    }
}

impl fmt::Display for AiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a provider is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Direct call, falling back to the proxy on connection failures.
    #[default]
    Auto,
    Direct,
    Proxy,
    Browser,
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Route::Auto),
            "direct" => Ok(Route::Direct),
            "proxy" => Ok(Route::Proxy),
            "browser" => Ok(Route::Browser),
            other => Err(format!("Unknown route '{}'", other)),
        }
    }
}

impl Route {
    /// Unknown route names fall back to `auto`.
    pub fn parse_lenient(s: &str) -> Route {
        s.parse().unwrap_or_else(|e| {
            warn!("{}; using auto", e);
            Route::Auto
        })
    }
}

/// One entry of the ordered provider list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub route: Route,
}

#[derive(Debug, Clone, Default)]
pub struct AiPayload {
    pub resume: Value,
    pub job_description: String,
    pub job_info: Option<JobInfo>,
    pub provider_list: Vec<ProviderConfig>,
    pub include_analysis: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiResponse {
    /// Decoded model output; raw text when it was not JSON.
    pub result: Value,
    pub used_provider: String,
    pub used_model: String,
}

impl AiResponse {
    /// The `{result, usedProvider, usedModel}` shape the parsers read.
    pub fn to_value(&self) -> Value {
        json!({
            "result": self.result,
            "usedProvider": self.used_provider,
            "usedModel": self.used_model,
        })
    }
}

#[async_trait]
pub trait AiGateway: Send + Sync {
    async fn request(
        &self,
        operation: AiOperation,
        payload: &AiPayload,
        progress: Option<ProgressFn>,
    ) -> Result<AiResponse, GatewayError>;
}

pub(crate) fn report(progress: &Option<ProgressFn>, message: &str) {
    if let Some(progress) = progress {
        progress(message);
    }
}

/// Calls `call` for each provider in order until one succeeds. Every failure
/// is reported through `progress` and collected into the final error.
pub async fn try_providers<'a, T, F, Fut>(
    providers: &'a [ProviderConfig],
    progress: &Option<ProgressFn>,
    mut call: F,
) -> Result<(T, &'a ProviderConfig), GatewayError>
where
    F: FnMut(&'a ProviderConfig) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    if providers.is_empty() {
        return Err(GatewayError::NoProviders);
    }

    let total = providers.len();
    let mut failures = Vec::with_capacity(total);

    for (i, config) in providers.iter().enumerate() {
        let name = config.provider.as_str();
        report(progress, &format!("Trying provider {}/{}: {}...", i + 1, total, name));

        match call(config).await {
            Ok(value) => {
                report(progress, &format!("Successfully connected using {}", name));
                return Ok((value, config));
            }
            Err(e) => {
                warn!(provider = name, "Provider failed: {}", e);
                let message = match e.kind() {
                    FailureKind::Authentication => format!("{} authentication failed, trying next provider...", name),
                    FailureKind::RateLimit => format!("{} rate limited, trying next provider...", name),
                    FailureKind::Network => format!("{} connection failed, trying next provider...", name),
                    FailureKind::InvalidRequest => format!("{} rejected request, trying next provider...", name),
                    FailureKind::Unknown => format!("{} failed with unknown error, trying next provider...", name),
                };
                report(progress, &message);
                failures.push(format!("{}: {}", name, e));
            }
        }
    }

    Err(GatewayError::AllProvidersFailed {
        count: total,
        summary: failures.join("; "),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn config(provider: Provider) -> ProviderConfig {
        ProviderConfig {
            provider,
            api_key: "k".to_string(),
            model: providers::default_model(provider).to_string(),
            route: Route::Auto,
        }
    }

    #[test]
    fn test_classification() {
        let auth = GatewayError::Api { status: 401, message: "nope".into() };
        assert_eq!(auth.kind(), FailureKind::Authentication);
        let limited = GatewayError::Api { status: 429, message: String::new() };
        assert_eq!(limited.kind(), FailureKind::RateLimit);
        assert_eq!(GatewayError::Timeout { secs: 1 }.kind(), FailureKind::Network);
        assert_eq!(
            GatewayError::UnsupportedProvider("browser".into()).kind(),
            FailureKind::Unknown
        );
        assert_eq!(
            GatewayError::Api { status: 500, message: "invalid api key".into() }.kind(),
            FailureKind::Authentication
        );
    }

    #[test]
    fn test_route_parsing() {
        assert_eq!("Proxy".parse::<Route>().unwrap(), Route::Proxy);
        assert_eq!(Route::parse_lenient("sideways"), Route::Auto);
    }

    #[tokio::test]
    async fn test_try_providers_falls_through_to_second() {
        let list = vec![config(Provider::Claude), config(Provider::Openai)];
        let messages = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&messages);
        let progress: Option<ProgressFn> = Some(Arc::new(move |m: &str| {
            sink.lock().unwrap().push(m.to_string())
        }));

        let (text, used) = try_providers(&list, &progress, |cfg| async move {
            match cfg.provider {
                Provider::Claude => Err(GatewayError::Api { status: 401, message: "bad key".into() }),
                _ => Ok("ok".to_string()),
            }
        })
        .await
        .unwrap();

        assert_eq!(text, "ok");
        assert_eq!(used.provider, Provider::Openai);
        let messages = messages.lock().unwrap();
        assert_eq!(messages[0], "Trying provider 1/2: claude...");
        assert_eq!(messages[1], "claude authentication failed, trying next provider...");
        assert_eq!(messages.last().unwrap(), "Successfully connected using openai");
    }

    #[tokio::test]
    async fn test_try_providers_summarizes_all_failures() {
        let list = vec![config(Provider::Claude), config(Provider::Browser)];
        let err = try_providers(&list, &None, |cfg| async move {
            Err::<(), _>(GatewayError::UnsupportedProvider(cfg.provider.to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(
            err.to_string(),
            "All 2 AI providers failed. Errors: claude: Unsupported AI provider: claude; \
             browser: Unsupported AI provider: browser"
        );
    }

    #[tokio::test]
    async fn test_try_providers_empty_list() {
        let err = try_providers(&[], &None, |_| async { Ok::<(), GatewayError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::NoProviders));
        assert!(err.to_string().contains("API providers configured."));
    }

    #[test]
    fn test_response_value_shape() {
        let response = AiResponse {
            result: json!({"coverLetter": "Hi"}),
            used_provider: "claude".into(),
            used_model: "m".into(),
        };
        let value = response.to_value();
        assert_eq!(value["usedProvider"], "claude");
        assert_eq!(value["result"]["coverLetter"], "Hi");
    }
}
