//! Network [`AiGateway`]: Anthropic Messages API, OpenAI chat completions and
//! an optional relay proxy. Each provider call retries on 429 and 5xx with
//! exponential backoff before the next provider is tried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::models::Provider;
use crate::parser::json::{decode_json_text, truthy_value};

use super::prompts::{build_prompt, system_prompt};
use super::{
    try_providers, AiGateway, AiOperation, AiPayload, AiResponse, GatewayError, ProgressFn,
    ProviderConfig, Route,
};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const MAX_TOKENS: u32 = 4000;
const OPENAI_TEMPERATURE: f32 = 0.7;
const MAX_RETRIES: u32 = 3;

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

/// `{"error": {"message": ...}}`, the error body both vendors use.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Gateway
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    proxy_url: Option<String>,
}

impl HttpGateway {
    pub fn new(proxy_url: Option<String>, request_timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, proxy_url })
    }

    /// Sends the request built by `build`, retrying on 429 and 5xx.
    async fn send_with_retry<F>(&self, label: &str, build: F) -> Result<Response, GatewayError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<GatewayError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "{} call attempt {} failed, retrying after {}ms...",
                    label,
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(GatewayError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("{} returned {}: {}", label, status, body);
                last_error = Some(GatewayError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GatewayError::Api {
                    status: status.as_u16(),
                    message: error_message(&body),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(GatewayError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }

    async fn call_anthropic(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        let body = AnthropicRequest {
            model: &config.model,
            max_tokens: MAX_TOKENS,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .send_with_retry("Anthropic", || {
                self.client
                    .post(ANTHROPIC_API_URL)
                    .header("x-api-key", &config.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("content-type", "application/json")
                    .json(&body)
            })
            .await?;
        let parsed: AnthropicResponse = response.json().await?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "Anthropic call succeeded: input_tokens={}, output_tokens={}",
                usage.input_tokens, usage.output_tokens
            );
        }

        parsed
            .content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(GatewayError::EmptyContent)
    }

    async fn call_openai(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });
        let body = OpenAiRequest {
            model: &config.model,
            messages,
            max_tokens: MAX_TOKENS,
            temperature: OPENAI_TEMPERATURE,
        };

        let response = self
            .send_with_retry("OpenAI", || {
                self.client
                    .post(OPENAI_API_URL)
                    .bearer_auth(&config.api_key)
                    .json(&body)
            })
            .await?;
        let parsed: OpenAiResponse = response.json().await?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(GatewayError::EmptyContent)
    }

    async fn call_proxy(
        &self,
        config: &ProviderConfig,
        operation: AiOperation,
        prompt: &str,
        resume: &Value,
    ) -> Result<String, GatewayError> {
        let url = self.proxy_url.as_deref().ok_or_else(|| {
            GatewayError::InvalidRequest(
                "proxy route selected but WORKBENCH_AI_PROXY_URL is not set".to_string(),
            )
        })?;
        let body = json!({
            "prompt": prompt,
            "apiType": config.provider,
            "apiKey": config.api_key,
            "model": config.model,
            "operation": operation,
            "resume": resume,
        });

        let response = self
            .send_with_retry("Proxy", || self.client.post(url).json(&body))
            .await?;
        let data: Value = response.json().await?;
        Ok(extract_proxy_text(&data))
    }

    async fn call_direct(
        &self,
        config: &ProviderConfig,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, GatewayError> {
        match config.provider {
            Provider::Claude => self.call_anthropic(config, prompt, system).await,
            Provider::Openai => self.call_openai(config, prompt, system).await,
            Provider::Browser => Err(browser_unsupported()),
        }
    }

    async fn call_provider(
        &self,
        config: &ProviderConfig,
        operation: AiOperation,
        prompt: &str,
        payload: &AiPayload,
    ) -> Result<String, GatewayError> {
        let system = system_prompt(operation);

        match (config.provider, config.route) {
            (Provider::Browser, _) | (_, Route::Browser) => Err(browser_unsupported()),
            (_, Route::Proxy) => self.call_proxy(config, operation, prompt, &payload.resume).await,
            (_, Route::Direct) => self.call_direct(config, prompt, system).await,
            (_, Route::Auto) => match self.call_direct(config, prompt, system).await {
                Err(GatewayError::Http(e)) if self.proxy_url.is_some() => {
                    warn!(provider = %config.provider, "Direct call failed ({}), retrying via proxy", e);
                    self.call_proxy(config, operation, prompt, &payload.resume).await
                }
                other => other,
            },
        }
    }
}

fn browser_unsupported() -> GatewayError {
    GatewayError::UnsupportedProvider("browser (in-browser models are not available here)".to_string())
}

#[async_trait]
impl AiGateway for HttpGateway {
    async fn request(
        &self,
        operation: AiOperation,
        payload: &AiPayload,
        progress: Option<ProgressFn>,
    ) -> Result<AiResponse, GatewayError> {
        validate_payload(operation, payload)?;
        let prompt = build_prompt(operation, payload);

        let (text, used) = try_providers(&payload.provider_list, &progress, |config| {
            self.call_provider(config, operation, &prompt, payload)
        })
        .await?;

        info!(
            operation = operation.as_str(),
            provider = %used.provider,
            model = %used.model,
            "AI request succeeded"
        );

        Ok(AiResponse {
            result: interpret_output(operation, &text),
            used_provider: used.provider.to_string(),
            used_model: used.model.clone(),
        })
    }
}

/// Operations that work on a resume need both a resume and a description.
pub fn validate_payload(operation: AiOperation, payload: &AiPayload) -> Result<(), GatewayError> {
    if operation == AiOperation::TestApiKey {
        return Ok(());
    }

    let mut missing = Vec::new();
    if payload.resume.is_null() {
        missing.push("resume");
    }
    if payload.job_description.trim().is_empty() {
        missing.push("jobDescription");
    }
    if missing.is_empty() {
        return Ok(());
    }

    Err(GatewayError::InvalidRequest(format!(
        "Missing required parameters for {}: {}",
        operation,
        missing.join(", ")
    )))
}

/// Decoded JSON when the model produced some, otherwise the raw text.
pub fn interpret_output(operation: AiOperation, text: &str) -> Value {
    if operation == AiOperation::TestApiKey {
        return Value::String(text.trim().to_string());
    }
    match decode_json_text(text) {
        Some(value @ (Value::Object(_) | Value::Array(_))) => value,
        _ => {
            warn!(operation = operation.as_str(), "Model output was not JSON; keeping raw text");
            Value::String(text.to_string())
        }
    }
}

/// Pulls the model text out of whatever envelope the proxy returned.
pub fn extract_proxy_text(data: &Value) -> String {
    fn as_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    if let Value::String(s) = data {
        return s.clone();
    }
    if let Some(result) = truthy_value(data.get("result")) {
        return as_text(result);
    }
    if let Some(response) = truthy_value(data.get("response")) {
        return as_text(response);
    }
    if let Some(text) = data
        .get("content")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find_map(|b| b.get("text").and_then(Value::as_str)))
    {
        return text.to_string();
    }
    if let Some(text) = data.pointer("/choices/0/message/content").and_then(Value::as_str) {
        return text.to_string();
    }
    data.to_string()
}
