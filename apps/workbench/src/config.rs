use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Everything has a default; malformed numbers fail startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub max_logs: usize,
    pub ai_timeout: Duration,
    pub ai_proxy_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Config {
            data_dir: optional("WORKBENCH_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            max_logs: optional("WORKBENCH_MAX_LOGS")
                .unwrap_or_else(|| "100".to_string())
                .parse::<usize>()
                .context("WORKBENCH_MAX_LOGS must be a non-negative integer")?,
            ai_timeout: Duration::from_secs(
                optional("WORKBENCH_AI_TIMEOUT_SECS")
                    .unwrap_or_else(|| "300".to_string())
                    .parse::<u64>()
                    .context("WORKBENCH_AI_TIMEOUT_SECS must be a number of seconds")?,
            ),
            ai_proxy_url: optional("WORKBENCH_AI_PROXY_URL"),
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            openai_api_key: optional("OPENAI_API_KEY"),
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.max_logs, 100);
        assert_eq!(config.ai_timeout, Duration::from_secs(300));
        assert!(config.ai_proxy_url.is_none());
        assert_eq!(config.rust_log, "info");
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config_from(&[
            ("WORKBENCH_DATA_DIR", "/tmp/wb"),
            ("WORKBENCH_MAX_LOGS", "25"),
            ("WORKBENCH_AI_TIMEOUT_SECS", "30"),
            ("ANTHROPIC_API_KEY", "  "),
            ("OPENAI_API_KEY", "sk-1"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/wb"));
        assert_eq!(config.max_logs, 25);
        assert_eq!(config.ai_timeout, Duration::from_secs(30));
        assert!(config.anthropic_api_key.is_none());
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-1"));
    }

    #[test]
    fn test_invalid_number_names_variable() {
        let err = config_from(&[("WORKBENCH_MAX_LOGS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("WORKBENCH_MAX_LOGS"));
    }
}
