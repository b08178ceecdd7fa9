use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The AI providers the workbench knows how to route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Claude,
    Openai,
    /// Local, in-browser model. Needs no API key.
    Browser,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Claude, Provider::Openai, Provider::Browser];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::Openai => "openai",
            Provider::Browser => "browser",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Browser)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" | "chatgpt" => Ok(Provider::Openai),
            "browser" => Ok(Provider::Browser),
            other => Err(format!(
                "Invalid provider: {}. Must be one of: claude, openai, browser",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub route: String,
    pub enabled: bool,
}

impl ProviderSettings {
    pub fn has_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiProviders {
    pub claude: ProviderSettings,
    pub openai: ProviderSettings,
    pub browser: ProviderSettings,
}

impl Default for ApiProviders {
    fn default() -> Self {
        Self {
            claude: ProviderSettings::default(),
            openai: ProviderSettings::default(),
            browser: ProviderSettings {
                route: "browser".to_string(),
                ..ProviderSettings::default()
            },
        }
    }
}

impl ApiProviders {
    pub fn get(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::Claude => &self.claude,
            Provider::Openai => &self.openai,
            Provider::Browser => &self.browser,
        }
    }

    pub fn get_mut(&mut self, provider: Provider) -> &mut ProviderSettings {
        match provider {
            Provider::Claude => &mut self.claude,
            Provider::Openai => &mut self.openai,
            Provider::Browser => &mut self.browser,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme: String,
    pub default_provider: Option<String>,
    /// Provider try-order used when building a provider list. Unknown names are ignored.
    pub provider_priority: Vec<String>,
    pub auto_save: bool,
    pub show_progress_details: bool,
    pub include_analysis_in_requests: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            default_provider: None,
            provider_priority: Provider::ALL.iter().map(|p| p.as_str().to_string()).collect(),
            auto_save: true,
            show_progress_details: false,
            include_analysis_in_requests: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub api_providers: ApiProviders,
    pub preferences: Preferences,
}

impl Settings {
    /// True when no provider is enabled or carries a key. A blank settings
    /// value must never overwrite a non-blank persisted one.
    pub fn is_blank(&self) -> bool {
        Provider::ALL.iter().all(|p| {
            let cfg = self.api_providers.get(*p);
            !cfg.enabled && !cfg.has_key()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_blank() {
        let settings = Settings::default();
        assert!(settings.is_blank());
        assert_eq!(settings.api_providers.browser.route, "browser");
        assert_eq!(
            settings.preferences.provider_priority,
            vec!["claude", "openai", "browser"]
        );
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let json = r#"{"apiProviders": {"openai": {"apiKey": "sk-1", "enabled": true}}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert!(!settings.is_blank());
        assert!(settings.api_providers.openai.has_key());
        assert!(!settings.api_providers.claude.enabled);
        assert_eq!(settings.preferences.theme, "light");
    }

    #[test]
    fn test_provider_from_str_aliases() {
        assert_eq!("chatgpt".parse::<Provider>().unwrap(), Provider::Openai);
        assert_eq!("Claude".parse::<Provider>().unwrap(), Provider::Claude);
        assert!("gemini".parse::<Provider>().is_err());
    }
}
