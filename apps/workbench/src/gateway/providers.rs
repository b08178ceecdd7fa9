//! Turns user settings into the ordered provider list a request carries.

use tracing::{debug, warn};

use crate::models::{Provider, ProviderSettings, Settings};

use super::{GatewayError, ProviderConfig, Route};

pub fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Claude => "claude-3-5-sonnet-20241022",
        Provider::Openai => "gpt-4o",
        Provider::Browser => "Llama-3.1-8B-Instruct-q4f32_1-MLC",
    }
}

fn usable(provider: Provider, cfg: &ProviderSettings) -> bool {
    cfg.enabled && (!provider.requires_api_key() || cfg.has_key())
}

/// Enabled providers in priority order, followed by any enabled provider the
/// priority list does not name. Providers that need a key and lack one are
/// skipped.
pub fn build_provider_list(settings: &Settings) -> Result<Vec<ProviderConfig>, GatewayError> {
    let mut order: Vec<Provider> = Vec::with_capacity(Provider::ALL.len());
    for name in &settings.preferences.provider_priority {
        match name.parse::<Provider>() {
            Ok(p) if !order.contains(&p) => order.push(p),
            Ok(_) => {}
            Err(e) => debug!("Ignoring priority entry: {}", e),
        }
    }
    for p in Provider::ALL {
        if !order.contains(&p) {
            order.push(p);
        }
    }

    let list: Vec<ProviderConfig> = order
        .into_iter()
        .filter_map(|provider| {
            let cfg = settings.api_providers.get(provider);
            if !usable(provider, cfg) {
                return None;
            }
            let model = cfg.model.trim();
            Some(ProviderConfig {
                provider,
                api_key: cfg.api_key.trim().to_string(),
                model: if model.is_empty() { default_model(provider).to_string() } else { model.to_string() },
                route: Route::parse_lenient(&cfg.route),
            })
        })
        .collect();

    if list.is_empty() {
        warn!("No usable AI providers in settings");
        return Err(GatewayError::NoProviders);
    }
    Ok(list)
}

/// True when at least one provider could serve a request.
pub fn has_valid_api_key(settings: &Settings) -> bool {
    Provider::ALL
        .iter()
        .any(|p| usable(*p, settings.api_providers.get(*p)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Checks a provider entry as entered by the user.
pub fn validate_provider_config(name: &str, api_key: &str, model: &str) -> ProviderValidation {
    let mut errors = Vec::new();
    let name = name.trim();

    if name.is_empty() {
        errors.push("Provider name is required".to_string());
    } else {
        match name.parse::<Provider>() {
            Ok(p) if p.requires_api_key() && api_key.trim().is_empty() => {
                errors.push("API key is required for non-browser providers".to_string());
            }
            Ok(_) => {}
            Err(e) => errors.push(e),
        }
    }
    if model.trim().is_empty() {
        errors.push("Model is required".to_string());
    }

    ProviderValidation {
        valid: errors.is_empty(),
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enable(settings: &mut Settings, provider: Provider, key: &str) {
        let cfg = settings.api_providers.get_mut(provider);
        cfg.enabled = true;
        cfg.api_key = key.to_string();
    }

    #[test]
    fn test_blank_settings_have_no_providers() {
        let settings = Settings::default();
        assert!(!has_valid_api_key(&settings));
        assert!(matches!(build_provider_list(&settings), Err(GatewayError::NoProviders)));
    }

    #[test]
    fn test_priority_order_and_trimming() {
        let mut settings = Settings::default();
        enable(&mut settings, Provider::Claude, "  sk-ant  ");
        enable(&mut settings, Provider::Openai, "sk-oa");
        settings.api_providers.openai.model = "gpt-4o-mini".to_string();
        settings.preferences.provider_priority = vec!["openai".to_string(), "nope".to_string()];

        let list = build_provider_list(&settings).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].provider, Provider::Openai);
        assert_eq!(list[0].model, "gpt-4o-mini");
        assert_eq!(list[1].provider, Provider::Claude);
        assert_eq!(list[1].api_key, "sk-ant");
        assert_eq!(list[1].model, "claude-3-5-sonnet-20241022");
        assert_eq!(list[1].route, Route::Auto);
    }

    #[test]
    fn test_enabled_without_key_is_skipped() {
        let mut settings = Settings::default();
        enable(&mut settings, Provider::Claude, "   ");
        assert!(!has_valid_api_key(&settings));

        enable(&mut settings, Provider::Browser, "");
        let list = build_provider_list(&settings).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].provider, Provider::Browser);
        assert_eq!(list[0].route, Route::Browser);
    }

    #[test]
    fn test_validate_provider_config() {
        assert!(validate_provider_config("claude", "k", "m").valid);
        assert!(validate_provider_config("browser", "", "m").valid);

        let v = validate_provider_config("openai", "", "");
        assert_eq!(
            v.errors,
            vec!["API key is required for non-browser providers", "Model is required"]
        );
        let v = validate_provider_config("gemini", "k", "m");
        assert_eq!(
            v.errors,
            vec!["Invalid provider: gemini. Must be one of: claude, openai, browser"]
        );
        assert_eq!(
            validate_provider_config(" ", "k", "m").errors,
            vec!["Provider name is required"]
        );
    }

    #[test]
    fn test_default_models() {
        assert_eq!(default_model(Provider::Claude), "claude-3-5-sonnet-20241022");
        assert_eq!(default_model(Provider::Openai), "gpt-4o");
    }
}
