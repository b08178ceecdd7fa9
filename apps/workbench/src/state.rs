use std::rc::Rc;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::gateway::http::HttpGateway;
use crate::gateway::service::AiService;
use crate::models::Provider;
use crate::store::persistence::FileStorage;
use crate::store::{GlobalStore, StoreHandle, StoreOptions, StoreError};

/// Store and AI service handed to every command.
pub struct AppContext {
    pub store: StoreHandle,
    pub ai: Arc<AiService>,
}

impl AppContext {
    /// Opens the on-disk store under `config.data_dir` and wires the HTTP gateway.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = FileStorage::open(&config.data_dir)
            .with_context(|| format!("Failed to open data directory {}", config.data_dir.display()))?;
        let options = StoreOptions {
            max_logs: config.max_logs,
            ..StoreOptions::default()
        };
        let store = Rc::new(GlobalStore::with_storage(options, Rc::new(storage)));
        store.initialize();
        info!(data_dir = %config.data_dir.display(), jobs = store.jobs().len(), "Store initialized");

        seed_api_keys(&store, config).context("Failed to apply API keys from environment")?;

        let gateway = HttpGateway::new(config.ai_proxy_url.clone(), config.ai_timeout)
            .context("Failed to build HTTP client")?;
        let ai = Arc::new(AiService::with_timeout(Arc::new(gateway), config.ai_timeout));

        Ok(Self { store, ai })
    }
}

/// Fills and enables providers whose stored key is empty from the
/// `ANTHROPIC_API_KEY` / `OPENAI_API_KEY` variables. Stored keys win.
pub fn seed_api_keys(store: &GlobalStore, config: &Config) -> Result<(), StoreError> {
    let env_keys = [
        (Provider::Claude, config.anthropic_api_key.as_deref()),
        (Provider::Openai, config.openai_api_key.as_deref()),
    ];
    let settings = store.settings();
    let missing: Vec<(Provider, &str)> = env_keys
        .into_iter()
        .filter_map(|(provider, key)| key.map(|k| (provider, k)))
        .filter(|(provider, _)| !settings.api_providers.get(*provider).has_key())
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    store.update_settings(|settings| {
        for (provider, key) in &missing {
            let cfg = settings.api_providers.get_mut(*provider);
            cfg.api_key = key.to_string();
            cfg.enabled = true;
            info!(provider = %provider, "Using API key from environment");
        }
    })
}
