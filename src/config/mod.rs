use std::{fs, path::Path};

use serde::Deserialize;

use crate::core::error::IocError;
use crate::pipeline::normalizer::EmptyValuePolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub enabled: bool,
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub min_interval_ms: u64,
}

impl ProviderConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            user_agent: default_user_agent(),
            max_redirects: default_max_redirects(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_window_hours")]
    pub cooldown_hours: u64,
    #[serde(default = "default_window_hours")]
    pub cache_max_age_hours: u64,
    #[serde(default = "default_cascade_limit")]
    pub cascade_limit: usize,
    #[serde(default)]
    pub empty_values: EmptyValuePolicy,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        default_config()
    }
}

pub fn load_config(path: Option<&str>) -> Result<AppConfig, IocError> {
    let default_path = Path::new("config/iocwatch.toml");
    let path = path.map(Path::new).unwrap_or(default_path);

    if !path.exists() {
        return Ok(default_config());
    }

    let content = fs::read_to_string(path).map_err(|e| IocError::Config(e.to_string()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, IocError> {
    toml::from_str(content).map_err(|e| IocError::Config(e.to_string()))
}

pub fn apply_provider_filter(cfg: AppConfig, names: Option<&[String]>) -> AppConfig {
    if let Some(list) = names {
        let mut cfg = cfg;
        let lowered: Vec<String> = list.iter().map(|s| s.to_lowercase()).collect();
        for p in cfg.providers.iter_mut() {
            p.enabled = lowered.iter().any(|n| n == &p.name.to_lowercase());
        }
        return cfg;
    }
    cfg
}

fn default_config() -> AppConfig {
    AppConfig {
        db_path: default_db_path(),
        cooldown_hours: default_window_hours(),
        cache_max_age_hours: default_window_hours(),
        cascade_limit: default_cascade_limit(),
        empty_values: EmptyValuePolicy::default(),
        fetch: FetchConfig::default(),
        providers: default_providers(),
    }
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "virustotal".to_string(),
            enabled: true,
            base_url: "https://www.virustotal.com/api/v3".to_string(),
            api_key_env: Some("VT_API_KEY".to_string()),
            min_interval_ms: 15_000,
        },
        ProviderConfig {
            name: "ipinfo".to_string(),
            enabled: true,
            base_url: "https://ipinfo.io".to_string(),
            api_key_env: Some("IPINFO_TOKEN".to_string()),
            min_interval_ms: 0,
        },
        ProviderConfig {
            name: "abuseipdb".to_string(),
            enabled: true,
            base_url: "https://api.abuseipdb.com/api/v2".to_string(),
            api_key_env: Some("ABUSEIPDB_API_KEY".to_string()),
            min_interval_ms: 1_000,
        },
    ]
}

fn default_db_path() -> String {
    "data/iocwatch.db".to_string()
}

fn default_window_hours() -> u64 {
    24
}

fn default_cascade_limit() -> usize {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    concat!("iocwatch/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_redirects() -> usize {
    4
}
