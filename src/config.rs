//! Configuration: provider connection settings and per-stream query config.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "SEARCH_PROVIDER_CONFIG_PATH";
const ENV_URL: &str = "SEARCH_PROVIDER_URL";
const ENV_API_KEY: &str = "SEARCH_PROVIDER_API_KEY";
const ENV_TIMEOUT: &str = "SEARCH_PROVIDER_TIMEOUT_SECS";

/// Connection settings for the search provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            api_key: String::new(),
            request_timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Load provider config from an explicit path. Supports TOML or JSON.
pub fn load_provider_config_from(path: &Path) -> Result<ProviderConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading provider config from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_provider_config(&content, ext.as_str())
}

/// Load provider config using env vars + fallbacks:
/// 1) $SEARCH_PROVIDER_CONFIG_PATH (must exist if set)
/// 2) config/provider.toml, then config/provider.json
/// 3) defaults
/// Individual env vars (URL, API key, timeout) override whatever was loaded.
pub fn load_provider_config_default() -> Result<ProviderConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        load_provider_config_from(&pb)?
    } else {
        let toml_p = PathBuf::from("config/provider.toml");
        let json_p = PathBuf::from("config/provider.json");
        if toml_p.exists() {
            load_provider_config_from(&toml_p)?
        } else if json_p.exists() {
            load_provider_config_from(&json_p)?
        } else {
            ProviderConfig::default()
        }
    };

    if let Ok(url) = std::env::var(ENV_URL) {
        if !url.trim().is_empty() {
            cfg.base_url = url.trim().to_string();
        }
    }
    if let Ok(key) = std::env::var(ENV_API_KEY) {
        if !key.trim().is_empty() {
            cfg.api_key = key.trim().to_string();
        }
    }
    if let Ok(t) = std::env::var(ENV_TIMEOUT) {
        if let Ok(secs) = t.trim().parse::<u64>() {
            cfg.request_timeout_secs = secs;
        }
    }
    Ok(cfg)
}

fn parse_provider_config(s: &str, hint_ext: &str) -> Result<ProviderConfig> {
    if hint_ext == "toml" {
        return toml::from_str(s).context("parsing provider config toml");
    }
    if hint_ext == "json" {
        return serde_json::from_str(s).context("parsing provider config json");
    }
    // No hint: try TOML, then JSON.
    if let Ok(v) = toml::from_str(s) {
        return Ok(v);
    }
    serde_json::from_str(s).context("unsupported provider config format")
}

/// Per-stream query configuration. One value of this drives one logical
/// stream; it never changes across turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Provider source kind, e.g. `"twitter"`.
    #[serde(default = "default_source_kind")]
    pub source_kind: String,
    /// Provider search method, e.g. `"searchbyquery"`.
    #[serde(default = "default_method")]
    pub method: String,
    /// The base query; phase cursors are appended to it per turn.
    pub query: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Optional item-count budget for the backfill sweep.
    #[serde(default)]
    pub max_results: Option<u64>,
    /// Cooperative delay between live-tail turns, in milliseconds.
    #[serde(default = "default_live_poll_ms")]
    pub live_poll_ms: u32,
    /// Optional wall-clock budget for a single turn, in milliseconds.
    #[serde(default)]
    pub budget_ms: Option<u64>,
}

impl QueryConfig {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            source_kind: default_source_kind(),
            method: default_method(),
            query: query.into(),
            page_size: default_page_size(),
            max_results: None,
            live_poll_ms: default_live_poll_ms(),
            budget_ms: None,
        }
    }
}

fn default_source_kind() -> String {
    "twitter".to_string()
}

fn default_method() -> String {
    "searchbyquery".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_live_poll_ms() -> u32 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn query_config_defaults_fill_in() {
        let cfg: QueryConfig = serde_json::from_str(r#"{"query": "from:fed"}"#).unwrap();
        assert_eq!(cfg.query, "from:fed");
        assert_eq!(cfg.page_size, 100);
        assert_eq!(cfg.live_poll_ms, 30_000);
        assert_eq!(cfg.max_results, None);
        assert_eq!(cfg.method, "searchbyquery");
    }

    #[test]
    fn toml_and_json_formats_parse() {
        let toml_src = "base_url = \"https://api.example.test\"\napi_key = \"k\"";
        let cfg = parse_provider_config(toml_src, "toml").unwrap();
        assert_eq!(cfg.base_url, "https://api.example.test");
        assert_eq!(cfg.request_timeout_secs, 30);

        let json_src = r#"{"base_url": "https://api.example.test", "request_timeout_secs": 5}"#;
        let cfg = parse_provider_config(json_src, "json").unwrap();
        assert_eq!(cfg.request_timeout_secs, 5);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_path_then_fallbacks() {
        // Isolate CWD so a real config/ dir cannot interfere
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_PATH);
        env::remove_var(ENV_URL);
        env::remove_var(ENV_API_KEY);
        env::remove_var(ENV_TIMEOUT);

        // Nothing on disk → defaults
        let cfg = load_provider_config_default().unwrap();
        assert_eq!(cfg, ProviderConfig::default());

        // Explicit path wins
        let p = tmp.path().join("provider.json");
        std::fs::write(&p, r#"{"base_url": "https://x.test", "api_key": "k"}"#).unwrap();
        env::set_var(ENV_PATH, p.display().to_string());
        let cfg = load_provider_config_default().unwrap();
        assert_eq!(cfg.base_url, "https://x.test");

        // Individual env vars override the file
        env::set_var(ENV_URL, "https://y.test");
        let cfg = load_provider_config_default().unwrap();
        assert_eq!(cfg.base_url, "https://y.test");
        assert_eq!(cfg.api_key, "k");

        env::remove_var(ENV_PATH);
        env::remove_var(ENV_URL);
        env::set_current_dir(&old).unwrap();
    }
}
