//! TOML configuration.
//!
//! A single file configures the database, HTTP server, upload storage, token
//! lifetime and the generative-AI provider. API keys never live in the file;
//! they are read from `GEMINI_API_KEY` / `OPENAI_API_KEY` at call time.
//!
//! ```toml
//! [db]
//! path = "./data/edunexus.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! upload_dir = "./data/uploads"
//!
//! [ai]
//! provider = "gemini"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ai: AiConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}
fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_ttl_hours: default_token_ttl_hours(),
        }
    }
}

fn default_token_ttl_hours() -> i64 {
    720
}

#[derive(Debug, Deserialize, Clone)]
pub struct AiConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Number of user/assistant message pairs replayed to the model.
    #[serde(default = "default_history_pairs")]
    pub history_pairs: i64,
    #[serde(default = "ProviderConfig::gemini")]
    pub gemini: ProviderConfig,
    #[serde(default = "ProviderConfig::openai")]
    pub openai: ProviderConfig,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            history_pairs: default_history_pairs(),
            gemini: ProviderConfig::gemini(),
            openai: ProviderConfig::openai(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_history_pairs() -> i64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn gemini() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn openai() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

impl AiConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Environment variable holding the key for the configured provider.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self.provider.as_str() {
            "gemini" => Some("GEMINI_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        }
    }
}

impl Config {
    /// Defaults used by tooling and tests that never touch the config file.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/edunexus.sqlite"),
            },
            server: ServerConfig {
                bind: "127.0.0.1:8080".to_string(),
            },
            storage: StorageConfig::default(),
            auth: AuthConfig::default(),
            ai: AiConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.storage.max_upload_bytes == 0 {
        anyhow::bail!("storage.max_upload_bytes must be > 0");
    }

    if config.auth.token_ttl_hours < 1 {
        anyhow::bail!("auth.token_ttl_hours must be >= 1");
    }

    if config.ai.history_pairs < 0 {
        anyhow::bail!("ai.history_pairs must be >= 0");
    }

    match config.ai.provider.as_str() {
        "disabled" | "gemini" | "openai" => {}
        other => anyhow::bail!(
            "Unknown AI provider: '{}'. Must be disabled, gemini, or openai.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
[db]
path = "/tmp/edunexus.sqlite"

[server]
bind = "127.0.0.1:0"
"#;

    #[test]
    fn test_defaults_applied() {
        let cfg = parse_config(BASE).unwrap();
        assert_eq!(cfg.ai.provider, "disabled");
        assert!(!cfg.ai.is_enabled());
        assert_eq!(cfg.ai.history_pairs, 10);
        assert_eq!(cfg.ai.gemini.model, "gemini-2.0-flash-exp");
        assert_eq!(cfg.ai.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.storage.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(cfg.auth.token_ttl_hours, 720);
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let content = format!("{}\n[ai]\nprovider = \"claude\"\n", BASE);
        let err = parse_config(&content).unwrap_err();
        assert!(err.to_string().contains("Unknown AI provider"));
    }

    #[test]
    fn test_provider_override() {
        let content = format!(
            "{}\n[ai]\nprovider = \"openai\"\n\n[ai.openai]\nbase_url = \"http://localhost:9000/v1\"\nmodel = \"gpt-test\"\n",
            BASE
        );
        let cfg = parse_config(&content).unwrap();
        assert!(cfg.ai.is_enabled());
        assert_eq!(cfg.ai.api_key_var(), Some("OPENAI_API_KEY"));
        assert_eq!(cfg.ai.openai.model, "gpt-test");
        assert_eq!(cfg.ai.openai.timeout_secs, 30);
    }

    #[test]
    fn test_zero_upload_limit_rejected() {
        let content = format!(
            "{}\n[storage]\nupload_dir = \"/tmp/u\"\nmax_upload_bytes = 0\n",
            BASE
        );
        assert!(parse_config(&content).is_err());
    }
}
