// src/config.rs
//! Unified configuration loading: defaults, optional TOML file in the
//! data directory, environment overrides for secrets.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::core::classifier::ClassifierConfig;

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "jobhunt.sqlite";

const DEFAULT_API_BASE_URL: &str = "https://api.hh.ru";
const DEFAULT_OAUTH_BASE_URL: &str = "https://hh.ru/oauth";
const DEFAULT_REDIRECT_PORT: u16 = 9037;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub api: ApiConfig,
    pub oauth: OauthConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct OauthConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_port: u16,
}

impl OauthConfig {
    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/oauth_callback", self.redirect_port)
    }
}

/// On-disk shape of `config.toml`. Everything is optional; missing
/// sections fall back to defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    api: FileApiConfig,
    #[serde(default)]
    oauth: FileOauthConfig,
    #[serde(default)]
    classifier: Option<ClassifierConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct FileApiConfig {
    base_url: Option<String>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileOauthConfig {
    base_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    redirect_port: Option<u16>,
}

impl AppConfig {
    /// Load configuration: data dir from `JOBHUNT_DATA_DIR` (falling
    /// back to `./data`), then `config.toml` inside it, then
    /// `JOBHUNT_CLIENT_ID` / `JOBHUNT_CLIENT_SECRET` overrides.
    pub fn load() -> Result<Self> {
        let data_dir = match std::env::var("JOBHUNT_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => std::env::current_dir()
                .context("Failed to get current directory")?
                .join("data"),
        };
        Self::load_from(&data_dir)
    }

    pub fn load_from(data_dir: &Path) -> Result<Self> {
        let config_path = data_dir.join(CONFIG_FILE);
        let file_config = if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            let raw = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<FileConfig>(&raw)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            FileConfig::default()
        };

        let client_id = std::env::var("JOBHUNT_CLIENT_ID")
            .ok()
            .or(file_config.oauth.client_id)
            .unwrap_or_default();
        let client_secret = std::env::var("JOBHUNT_CLIENT_SECRET")
            .ok()
            .or(file_config.oauth.client_secret)
            .unwrap_or_default();

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            database_path: data_dir.join(DATABASE_FILE),
            api: ApiConfig {
                base_url: file_config
                    .api
                    .base_url
                    .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
                timeout_seconds: file_config
                    .api
                    .timeout_seconds
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
                user_agent: format!("jobhunt/{}", env!("CARGO_PKG_VERSION")),
            },
            oauth: OauthConfig {
                base_url: file_config
                    .oauth
                    .base_url
                    .unwrap_or_else(|| DEFAULT_OAUTH_BASE_URL.to_string()),
                client_id,
                client_secret,
                redirect_port: file_config
                    .oauth
                    .redirect_port
                    .unwrap_or(DEFAULT_REDIRECT_PORT),
            },
            classifier: file_config.classifier.unwrap_or_default(),
        })
    }

    /// Fail early when the interactive authorization flow cannot work.
    pub fn require_oauth_credentials(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() || self.oauth.client_secret.is_empty() {
            anyhow::bail!(
                "OAuth client credentials are not configured. Set JOBHUNT_CLIENT_ID and \
                 JOBHUNT_CLIENT_SECRET, or add them to {}",
                self.data_dir.join(CONFIG_FILE).display()
            );
        }
        Ok(())
    }

    pub async fn ensure_directories(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .with_context(|| format!("Failed to create directory: {}", self.data_dir.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.api.base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.oauth.redirect_port, DEFAULT_REDIRECT_PORT);
        assert_eq!(
            config.oauth.redirect_uri(),
            "http://127.0.0.1:9037/oauth_callback"
        );
        assert!(config.database_path.ends_with(DATABASE_FILE));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
[api]
base_url = "http://localhost:8080"

[oauth]
client_id = "abc"
client_secret = "xyz"
redirect_port = 9999

[classifier]
delivered = ["sent"]
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert_eq!(config.oauth.client_id, "abc");
        assert_eq!(config.oauth.redirect_port, 9999);
        assert_eq!(config.classifier.delivered, vec!["sent".to_string()]);
        assert!(config.require_oauth_credentials().is_ok());
    }

    #[test]
    fn missing_credentials_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert!(config.require_oauth_credentials().is_err());
    }
}
