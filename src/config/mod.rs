use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

// Re-export existing config types
pub use crate::oauth::OAuthProviderConfig;

use crate::credentials::MAX_EXPIRES_IN_SECONDS;
use crate::pagination::{ACCEPT_V3, DEFAULT_PAGE_SIZE};
use crate::resources::{EQUIPMENT_URL, PLATFORM_BASE_URL};

/// Environment variable naming the TOML configuration file
pub const CONFIG_ENV: &str = "FURROW_CONFIG";

/// Complete furrow configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FurrowConfig {
    #[serde(default)]
    pub oauth: OAuthProviderConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// API access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Platform API base URL (sandbox or production)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Equipment API collection URL
    #[serde(default = "default_equipment_url")]
    pub equipment_url: String,
    /// Media type sent in the Accept header of platform requests
    #[serde(default = "default_accept")]
    pub accept: String,
    /// Items requested per page (`itemLimit`)
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Pause between consecutive page requests (milliseconds)
    #[serde(default = "default_page_delay_ms")]
    pub page_delay_ms: u64,
    /// Timeout applied to every HTTP request (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    PLATFORM_BASE_URL.to_string()
}

fn default_equipment_url() -> String {
    EQUIPMENT_URL.to_string()
}

fn default_accept() -> String {
    ACCEPT_V3.to_string()
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

fn default_page_delay_ms() -> u64 {
    200
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            equipment_url: default_equipment_url(),
            accept: default_accept(),
            page_size: default_page_size(),
            page_delay_ms: default_page_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP client shared by token and page requests.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("furrow/", env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout())
            .build()
            .context("Failed to build HTTP client")
    }
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// JSON file holding the token set
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

fn default_token_file() -> PathBuf {
    PathBuf::from("tokens.json")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

impl FurrowConfig {
    /// Loads the file named by `FURROW_CONFIG` (defaults if unset), then
    /// applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => load_config(&path)?,
            Err(_) => FurrowConfig::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overrides settings from environment-style lookups:
    /// - `FURROW_CLIENT_ID`, `FURROW_CLIENT_SECRET`
    /// - `FURROW_TOKEN_FILE`
    /// - `FURROW_API_BASE_URL`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("FURROW_CLIENT_ID") {
            self.oauth.client_id = client_id;
        }
        if let Some(client_secret) = lookup("FURROW_CLIENT_SECRET") {
            self.oauth.client_secret = client_secret;
        }
        if let Some(token_file) = lookup("FURROW_TOKEN_FILE") {
            self.storage.token_file = PathBuf::from(token_file);
        }
        if let Some(base_url) = lookup("FURROW_API_BASE_URL") {
            self.api.base_url = base_url;
        }
    }

    /// Checks settings that the token endpoint cannot do without.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() {
            bail!("FURROW_CLIENT_ID is not set (or [oauth].client_id in the config file)");
        }
        if self.oauth.client_secret.is_empty() {
            bail!("FURROW_CLIENT_SECRET is not set (or [oauth].client_secret in the config file)");
        }
        if self.api.page_size == 0 {
            bail!("[api].page_size must be at least 1");
        }
        if !(0..=MAX_EXPIRES_IN_SECONDS).contains(&self.oauth.grace_period_seconds) {
            bail!(
                "[oauth].grace_period_seconds must be between 0 and {}",
                MAX_EXPIRES_IN_SECONDS
            );
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<FurrowConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: FurrowConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = FurrowConfig::default();
        assert_eq!(config.api.base_url, "https://sandboxapi.deere.com/platform");
        assert_eq!(config.api.accept, "application/vnd.deere.axiom.v3+json");
        assert_eq!(config.api.page_size, 100);
        assert_eq!(config.api.page_delay(), Duration::from_millis(200));
        assert_eq!(config.api.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.storage.token_file, PathBuf::from("tokens.json"));
        assert_eq!(config.oauth.grace_period_seconds, 60);
        assert!(config.oauth.client_id.is_empty());
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [oauth]
            client_id = "file-client"
            scopes = ["ag1", "org1", "offline_access"]
            grace_period_seconds = 120

            [api]
            base_url = "https://partnerapi.deere.com/platform"
            page_size = 50
            page_delay_ms = 0

            [storage]
            token_file = "/var/lib/furrow/tokens.json"
        "#;

        let config: FurrowConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.oauth.client_id, "file-client");
        assert_eq!(config.oauth.scope(), "ag1 org1 offline_access");
        assert_eq!(config.oauth.grace_period_seconds, 120);
        // Unset keys keep their defaults
        assert_eq!(config.oauth.redirect_uri, "http://localhost:9090/callback");
        assert_eq!(config.api.base_url, "https://partnerapi.deere.com/platform");
        assert_eq!(config.api.page_size, 50);
        assert_eq!(config.api.page_delay(), Duration::ZERO);
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(
            config.storage.token_file,
            PathBuf::from("/var/lib/furrow/tokens.json")
        );
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [api]
            page_size = 10
        "#;

        let config: FurrowConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.api.page_size, 10);
        assert_eq!(config.api.accept, ACCEPT_V3);
        assert_eq!(config.oauth.token_url, crate::oauth::TOKEN_URL);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FURROW_CLIENT_ID", "env-client"),
            ("FURROW_CLIENT_SECRET", "env-secret"),
            ("FURROW_TOKEN_FILE", "/tmp/tokens.json"),
            ("FURROW_API_BASE_URL", "http://localhost:8080"),
        ]
        .into_iter()
        .collect();

        let mut config = FurrowConfig::default();
        config.oauth.client_id = "file-client".to_string();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.oauth.client_id, "env-client");
        assert_eq!(config.oauth.client_secret, "env-secret");
        assert_eq!(config.storage.token_file, PathBuf::from("/tmp/tokens.json"));
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_missing_secret() {
        let mut config = FurrowConfig::default();
        config.oauth.client_id = "id".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("FURROW_CLIENT_SECRET"));
    }

    #[test]
    fn test_validate_grace_period_range() {
        let mut config = FurrowConfig::default();
        config.oauth.client_id = "id".to_string();
        config.oauth.client_secret = "secret".to_string();

        config.oauth.grace_period_seconds = 100_000_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("grace_period_seconds"));

        config.oauth.grace_period_seconds = -1;
        assert!(config.validate().is_err());

        config.oauth.grace_period_seconds = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("furrow.toml");
        std::fs::write(&path, "[api]\npage_size = 25\n").unwrap();

        let config = load_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.api.page_size, 25);

        let missing = temp_dir.path().join("missing.toml");
        let err = load_config(missing.to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
