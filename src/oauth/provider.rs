//! OAuth provider configuration.
//!
//! Endpoints, client credentials and scopes for the Deere sign-in server.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const AUTH_URL: &str = "https://signin.johndeere.com/oauth2/aus78tnlaysMraFhC1t7/v1/authorize";
pub const TOKEN_URL: &str = "https://signin.johndeere.com/oauth2/aus78tnlaysMraFhC1t7/v1/token";
pub const REDIRECT_URI: &str = "http://localhost:9090/callback";
pub const SCOPES: &[&str] = &["ag1", "ag2", "ag3", "org1", "eq1", "files", "offline_access"];

/// Default grace period before expiry at which a token counts as expired.
pub const DEFAULT_GRACE_PERIOD_SECONDS: i64 = 60;

/// OAuth provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    /// OAuth authorization endpoint URL
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Redirect URI registered with the application
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Requested OAuth scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Client ID (usually from the environment)
    #[serde(default)]
    pub client_id: String,

    /// Client secret (usually from the environment)
    #[serde(default, skip_serializing)]
    pub client_secret: String,

    /// Seconds before expiry at which a token is refreshed
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: i64,
}

fn default_auth_url() -> String {
    AUTH_URL.to_string()
}

fn default_token_url() -> String {
    TOKEN_URL.to_string()
}

fn default_redirect_uri() -> String {
    REDIRECT_URI.to_string()
}

fn default_scopes() -> Vec<String> {
    SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_grace_period() -> i64 {
    DEFAULT_GRACE_PERIOD_SECONDS
}

impl Default for OAuthProviderConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
            client_id: String::new(),
            client_secret: String::new(),
            grace_period_seconds: default_grace_period(),
        }
    }
}

impl OAuthProviderConfig {
    /// Scopes as the space-separated string the token endpoint expects.
    pub fn scope(&self) -> String {
        self.scopes.join(" ")
    }

    /// Build authorization URL with state and the configured redirect_uri
    pub fn build_auth_url(&self, state: &str) -> String {
        format!(
            "{}?response_type=code&scope={}&client_id={}&state={}&redirect_uri={}",
            self.auth_url,
            urlencoding::encode(&self.scope()),
            urlencoding::encode(&self.client_id),
            urlencoding::encode(state),
            urlencoding::encode(&self.redirect_uri)
        )
    }

    /// Port the local callback listener must bind, taken from `redirect_uri`.
    pub fn redirect_port(&self) -> Option<u16> {
        reqwest::Url::parse(&self.redirect_uri).ok()?.port()
    }
}

/// Random value for the OAuth `state` parameter.
pub fn generate_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OAuthProviderConfig::default();
        assert_eq!(config.token_url, TOKEN_URL);
        assert_eq!(config.redirect_uri, "http://localhost:9090/callback");
        assert_eq!(config.scope(), "ag1 ag2 ag3 org1 eq1 files offline_access");
        assert_eq!(config.grace_period_seconds, 60);
        assert_eq!(config.redirect_port(), Some(9090));
    }

    #[test]
    fn test_build_auth_url() {
        let config = OAuthProviderConfig {
            auth_url: "https://example.com/oauth/authorize".to_string(),
            scopes: vec!["read".to_string(), "write".to_string()],
            client_id: "test_client_id".to_string(),
            client_secret: "test_secret".to_string(),
            redirect_uri: "http://localhost:3000/callback".to_string(),
            ..Default::default()
        };

        let url = config.build_auth_url("random_state");

        assert!(url.starts_with("https://example.com/oauth/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcallback"));
        assert!(url.contains("scope=read%20write"));
        assert!(url.contains("state=random_state"));
        assert!(url.contains("response_type=code"));
        assert!(!url.contains("test_secret"));
    }

    #[test]
    fn test_redirect_port_missing() {
        let config = OAuthProviderConfig {
            redirect_uri: "not a url".to_string(),
            ..Default::default()
        };
        assert_eq!(config.redirect_port(), None);

        // Default port for the scheme is not reported as explicit
        let config = OAuthProviderConfig {
            redirect_uri: "https://example.com/callback".to_string(),
            ..Default::default()
        };
        assert_eq!(config.redirect_port(), None);
    }

    #[test]
    fn test_generate_state() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
