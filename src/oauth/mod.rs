//! OAuth 2.0 token lifecycle.
//!
//! [`TokenManager`] is the only writer of the persisted credential. It
//! hands out credentials that stay valid for at least a grace period,
//! refreshing them through the token endpoint when they are about to
//! expire:
//!
//! 1. External collaborator runs the browser authorization step
//! 2. Authorization code arrives via [`callback_channel`] or directly
//! 3. [`TokenManager::bootstrap`] exchanges it and persists the credential
//! 4. Every later call goes through [`TokenManager::get_valid_credential`]
//!
//! A rejected or unreachable refresh is never retried here; the caller has
//! to run the interactive flow again.

mod callback;
mod exchange;
mod provider;


pub use callback::{callback_channel, CallbackOutcome, CallbackSender};
pub use exchange::TokenResponse;
pub use provider::{
    generate_state, OAuthProviderConfig, AUTH_URL, DEFAULT_GRACE_PERIOD_SECONDS, REDIRECT_URI,
    SCOPES, TOKEN_URL,
};

use crate::credentials::{self, Credential, CredentialStore};
use crate::error::{AuthError, StoreError, TokenEndpointError};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Capability to obtain a bearer token for an API request.
///
/// Implemented by [`TokenManager`]; the page fetcher asks for a token
/// before every request.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, AuthError>;
}

/// A fixed bearer token, for callers that manage tokens themselves.
#[derive(Clone, Debug)]
pub struct StaticToken(pub String);

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.0.clone())
    }
}

/// State of the stored credential, computed without network access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenStatus {
    /// Nothing stored, or the stored record is incomplete
    Missing,
    /// Valid for longer than the grace period
    Valid { remaining: Duration },
    /// Inside the grace period or already expired; next use refreshes
    Expiring { remaining: Duration },
}

/// Owns the credential lifecycle: load, expiry check, refresh, bootstrap.
pub struct TokenManager {
    store: CredentialStore,
    provider: OAuthProviderConfig,
    http_client: Client,
}

impl TokenManager {
    /// Creates a manager.
    ///
    /// `http_client` should carry an explicit request timeout; token
    /// endpoint calls inherit it.
    pub fn new(store: CredentialStore, provider: OAuthProviderConfig, http_client: Client) -> Self {
        Self {
            store,
            provider,
            http_client,
        }
    }

    pub fn provider(&self) -> &OAuthProviderConfig {
        &self.provider
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Returns a credential valid for longer than the configured grace period.
    pub async fn get_valid_credential(&self) -> Result<Credential, AuthError> {
        self.get_valid_credential_with_grace(self.provider.grace_period_seconds)
            .await
    }

    /// Returns a credential valid for longer than `grace_period_seconds`,
    /// refreshing it if needed.
    ///
    /// # Returns
    /// * `Ok(Credential)` - Stored credential (no network call) or a freshly
    ///   refreshed and persisted one
    /// * `Err(AuthRequired)` - Nothing usable stored
    /// * `Err(RefreshFailed)` - Refresh grant rejected or unreachable
    /// * `Err(Store)` - Credential file unreadable or refreshed credential
    ///   could not be persisted
    pub async fn get_valid_credential_with_grace(
        &self,
        grace_period_seconds: i64,
    ) -> Result<Credential, AuthError> {
        let credential = self.store.load()?.ok_or(AuthError::AuthRequired)?;

        let now = credentials::now();
        let remaining = credential.remaining(now);
        if credential.is_fresh(now, credentials::grace_period(grace_period_seconds)) {
            debug!(
                remaining_secs = remaining.num_seconds(),
                "Stored access token still valid"
            );
            return Ok(credential);
        }

        info!(
            remaining_secs = remaining.num_seconds(),
            grace_period_secs = grace_period_seconds,
            "Access token expired or expiring, refreshing"
        );
        self.refresh(credential).await
    }

    async fn refresh(&self, current: Credential) -> Result<Credential, AuthError> {
        let response =
            exchange::refresh_access_token(&self.http_client, &self.provider, &current.refresh_token)
                .await
                .map_err(|e| {
                    warn!(error = %e, status = ?e.status(), "Token refresh failed");
                    AuthError::RefreshFailed(e)
                })?;

        let expires_in = token_lifetime(response.expires_in).map_err(AuthError::RefreshFailed)?;

        // Keep the existing refresh token if the provider did not rotate it
        let rotated_token = response.refresh_token.filter(|t| !t.is_empty());
        let rotated = rotated_token.is_some();
        let refresh_token = rotated_token.unwrap_or(current.refresh_token);

        let refreshed = Credential::acquired_now(response.access_token, refresh_token, expires_in);
        self.store.save(&refreshed)?;

        info!(
            expires_in = refreshed.expires_in,
            refresh_token_rotated = rotated,
            "Access token refreshed"
        );
        Ok(refreshed)
    }

    /// Exchanges a one-time authorization code for the initial credential
    /// and persists it.
    pub async fn bootstrap(&self, authorization_code: &str) -> Result<Credential, AuthError> {
        let response =
            exchange::exchange_code_for_token(&self.http_client, &self.provider, authorization_code)
                .await
                .map_err(|e| {
                    warn!(error = %e, status = ?e.status(), "Authorization code exchange failed");
                    AuthError::ExchangeFailed(e)
                })?;

        let refresh_token = response
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::ExchangeFailed(TokenEndpointError::MissingField(
                "refresh_token",
            )))?;
        let expires_in = token_lifetime(response.expires_in).map_err(AuthError::ExchangeFailed)?;

        let credential = Credential::acquired_now(response.access_token, refresh_token, expires_in);
        self.store.save(&credential)?;

        info!(
            expires_in = credential.expires_in,
            access_token = %credential.access_token_hint(),
            path = %self.store.path().display(),
            "Initial authorization completed"
        );
        Ok(credential)
    }

    /// Waits for the callback listener's single outcome, then bootstraps.
    pub async fn bootstrap_from_callback(
        &self,
        outcome: oneshot::Receiver<CallbackOutcome>,
    ) -> Result<Credential, AuthError> {
        match outcome.await {
            Ok(CallbackOutcome::Code(code)) => {
                debug!("Authorization code received from callback");
                self.bootstrap(&code).await
            }
            Ok(CallbackOutcome::Denied { error, description }) => {
                warn!(error = %error, description = ?description, "Authorization denied");
                Err(AuthError::AuthorizationDenied { error, description })
            }
            Err(_) => Err(AuthError::CallbackAbandoned),
        }
    }

    /// Reports the stored credential's state without touching the network.
    pub fn status(&self) -> Result<TokenStatus, StoreError> {
        let Some(credential) = self.store.load()? else {
            return Ok(TokenStatus::Missing);
        };
        let remaining = credential.remaining(credentials::now());
        if remaining > credentials::grace_period(self.provider.grace_period_seconds) {
            Ok(TokenStatus::Valid { remaining })
        } else {
            Ok(TokenStatus::Expiring { remaining })
        }
    }
}

/// Checks the `expires_in` of a token response before it is persisted.
fn token_lifetime(expires_in: Option<i64>) -> Result<i64, TokenEndpointError> {
    match expires_in {
        None => Err(TokenEndpointError::MissingField("expires_in")),
        Some(secs) if !credentials::is_valid_lifetime(secs) => {
            Err(TokenEndpointError::InvalidField {
                field: "expires_in",
                value: secs.to_string(),
            })
        }
        Some(secs) => Ok(secs),
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<String, AuthError> {
        Ok(self.get_valid_credential().await?.access_token)
    }
}
