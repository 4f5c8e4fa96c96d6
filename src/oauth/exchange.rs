//! OAuth token endpoint calls.
//!
//! Handles the authorization-code grant and the refresh-token grant. Both
//! POST a form to the token endpoint and parse the standard token response.

use super::provider::OAuthProviderConfig;
use crate::error::TokenEndpointError;
use reqwest::Client;
use serde::Deserialize;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Exchange authorization code for a token set
///
/// # Returns
/// * `Ok(TokenResponse)` - Parsed token response (fields not yet validated)
/// * `Err` - If the request fails, times out, or the endpoint rejects the code
pub async fn exchange_code_for_token(
    client: &Client,
    provider: &OAuthProviderConfig,
    code: &str,
) -> Result<TokenResponse, TokenEndpointError> {
    let form = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", provider.redirect_uri.as_str()),
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
    ];

    tracing::debug!(
        token_url = %provider.token_url,
        "Exchanging authorization code for token"
    );
    post_token_form(client, &provider.token_url, &form).await
}

/// Use a refresh token to obtain a new access token
///
/// Scopes are sent again, as the Deere sign-in server expects them on refresh.
pub async fn refresh_access_token(
    client: &Client,
    provider: &OAuthProviderConfig,
    refresh_token: &str,
) -> Result<TokenResponse, TokenEndpointError> {
    let scope = provider.scope();
    let form = [
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("redirect_uri", provider.redirect_uri.as_str()),
        ("scope", scope.as_str()),
        ("client_id", provider.client_id.as_str()),
        ("client_secret", provider.client_secret.as_str()),
    ];

    tracing::debug!(token_url = %provider.token_url, "Requesting refresh grant");
    post_token_form(client, &provider.token_url, &form).await
}

async fn post_token_form(
    client: &Client,
    token_url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, TokenEndpointError> {
    let response = client
        .post(token_url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(TokenEndpointError::Status { status, body });
    }

    let token_response: TokenResponse = response.json().await?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        token_type = ?token_response.token_type,
        "Token endpoint call succeeded"
    );

    Ok(token_response)
}
