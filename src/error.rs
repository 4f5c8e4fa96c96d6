//! Error types for the credential store, token lifecycle and page fetcher.
//!
//! Every failure carries enough context (HTTP status, response body, URL)
//! to be diagnosed from a log line alone.

use thiserror::Error;

/// Failure reading or writing the persisted credential file.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("credential file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a call to the OAuth token endpoint did not yield a usable token set.
#[derive(Debug, Error)]
pub enum TokenEndpointError {
    /// Transport failure, timeout, or a body that is not a token response.
    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("token response is missing `{0}`")]
    MissingField(&'static str),

    #[error("token response has an unusable `{field}`: {value}")]
    InvalidField { field: &'static str, value: String },
}

impl TokenEndpointError {
    /// HTTP status returned by the token endpoint, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            TokenEndpointError::Status { status, .. } => Some(*status),
            TokenEndpointError::Request(e) => e.status().map(|s| s.as_u16()),
            TokenEndpointError::MissingField(_) | TokenEndpointError::InvalidField { .. } => None,
        }
    }
}

/// Token lifecycle failures.
///
/// Every variant except `Store` means the caller has to run the interactive
/// authorization flow again before any API call can succeed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("no usable credential stored, interactive authorization required")]
    AuthRequired,

    #[error("token refresh failed, interactive authorization required: {0}")]
    RefreshFailed(#[source] TokenEndpointError),

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(#[source] TokenEndpointError),

    #[error("authorization denied: {error}{}", describe(.description))]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    #[error("authorization callback closed without delivering a code")]
    CallbackAbandoned,

    #[error("failed to persist credential: {0}")]
    Store(#[from] StoreError),
}

fn describe(description: &Option<String>) -> String {
    match description {
        Some(d) if !d.is_empty() => format!(" - {}", d),
        _ => String::new(),
    }
}

/// A paginated fetch that could not run to completion.
///
/// Items accumulated from earlier pages are discarded; a fetch either
/// returns the whole collection or one of these.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("page request to {url} failed with status {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("page request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("page from {url} could not be decoded: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("nextPage link points to offset {next}, which does not advance past {current}")]
    Stalled { current: u64, next: u64 },
}

impl FetchError {
    /// HTTP status of the failed page request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_denied_display() {
        let err = AuthError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "authorization denied: access_denied - User cancelled"
        );

        let err = AuthError::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "authorization denied: access_denied");
    }

    #[test]
    fn test_refresh_failed_keeps_cause() {
        let err = AuthError::RefreshFailed(TokenEndpointError::Status {
            status: 400,
            body: r#"{"error":"invalid_grant"}"#.to_string(),
        });
        assert!(err.to_string().contains("status 400"));
        assert!(err.to_string().contains("invalid_grant"));

        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_fetch_status_accessor() {
        let err = FetchError::Status {
            url: "http://localhost/organizations".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(FetchError::Auth(AuthError::AuthRequired).status(), None);
    }
}
