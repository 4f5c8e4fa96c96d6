//! Handoff between the browser-redirect listener and the token manager.
//!
//! The listener itself lives outside this crate. It parses the redirect
//! query with [`CallbackOutcome::from_query`] and posts exactly one outcome
//! through a [`CallbackSender`]; the token manager awaits the paired
//! receiver in [`TokenManager::bootstrap_from_callback`].
//!
//! [`TokenManager::bootstrap_from_callback`]: super::TokenManager::bootstrap_from_callback

use serde::Deserialize;
use tokio::sync::oneshot;

/// Result of the authorization redirect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The user approved; one-time authorization code
    Code(String),
    /// The provider reported an error (e.g. `access_denied`)
    Denied {
        error: String,
        description: Option<String>,
    },
}

/// OAuth callback query parameters
#[derive(Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackOutcome {
    /// Parses a redirect query string (without the leading `?`).
    ///
    /// Returns `None` for requests carrying neither `code` nor `error`,
    /// such as a browser fetching `/favicon.ico`; the listener should keep
    /// waiting in that case.
    pub fn from_query(query: &str) -> Option<Self> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let parsed: CallbackQuery = serde_urlencoded::from_str(query).ok()?;

        if let Some(error) = parsed.error {
            return Some(CallbackOutcome::Denied {
                error,
                description: parsed.error_description,
            });
        }
        parsed
            .code
            .filter(|c| !c.is_empty())
            .map(CallbackOutcome::Code)
    }
}

/// Single-use sending half of the callback rendezvous.
#[derive(Debug)]
pub struct CallbackSender {
    tx: oneshot::Sender<CallbackOutcome>,
}

impl CallbackSender {
    /// Delivers the outcome. Returns it back if the receiver is gone.
    pub fn send(self, outcome: CallbackOutcome) -> Result<(), CallbackOutcome> {
        self.tx.send(outcome)
    }
}

/// Creates the single-slot channel the callback listener posts into.
pub fn callback_channel() -> (CallbackSender, oneshot::Receiver<CallbackOutcome>) {
    let (tx, rx) = oneshot::channel();
    (CallbackSender { tx }, rx)
}
