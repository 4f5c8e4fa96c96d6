//! Durable storage for the OAuth token set.
//!
//! The system manages a single account, so exactly one [`Credential`] is
//! persisted at a time, as a small JSON file:
//!
//! ```text
//! {
//!   "access_token": "...",
//!   "refresh_token": "...",
//!   "expires_in": 43200,
//!   "token_acquired_time": 1718000000.123
//! }
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use furrow::credentials::{Credential, CredentialStore};
//!
//! # fn main() -> anyhow::Result<()> {
//! let store = CredentialStore::new("tokens.json");
//!
//! let credential = Credential::acquired_now("access", "refresh", 43200);
//! store.save(&credential)?;
//!
//! if let Some(credential) = store.load()? {
//!     println!("expires in {}s", credential.expires_in);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only the token manager writes through the store; everything else asks
//! the manager for a valid credential.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

mod storage;

pub use storage::CredentialStore;

/// Longest token lifetime accepted from the token endpoint or the file
/// (ten years). Anything larger is treated as corrupt.
pub const MAX_EXPIRES_IN_SECONDS: i64 = 10 * 365 * 24 * 60 * 60;

/// True if `expires_in` is a usable token lifetime.
pub fn is_valid_lifetime(expires_in: i64) -> bool {
    expires_in > 0 && expires_in <= MAX_EXPIRES_IN_SECONDS
}

/// Grace period as a duration, clamped to `0..=MAX_EXPIRES_IN_SECONDS`.
pub(crate) fn grace_period(seconds: i64) -> Duration {
    Duration::try_seconds(seconds.clamp(0, MAX_EXPIRES_IN_SECONDS)).unwrap_or_else(Duration::zero)
}

/// A complete OAuth token set.
///
/// Incomplete records (any field missing or empty, or a lifetime outside
/// `1..=MAX_EXPIRES_IN_SECONDS`) never become a
/// `Credential`; see [`StoredCredential::into_complete`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token sent with every API request
    pub access_token: String,

    /// Used to mint a new access token; may rotate on refresh
    pub refresh_token: String,

    /// Validity of `access_token` in seconds, counted from `acquired_at`
    pub expires_in: i64,

    /// Local time at which the token set was obtained
    pub acquired_at: DateTime<Utc>,
}

impl Credential {
    /// Builds a credential stamped with the current time.
    pub fn acquired_now(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in: i64,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_in,
            acquired_at: now(),
        }
    }

    /// Time left before `access_token` expires, by the local clock.
    ///
    /// Negative once expired. This is an estimate; callers compare it
    /// against a grace period instead of zero. A lifetime outside
    /// `1..=MAX_EXPIRES_IN_SECONDS` counts as already expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let lifetime = if is_valid_lifetime(self.expires_in) {
            Duration::try_seconds(self.expires_in).unwrap_or_else(Duration::zero)
        } else {
            Duration::zero()
        };
        lifetime - (now - self.acquired_at)
    }

    /// True if the access token stays valid for more than `grace`.
    pub fn is_fresh(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.remaining(now) > grace
    }

    /// Short token prefix for diagnostics.
    pub fn access_token_hint(&self) -> &str {
        let end = self
            .access_token
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.access_token.len());
        &self.access_token[..end]
    }
}

/// Current time at the precision the credential file stores.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// On-disk shape of the credential file.
///
/// Every field is optional because files written by older tooling may
/// carry nulls or omit keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoredCredential {
    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default)]
    pub expires_in: Option<i64>,

    /// Seconds since the Unix epoch
    #[serde(default, with = "epoch_seconds")]
    pub token_acquired_time: Option<DateTime<Utc>>,
}

impl StoredCredential {
    /// Validates the record, returning `None` if any field is missing or
    /// empty, or the lifetime is not positive or exceeds the ceiling.
    pub fn into_complete(self) -> Option<Credential> {
        let access_token = self.access_token.filter(|t| !t.is_empty())?;
        let refresh_token = self.refresh_token.filter(|t| !t.is_empty())?;
        let expires_in = self.expires_in.filter(|e| is_valid_lifetime(*e))?;
        let acquired_at = self.token_acquired_time?;
        Some(Credential {
            access_token,
            refresh_token,
            expires_in,
            acquired_at,
        })
    }
}

impl From<&Credential> for StoredCredential {
    fn from(credential: &Credential) -> Self {
        Self {
            access_token: Some(credential.access_token.clone()),
            refresh_token: Some(credential.refresh_token.clone()),
            expires_in: Some(credential.expires_in),
            token_acquired_time: Some(credential.acquired_at),
        }
    }
}

/// Epoch seconds as a float with millisecond precision; integers are
/// accepted on read.
mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_f64(dt.timestamp_millis() as f64 / 1000.0),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<f64>::deserialize(deserializer)?;
        match secs {
            None => Ok(None),
            Some(secs) if !secs.is_finite() => Err(serde::de::Error::custom(
                "token_acquired_time is not a finite number",
            )),
            Some(secs) => DateTime::from_timestamp_millis((secs * 1000.0).round() as i64)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom("token_acquired_time out of range")),
        }
    }
}
