// Persisted OAuth token set
pub mod credentials;

// Token lifecycle: refresh, bootstrap, callback handoff
pub mod oauth;

// Paginated collection fetching
pub mod pagination;

// Named Operations Center endpoints
pub mod resources;

// Configuration (TOML + environment)
pub mod config;

pub mod error;

pub use credentials::{Credential, CredentialStore};
pub use error::{AuthError, FetchError, StoreError, TokenEndpointError};
pub use oauth::{AccessTokenSource, TokenManager};
pub use pagination::{PageFetcher, ResourceCollection};
