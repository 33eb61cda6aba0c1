//! Identity provider: the external account service behind delegated mode.
//!
//! DESIGN
//! ======
//! [`IdentityProvider`] is the seam between the session facade and whatever
//! owns real accounts. The facade only ever needs five capabilities: read
//! the current session, sign in, sign up, sign out, and hear about session
//! changes. `GoTrueClient` implements them over HTTP; tests implement them
//! with in-memory mocks.

pub mod gotrue;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::ErrorCode;
use crate::storage::{Storage, StorageError};

pub use gotrue::GoTrueClient;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by identity provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The configured base URL is not a usable http(s) URL.
    #[error("invalid provider url: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The HTTP request never produced a response.
    #[error("provider request failed: {0}")]
    Request(String),

    /// The provider refused the operation (bad credentials, duplicate user, ...).
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The provider failed in a way that is not the caller's fault.
    #[error("provider error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The provider response body could not be deserialized.
    #[error("provider response parse failed: {0}")]
    Parse(String),

    /// The provider session could not be read from or written to storage.
    #[error("provider session storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ErrorCode for ProviderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidUrl(_) => "E_PROVIDER_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Request(_) => "E_PROVIDER_REQUEST",
            Self::Rejected { .. } => "E_PROVIDER_REJECTED",
            Self::Api { .. } => "E_PROVIDER_API",
            Self::Parse(_) => "E_PROVIDER_PARSE",
            Self::Storage(_) => "E_PROVIDER_STORAGE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Api { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// SESSION TYPES
// =============================================================================

/// Profile metadata attached to a provider account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Option<UserMetadata>,
}

/// Tokens plus the account they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds since Unix epoch.
    pub expires_at: i64,
    pub user: ProviderUser,
}

impl ProviderSession {
    /// True when the access token expires within `margin_secs` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: i64, margin_secs: i64) -> bool {
        now + margin_secs >= self.expires_at
    }
}

/// Result of a provider sign-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpResult {
    /// The account was confirmed immediately and a session exists.
    Session(ProviderSession),
    /// The account exists but must be confirmed out of band first.
    PendingConfirmation(ProviderUser),
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Session-change notification. `session` is `None` once signed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<ProviderSession>,
}

// =============================================================================
// PROVIDER TRAIT
// =============================================================================

/// Capabilities the session facade consumes from an identity provider.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current valid session, refreshing it first if it is about to expire.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the session could not be read or refreshed.
    async fn get_session(&self) -> Result<Option<ProviderSession>, ProviderError>;

    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] for bad credentials.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError>;

    /// # Errors
    ///
    /// Returns [`ProviderError::Rejected`] when the provider refuses the account.
    async fn sign_up(&self, email: &str, password: &str, full_name: Option<&str>)
    -> Result<SignUpResult, ProviderError>;

    /// Drop the current session. The local session is gone even on error.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider could not be told.
    async fn sign_out(&self) -> Result<(), ProviderError>;

    /// Receive every subsequent session change.
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    /// Start any background session maintenance. Providers without any
    /// return `None`.
    fn start_auto_refresh(self: Arc<Self>) -> Option<JoinHandle<()>> {
        None
    }
}

// =============================================================================
// SETUP CHECK
// =============================================================================

/// Outcome of [`check_provider_setup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    pub configured: bool,
    /// Unconfigured counts as working: local mode needs nothing.
    pub working: bool,
}

/// Verify that a configured provider client can actually be constructed.
#[must_use]
pub fn check_provider_setup(config: &SessionConfig, storage: Arc<dyn Storage>) -> SetupReport {
    let Some(provider) = &config.provider else {
        return SetupReport { configured: false, working: true };
    };
    match GoTrueClient::new(provider, storage) {
        Ok(_) => SetupReport { configured: true, working: true },
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "identity provider client failed to build");
            SetupReport { configured: true, working: false }
        }
    }
}

/// Seconds since Unix epoch.
#[must_use]
pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
