//! Session types: user record, observable state, and failures.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::provider::{ProviderError, ProviderUser};
use crate::storage::StorageError;

// =============================================================================
// USER
// =============================================================================

/// The signed-in user as the UI sees it.
///
/// Serialized in camelCase; this is also the shape of the persisted local
/// record, so field renames are a storage-format change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(rename = "fullName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl From<&ProviderUser> for User {
    fn from(user: &ProviderUser) -> Self {
        let meta = user.user_metadata.clone().unwrap_or_default();
        Self {
            id: user.id.clone(),
            email: user.email.clone().unwrap_or_default(),
            display_name: meta.full_name,
            avatar_url: meta.avatar_url,
        }
    }
}

// =============================================================================
// SESSION STATE
// =============================================================================

/// Observable session snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub loading: bool,
}

impl SessionState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }
}

impl Default for SessionState {
    /// Startup state: nobody signed in, resolution pending.
    fn default() -> Self {
        Self { user: None, loading: true }
    }
}

/// What a successful sign-up produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupOutcome {
    /// The new user is signed in.
    Active(User),
    /// The provider wants out-of-band confirmation first; nobody is signed in.
    ConfirmationRequired { email: String },
}

// =============================================================================
// BACKEND ERROR
// =============================================================================

/// Errors raised inside a session backend, before normalization.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),
    #[error("identity provider not available")]
    ProviderUnavailable,
    #[error("identity provider error: {0}")]
    Provider(ProviderError),
    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { message, .. } => Self::InvalidCredentials(message),
            other => Self::Provider(other),
        }
    }
}

impl ErrorCode for AuthError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials(_) => "E_INVALID_CREDENTIALS",
            Self::ProviderUnavailable => "E_PROVIDER_UNAVAILABLE",
            Self::Provider(e) => e.error_code(),
            Self::Storage(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// PUBLIC FAILURE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailureKind {
    InvalidCredentials,
    ProviderUnavailable,
    Unknown,
}

/// Which facade operation failed; picks the generic message for `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOperation {
    Login,
    Signup,
}

impl AuthOperation {
    fn generic_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed",
            Self::Signup => "Signup failed",
        }
    }
}

/// Failure handed back to UI code: a kind to branch on and a message to show.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AuthFailure {
    pub kind: AuthFailureKind,
    pub message: String,
}

impl AuthFailure {
    /// Fold a backend error into the public taxonomy. Provider responses
    /// keep their message; transport, decode and storage failures lose their
    /// detail here, so callers log it before normalizing.
    #[must_use]
    pub fn normalize(op: AuthOperation, err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(message) => Self { kind: AuthFailureKind::InvalidCredentials, message },
            AuthError::ProviderUnavailable => {
                Self { kind: AuthFailureKind::ProviderUnavailable, message: AuthError::ProviderUnavailable.to_string() }
            }
            AuthError::Provider(ProviderError::Api { message, .. }) => Self { kind: AuthFailureKind::Unknown, message },
            AuthError::Provider(_) | AuthError::Storage(_) => {
                Self { kind: AuthFailureKind::Unknown, message: op.generic_message().to_string() }
            }
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
