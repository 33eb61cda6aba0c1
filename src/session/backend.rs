//! Backend dispatch: one interface, two implementations, picked once.

use super::delegated::DelegatedSession;
use super::local::LocalSession;
use super::types::{AuthError, SignupOutcome, User};
use crate::config::AuthMode;

/// Operations every session backend provides.
#[async_trait::async_trait]
pub trait SessionBackend: Send + Sync {
    /// Look up a session that already exists (persisted record or provider session).
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the lookup itself fails.
    async fn resolve(&self) -> Result<Option<User>, AuthError>;

    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] on a credential mismatch.
    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError>;

    /// # Errors
    ///
    /// Returns an [`AuthError`] if the account could not be created.
    async fn signup(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<SignupOutcome, AuthError>;

    /// # Errors
    ///
    /// Returns an [`AuthError`] if the session could not be torn down cleanly.
    async fn logout(&self) -> Result<(), AuthError>;
}

/// Concrete backend selected at construction.
pub enum Backend {
    Delegated(DelegatedSession),
    Local(LocalSession),
}

impl Backend {
    #[must_use]
    pub fn mode(&self) -> AuthMode {
        match self {
            Self::Delegated(_) => AuthMode::Delegated,
            Self::Local(_) => AuthMode::Local,
        }
    }

    pub(crate) fn as_backend(&self) -> &dyn SessionBackend {
        match self {
            Self::Delegated(b) => b,
            Self::Local(b) => b,
        }
    }
}
