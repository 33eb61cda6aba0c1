//! Delegated session backend: every operation goes to the identity provider.
//!
//! The provider client may be missing even in delegated mode (bad URL, HTTP
//! client failure). The mode does not fall back to local in that case: each
//! operation reports `ProviderUnavailable` instead.

use std::sync::Arc;

use tracing::warn;

use super::backend::SessionBackend;
use super::types::{AuthError, SignupOutcome, User};
use crate::config::ProviderConfig;
use crate::error::ErrorCode;
use crate::provider::{GoTrueClient, IdentityProvider, SignUpResult};
use crate::storage::Storage;

pub struct DelegatedSession {
    provider: Option<Arc<dyn IdentityProvider>>,
}

impl DelegatedSession {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider: Some(provider) }
    }

    /// Delegated mode without a usable provider client.
    #[must_use]
    pub fn unavailable() -> Self {
        Self { provider: None }
    }

    /// Build the HTTP provider client; a construction failure is logged and
    /// leaves the backend unavailable.
    #[must_use]
    pub fn from_config(config: &ProviderConfig, storage: Arc<dyn Storage>) -> Self {
        match GoTrueClient::new(config, storage) {
            Ok(client) => Self::new(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), url = %config.url, "identity provider unavailable");
                Self::unavailable()
            }
        }
    }

    #[must_use]
    pub fn provider(&self) -> Option<&Arc<dyn IdentityProvider>> {
        self.provider.as_ref()
    }

    fn require(&self) -> Result<&Arc<dyn IdentityProvider>, AuthError> {
        self.provider.as_ref().ok_or(AuthError::ProviderUnavailable)
    }
}

#[async_trait::async_trait]
impl SessionBackend for DelegatedSession {
    async fn resolve(&self) -> Result<Option<User>, AuthError> {
        let session = self.require()?.get_session().await?;
        Ok(session.map(|s| User::from(&s.user)))
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let session = self.require()?.sign_in_with_password(email, password).await?;
        Ok(User::from(&session.user))
    }

    async fn signup(&self, email: &str, password: &str, display_name: Option<&str>) -> Result<SignupOutcome, AuthError> {
        let outcome = match self.require()?.sign_up(email, password, display_name).await? {
            SignUpResult::Session(session) => SignupOutcome::Active(User::from(&session.user)),
            SignUpResult::PendingConfirmation(user) => {
                SignupOutcome::ConfirmationRequired { email: user.email.unwrap_or_else(|| email.to_string()) }
            }
        };
        Ok(outcome)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        match &self.provider {
            Some(provider) => Ok(provider.sign_out().await?),
            None => Ok(()),
        }
    }
}
