//! Local session backend: one demo account, persisted in client storage.
//!
//! Used whenever no identity provider is configured. Login accepts exactly
//! one credential pair; sign-up accepts anyone and signs them in at once.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use super::backend::SessionBackend;
use super::types::{AuthError, SignupOutcome, User};
use crate::storage::{Storage, load_json, save_json};

pub const DEMO_EMAIL: &str = "demo@example.com";
pub const DEMO_PASSWORD: &str = "password";
pub const DEMO_USER_ID: &str = "demo-123";
pub const DEMO_USER_KEY: &str = "tiny-machines-demo-user";
pub const DEFAULT_DISPLAY_NAME: &str = "Demo User";

pub struct LocalSession {
    storage: Arc<dyn Storage>,
}

impl LocalSession {
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// The persisted record, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if the storage backend fails.
    pub fn stored_user(&self) -> Result<Option<User>, AuthError> {
        Ok(load_json(self.storage.as_ref(), DEMO_USER_KEY)?)
    }

    fn activate(&self, user: User) -> Result<User, AuthError> {
        save_json(self.storage.as_ref(), DEMO_USER_KEY, &user)?;
        Ok(user)
    }
}

/// Time-ordered and unique per call within the process.
#[must_use]
pub fn generate_local_id() -> String {
    format!("demo-{}", Uuid::now_v7())
}

#[async_trait::async_trait]
impl SessionBackend for LocalSession {
    async fn resolve(&self) -> Result<Option<User>, AuthError> {
        let user = self.stored_user()?;
        debug!(found = user.is_some(), "local session resolved");
        Ok(user)
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        if email != DEMO_EMAIL || password != DEMO_PASSWORD {
            return Err(AuthError::InvalidCredentials(format!(
                "Invalid credentials. Try: {DEMO_EMAIL} / {DEMO_PASSWORD}"
            )));
        }
        let user = User {
            id: DEMO_USER_ID.to_string(),
            email: DEMO_EMAIL.to_string(),
            display_name: Some(DEFAULT_DISPLAY_NAME.to_string()),
            avatar_url: None,
        };
        info!("demo user signed in");
        self.activate(user)
    }

    async fn signup(&self, email: &str, _password: &str, display_name: Option<&str>) -> Result<SignupOutcome, AuthError> {
        let display_name = display_name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME);
        let user = User {
            id: generate_local_id(),
            email: email.to_string(),
            display_name: Some(display_name.to_string()),
            avatar_url: None,
        };
        info!(user_id = %user.id, "local account created");
        self.activate(user).map(SignupOutcome::Active)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.storage.remove_item(DEMO_USER_KEY)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "local_test.rs"]
mod tests;
