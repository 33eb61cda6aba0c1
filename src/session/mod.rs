//! Session facade: one auth contract for UI code, whatever backs it.
//!
//! ARCHITECTURE
//! ============
//! `SessionManager` is built once at boot and shared by `Arc`. It owns a
//! [`Backend`] chosen from configuration (delegated to an identity provider,
//! or a local demo account) and publishes a [`SessionState`] snapshot on a
//! `watch` channel; UI code re-renders from that channel.
//!
//! DESIGN
//! ======
//! - Every operation returns a `Result`; backend errors are normalized into
//!   [`AuthFailure`] at this boundary and logged with their detail.
//! - `resolve` runs at most once per manager. In delegated mode it also
//!   subscribes to provider session changes for the manager's lifetime and,
//!   after the startup read, starts the provider's background refresh.
//! - `loading` is raised for the duration of each operation. Overlapping
//!   operations are not serialized; whichever finishes last lowers it.

pub mod backend;
pub mod delegated;
pub mod local;
pub mod types;

use std::sync::{Arc, Mutex};

use tokio::sync::{OnceCell, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub use backend::{Backend, SessionBackend};
pub use delegated::DelegatedSession;
pub use local::LocalSession;
pub use types::{AuthError, AuthFailure, AuthFailureKind, AuthOperation, SessionState, SignupOutcome, User};

use crate::config::{AuthMode, SessionConfig};
use crate::error::ErrorCode;
use crate::provider::{AuthEvent, IdentityProvider};
use crate::storage::{FileStorage, Storage, StorageError};

// =============================================================================
// SESSION MANAGER
// =============================================================================

pub struct SessionManager {
    backend: Backend,
    state: Arc<watch::Sender<SessionState>>,
    resolved: OnceCell<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(backend: Backend) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { backend, state: Arc::new(state), resolved: OnceCell::new(), tasks: Mutex::new(Vec::new()) }
    }

    /// Build from config with file storage under `config.storage_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage directory cannot be created.
    pub fn from_config(config: &SessionConfig) -> Result<Self, StorageError> {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.storage_dir)?);
        Ok(Self::with_storage(config, storage))
    }

    /// Build from config on top of an existing storage backend.
    #[must_use]
    pub fn with_storage(config: &SessionConfig, storage: Arc<dyn Storage>) -> Self {
        let backend = match (config.mode, &config.provider) {
            (AuthMode::Delegated, Some(provider)) => Backend::Delegated(DelegatedSession::from_config(provider, storage)),
            (AuthMode::Delegated, None) => Backend::Delegated(DelegatedSession::unavailable()),
            (AuthMode::Local, _) => Backend::Local(LocalSession::new(storage)),
        };
        info!(mode = %backend.mode(), "session manager created");
        Self::new(backend)
    }

    #[must_use]
    pub fn mode(&self) -> AuthMode {
        self.backend.mode()
    }

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every state change from now on.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Resolve the startup session. Only the first call does any work;
    /// concurrent callers wait for it. Always ends with `loading == false`.
    pub async fn resolve(&self) -> SessionState {
        self.resolved.get_or_init(|| self.resolve_once()).await;
        self.snapshot()
    }

    async fn resolve_once(&self) {
        let provider = match &self.backend {
            Backend::Delegated(delegated) => delegated.provider().cloned(),
            Backend::Local(_) => None,
        };
        if let Some(provider) = &provider {
            // Subscribe before reading so no change slips between the two.
            self.watch_provider(provider);
        }

        let user = match self.backend.as_backend().resolve().await {
            Ok(user) => user,
            Err(e) => {
                error!(error = %e, code = e.error_code(), mode = %self.mode(), "session resolution failed");
                None
            }
        };

        debug!(authenticated = user.is_some(), "session resolved");
        self.state.send_modify(|s| {
            s.user = user;
            s.loading = false;
        });

        // Background refresh starts only once the startup read is done.
        if let Some(refresh) = provider.and_then(|p| p.start_auto_refresh()) {
            self.lock_tasks().push(refresh);
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn watch_provider(&self, provider: &Arc<dyn IdentityProvider>) {
        let mut events = provider.subscribe();
        let state = Arc::clone(&self.state);
        let listener = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => apply_event(&state, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session listener lagged behind provider events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        self.lock_tasks().push(listener);
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`]; `user` is untouched on failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthFailure> {
        self.set_loading(true);
        let result = self.backend.as_backend().login(email, password).await;
        let outcome = match result {
            Ok(user) => {
                self.state.send_modify(|s| s.user = Some(user.clone()));
                Ok(user)
            }
            Err(e) => Err(self.fail(AuthOperation::Login, e)),
        };
        self.set_loading(false);
        outcome
    }

    /// Create an account. Local accounts are signed in immediately; a
    /// provider may instead require confirmation, in which case nobody is
    /// signed in afterwards.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthFailure`]; `user` is untouched on failure.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<SignupOutcome, AuthFailure> {
        self.set_loading(true);
        let result = self.backend.as_backend().signup(email, password, display_name).await;
        let outcome = match result {
            Ok(SignupOutcome::Active(user)) => {
                self.state.send_modify(|s| s.user = Some(user.clone()));
                Ok(SignupOutcome::Active(user))
            }
            Ok(pending) => Ok(pending),
            Err(e) => Err(self.fail(AuthOperation::Signup, e)),
        };
        self.set_loading(false);
        outcome
    }

    /// Sign out. Best effort: backend errors are logged, never returned, and
    /// the user is cleared either way.
    pub async fn logout(&self) {
        self.set_loading(true);
        if let Err(e) = self.backend.as_backend().logout().await {
            error!(error = %e, code = e.error_code(), "logout error");
        }
        self.state.send_modify(|s| {
            s.user = None;
            s.loading = false;
        });
        info!("signed out");
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|s| s.loading = loading);
    }

    fn fail(&self, op: AuthOperation, err: AuthError) -> AuthFailure {
        match &err {
            AuthError::InvalidCredentials(_) => debug!(?op, "credentials rejected"),
            _ => error!(?op, error = %err, code = err.error_code(), mode = %self.mode(), "auth operation failed"),
        }
        AuthFailure::normalize(op, err)
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

fn apply_event(state: &watch::Sender<SessionState>, event: &AuthEvent) {
    let user = event.session.as_ref().map(|s| User::from(&s.user));
    debug!(kind = ?event.kind, authenticated = user.is_some(), "provider session changed");
    state.send_modify(|s| s.user = user);
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
