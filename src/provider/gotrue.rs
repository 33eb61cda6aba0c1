//! GoTrue-compatible auth REST client.
//!
//! ARCHITECTURE
//! ============
//! Thin HTTP wrapper for `/auth/v1/token`, `/auth/v1/signup` and
//! `/auth/v1/logout`. The current session is cached in memory and mirrored
//! to storage under `sb-<project-ref>-auth-token`, so a restarted process
//! picks up where it left off. Every session change is broadcast as an
//! [`AuthEvent`].
//!
//! Response parsing lives in pure functions (`parse_token_response`,
//! `parse_signup_response`, `classify_error`) for testability.
//!
//! Refreshes are single-flight: callers queue on `refresh_lock`, re-read the
//! current session once they hold it, and skip the network call if someone
//! else already replaced it. A rejected refresh token only clears the session
//! if that token is still the current one.
//!
//! TRADE-OFFS
//! ==========
//! Sign-out clears the local session before reporting any server error:
//! a user who asked to leave is never kept signed in by a flaky network.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use reqwest::Url;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    AuthEvent, AuthEventKind, IdentityProvider, ProviderError, ProviderSession, ProviderUser, SignUpResult, now_secs,
};
use crate::config::ProviderConfig;
use crate::storage::{Storage, load_json, save_json};

const USER_AGENT: &str = concat!("tiny-session/", env!("CARGO_PKG_VERSION"));
const EVENT_CAPACITY: usize = 16;

/// Sessions expiring within this margin are refreshed before being handed out.
pub const REFRESH_MARGIN_SECS: i64 = 90;
pub const AUTO_REFRESH_TICK_SECS: u64 = 30;
/// Number of ticks ahead of expiry at which the background task refreshes.
pub const AUTO_REFRESH_TICK_THRESHOLD: i64 = 3;

// =============================================================================
// CLIENT
// =============================================================================

pub struct GoTrueClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    storage: Arc<dyn Storage>,
    storage_key: String,
    session: Mutex<Option<ProviderSession>>,
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<AuthEvent>,
}

impl GoTrueClient {
    /// Build a client and load any session persisted by a previous run.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not http(s) or the HTTP client fails to build.
    pub fn new(config: &ProviderConfig, storage: Arc<dyn Storage>) -> Result<Self, ProviderError> {
        let url = Url::parse(&config.url).map_err(|e| ProviderError::InvalidUrl(format!("{}: {e}", config.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProviderError::InvalidUrl(format!("unsupported scheme: {}", url.scheme())));
        }
        let storage_key = storage_key_for(&url);

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))?;

        let stored = match load_json::<ProviderSession>(storage.as_ref(), &storage_key) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, key = %storage_key, "could not read stored provider session");
                None
            }
        };

        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            storage,
            storage_key,
            session: Mutex::new(stored),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        })
    }

    /// Storage key the session is persisted under.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.storage_key
    }

    /// Refresh the current session if it expires within `margin_secs`.
    /// Returns the session in effect afterwards; `None` when there is none
    /// or its refresh token was rejected.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] when the provider could not be reached or
    /// answered with a server error; the current session is kept.
    pub async fn refresh_if_expiring(&self, margin_secs: i64) -> Result<Option<ProviderSession>, ProviderError> {
        let _turn = self.refresh_lock.lock().await;
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.expires_within(now_secs(), margin_secs) {
            return Ok(Some(session));
        }

        match self.exchange_refresh_token(&session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(ProviderError::Rejected { message, .. }) => {
                warn!(%message, "refresh token rejected");
                if self.clear_session_if(&session.refresh_token) {
                    self.emit(AuthEventKind::SignedOut, None);
                }
                Ok(self.current())
            }
            Err(e) => Err(e),
        }
    }

    async fn exchange_refresh_token(&self, refresh_token: &str) -> Result<ProviderSession, ProviderError> {
        debug!("refreshing provider session");
        let body = self
            .post_json("token?grant_type=refresh_token", &self.anon_key, &json!({ "refresh_token": refresh_token }))
            .await?;
        let session = parse_token_response(&body, now_secs())?;
        self.store_session(&session)?;
        self.emit(AuthEventKind::TokenRefreshed, Some(session.clone()));
        info!(user_id = %session.user.id, "provider session refreshed");
        Ok(session)
    }

    fn current(&self) -> Option<ProviderSession> {
        self.session.lock().ok().and_then(|s| s.clone())
    }

    fn store_session(&self, session: &ProviderSession) -> Result<(), ProviderError> {
        if let Ok(mut current) = self.session.lock() {
            *current = Some(session.clone());
        }
        save_json(self.storage.as_ref(), &self.storage_key, session)?;
        Ok(())
    }

    /// Clear the session only if it still carries `refresh_token`.
    fn clear_session_if(&self, refresh_token: &str) -> bool {
        let still_current = self.current().is_some_and(|s| s.refresh_token == refresh_token);
        if still_current {
            self.clear_session();
        }
        still_current
    }

    fn clear_session(&self) -> Option<ProviderSession> {
        let previous = self.session.lock().ok().and_then(|mut s| s.take());
        if let Err(e) = self.storage.remove_item(&self.storage_key) {
            warn!(error = %e, "could not remove stored provider session");
        }
        previous
    }

    fn emit(&self, kind: AuthEventKind, session: Option<ProviderSession>) {
        // No subscribers is fine.
        let _ = self.events.send(AuthEvent { kind, session });
    }

    async fn post_json(&self, path: &str, bearer: &str, body: &serde_json::Value) -> Result<String, ProviderError> {
        let url = format!("{}/auth/v1/{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !(200..300).contains(&status) {
            return Err(classify_error(status, &text));
        }
        Ok(text)
    }

    async fn auto_refresh_tick(&self) {
        let horizon = i64::try_from(AUTO_REFRESH_TICK_SECS).unwrap_or(i64::MAX) * AUTO_REFRESH_TICK_THRESHOLD;
        if let Err(e) = self.refresh_if_expiring(horizon).await {
            warn!(error = %e, "background session refresh failed");
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_session(&self) -> Result<Option<ProviderSession>, ProviderError> {
        let Some(session) = self.current() else {
            return Ok(None);
        };
        if !session.expires_within(now_secs(), REFRESH_MARGIN_SECS) {
            return Ok(Some(session));
        }
        self.refresh_if_expiring(REFRESH_MARGIN_SECS).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<ProviderSession, ProviderError> {
        debug!(%email, "provider password sign-in");
        let body = self
            .post_json(
                "token?grant_type=password",
                &self.anon_key,
                &json!({ "email": email, "password": password }),
            )
            .await?;
        let session = parse_token_response(&body, now_secs())?;
        self.store_session(&session)?;
        self.emit(AuthEventKind::SignedIn, Some(session.clone()));
        info!(user_id = %session.user.id, "provider sign-in succeeded");
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<SignUpResult, ProviderError> {
        debug!(%email, "provider sign-up");
        let body = self
            .post_json(
                "signup",
                &self.anon_key,
                &json!({ "email": email, "password": password, "data": { "full_name": full_name } }),
            )
            .await?;
        let result = parse_signup_response(&body, now_secs())?;
        match &result {
            SignUpResult::Session(session) => {
                self.store_session(session)?;
                self.emit(AuthEventKind::SignedIn, Some(session.clone()));
                info!(user_id = %session.user.id, "provider sign-up confirmed immediately");
            }
            SignUpResult::PendingConfirmation(user) => {
                info!(user_id = %user.id, "provider sign-up awaiting confirmation");
            }
        }
        Ok(result)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let Some(session) = self.clear_session() else {
            return Ok(());
        };
        self.emit(AuthEventKind::SignedOut, None);

        match self.post_json("logout", &session.access_token, &json!({})).await {
            Ok(_) | Err(ProviderError::Rejected { status: 401 | 403 | 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn start_auto_refresh(self: Arc<Self>) -> Option<JoinHandle<()>> {
        let weak: Weak<Self> = Arc::downgrade(&self);
        drop(self);
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(AUTO_REFRESH_TICK_SECS));
            loop {
                interval.tick().await;
                let Some(client) = weak.upgrade() else {
                    break;
                };
                client.auto_refresh_tick().await;
            }
        }))
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
    #[serde(default)]
    expires_at: Option<i64>,
    user: ProviderUser,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// `sb-<first host label>-auth-token`, matching the JS client's key.
fn storage_key_for(url: &Url) -> String {
    let project_ref = url
        .host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty())
        .unwrap_or("local");
    format!("sb-{project_ref}-auth-token")
}

fn parse_token_response(json: &str, now: i64) -> Result<ProviderSession, ProviderError> {
    let resp: TokenResponse = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(ProviderSession {
        access_token: resp.access_token,
        refresh_token: resp.refresh_token,
        expires_at: resp.expires_at.unwrap_or(now + resp.expires_in),
        user: resp.user,
    })
}

/// Sign-up answers with a full token response when confirmation is off and
/// with the bare user otherwise.
fn parse_signup_response(json: &str, now: i64) -> Result<SignUpResult, ProviderError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    if value.get("access_token").is_some() {
        return parse_token_response(json, now).map(SignUpResult::Session);
    }
    let user_value = value.get("user").cloned().unwrap_or(value);
    let user: ProviderUser = serde_json::from_value(user_value).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(SignUpResult::PendingConfirmation(user))
}

fn parse_error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
}

fn classify_error(status: u16, body: &str) -> ProviderError {
    let message = parse_error_message(body).unwrap_or_else(|| format!("request failed with status {status}"));
    if (400..500).contains(&status) && status != 429 {
        ProviderError::Rejected { status, message }
    } else {
        ProviderError::Api { status, message }
    }
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
