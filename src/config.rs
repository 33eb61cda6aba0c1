//! Runtime configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! All keys are read once through [`SessionConfig::from_lookup`], a pure
//! function over a key lookup. `from_env` feeds it the process environment;
//! tests feed it a map so they never touch global state.
//!
//! The authentication mode is derived from the two provider keys alone and
//! is fixed for the lifetime of whatever was built from this config.

use std::path::PathBuf;

pub const SUPABASE_URL_VAR: &str = "SUPABASE_URL";
pub const SUPABASE_ANON_KEY_VAR: &str = "SUPABASE_ANON_KEY";

pub const DEFAULT_STORAGE_DIR: &str = ".tiny-session";
pub const DEFAULT_AUTH_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_AUTH_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POSTS_API_BASE_URL: &str = "https://jsonplaceholder.typicode.com";
pub const DEFAULT_POSTS_STALE_SECS: u64 = 300;

// =============================================================================
// AUTH MODE
// =============================================================================

/// Which backend the session facade delegates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// An external identity provider handles every operation.
    Delegated,
    /// A single demo account backed by a locally persisted record.
    Local,
}

impl AuthMode {
    /// Delegated iff both provider values are present and non-empty.
    /// Whitespace counts as a value; a blank URL then fails client
    /// construction and the backend reports itself unavailable.
    #[must_use]
    pub fn detect(url: Option<&str>, anon_key: Option<&str>) -> Self {
        let present = |v: Option<&str>| v.is_some_and(|s| !s.is_empty());
        if present(url) && present(anon_key) { Self::Delegated } else { Self::Local }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delegated => "delegated",
            Self::Local => "local",
        }
    }
}

impl std::fmt::Display for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CONFIG TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_AUTH_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_AUTH_CONNECT_TIMEOUT_SECS }
    }
}

/// Identity provider coordinates. Only present in delegated mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub url: String,
    pub anon_key: String,
    pub timeouts: HttpTimeouts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostsConfig {
    pub base_url: String,
    pub stale_secs: u64,
}

impl Default for PostsConfig {
    fn default() -> Self {
        Self { base_url: DEFAULT_POSTS_API_BASE_URL.to_string(), stale_secs: DEFAULT_POSTS_STALE_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub mode: AuthMode,
    pub provider: Option<ProviderConfig>,
    pub storage_dir: PathBuf,
    pub posts: PostsConfig,
    pub setup: ProviderSetup,
}

impl SessionConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `SUPABASE_URL` + `SUPABASE_ANON_KEY`: both set selects delegated mode
    /// - `SESSION_STORAGE_DIR`: default `.tiny-session`
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    /// - `POSTS_API_BASE_URL`: default `https://jsonplaceholder.typicode.com`
    /// - `POSTS_STALE_SECS`: default 300
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(SUPABASE_URL_VAR);
        let anon_key = lookup(SUPABASE_ANON_KEY_VAR);
        let mode = AuthMode::detect(url.as_deref(), anon_key.as_deref());
        let setup = ProviderSetup {
            url: url.as_deref().filter(|u| !u.is_empty()).map(trim_url),
            has_anon_key: anon_key.as_deref().is_some_and(|k| !k.is_empty()),
            is_configured: mode == AuthMode::Delegated,
        };

        let provider = match (mode, url, anon_key) {
            (AuthMode::Delegated, Some(url), Some(anon_key)) => Some(ProviderConfig {
                url: trim_url(&url),
                anon_key: anon_key.trim().to_string(),
                timeouts: HttpTimeouts {
                    request_secs: parse_or(&lookup, "AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_AUTH_REQUEST_TIMEOUT_SECS),
                    connect_secs: parse_or(&lookup, "AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_AUTH_CONNECT_TIMEOUT_SECS),
                },
            }),
            _ => None,
        };

        let storage_dir = lookup("SESSION_STORAGE_DIR")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);

        let posts = PostsConfig {
            base_url: lookup("POSTS_API_BASE_URL")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| DEFAULT_POSTS_API_BASE_URL.to_string(), |v| trim_url(&v)),
            stale_secs: parse_or(&lookup, "POSTS_STALE_SECS", DEFAULT_POSTS_STALE_SECS),
        };

        Self { mode, provider, storage_dir, posts, setup }
    }
}

/// What the process knows about its identity provider, without the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSetup {
    pub url: Option<String>,
    pub has_anon_key: bool,
    pub is_configured: bool,
}

fn trim_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
