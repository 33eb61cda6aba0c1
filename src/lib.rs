//! tiny-session: one session contract over a hosted identity provider or a
//! local demo account, plus the two client-state stores that ride along.
//!
//! ARCHITECTURE
//! ============
//! - `config`: environment-derived settings and auth mode detection.
//! - `storage`: durable string key-value storage (file or memory).
//! - `provider`: the identity provider seam and its GoTrue HTTP client.
//! - `session`: the `SessionManager` facade and its two backends.
//! - `counter`: persisted counter store.
//! - `posts`: posts REST client and query cache.
//!
//! Every module error implements [`error::ErrorCode`].

pub mod config;
pub mod counter;
pub mod error;
pub mod posts;
pub mod provider;
pub mod session;
pub mod storage;

pub use config::{AuthMode, SessionConfig};
pub use counter::CounterStore;
pub use error::ErrorCode;
pub use posts::{Post, PostsClient, PostsQuery};
pub use session::{AuthFailure, AuthFailureKind, SessionManager, SessionState, SignupOutcome, User};
pub use storage::{FileStorage, MemoryStorage, Storage};
