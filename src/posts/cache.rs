//! Query cache over [`PostsApi`].
//!
//! DESIGN
//! ======
//! - The list and each single post are separate entries stamped with their
//!   fetch time. An entry younger than `stale_time` and not invalidated is
//!   served without a request.
//! - Reads retry: after `n` earlier failures a retryable error waits
//!   `min(base * 2^n, max_delay)` and tries again, up to `max_failures`
//!   retries. Client errors (4xx) surface immediately.
//! - `create_post` never retries. Success prepends to the cached list;
//!   failure marks the list stale so the next read refetches.
//!
//! Locks are never held across an await. Two concurrent misses for the
//! same entry both hit the network; the later write wins.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{NewPost, Post, PostsApi, PostsError};
use crate::config::PostsConfig;
use crate::error::ErrorCode;

pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_FAILURES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryConfig {
    pub stale_time: Duration,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
    pub max_failures: u32,
}

impl QueryConfig {
    #[must_use]
    pub fn from_posts(config: &PostsConfig) -> Self {
        Self { stale_time: Duration::from_secs(config.stale_secs), ..Self::default() }
    }

    /// Whether a read that has already failed `failures` times should go again.
    #[must_use]
    pub fn should_retry(&self, failures: u32, err: &PostsError) -> bool {
        failures < self.max_failures && err.retryable()
    }

    #[must_use]
    pub fn retry_delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.retry_base_delay.saturating_mul(factor).min(self.max_retry_delay)
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(crate::config::DEFAULT_POSTS_STALE_SECS),
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            max_retry_delay: DEFAULT_MAX_RETRY_DELAY,
            max_failures: DEFAULT_MAX_FAILURES,
        }
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    fetched_at: Instant,
    invalidated: bool,
}

impl<T: Clone> Entry<T> {
    fn new(value: T) -> Self {
        Self { value, fetched_at: Instant::now(), invalidated: false }
    }

    fn fresh(&self, stale_time: Duration) -> Option<T> {
        (!self.invalidated && self.fetched_at.elapsed() < stale_time).then(|| self.value.clone())
    }
}

#[derive(Default)]
struct Cache {
    list: Option<Entry<Vec<Post>>>,
    items: HashMap<u64, Entry<Post>>,
}

// =============================================================================
// QUERY
// =============================================================================

pub struct PostsQuery {
    api: Arc<dyn PostsApi>,
    config: QueryConfig,
    cache: Mutex<Cache>,
}

impl PostsQuery {
    #[must_use]
    pub fn new(api: Arc<dyn PostsApi>, config: QueryConfig) -> Self {
        Self { api, config, cache: Mutex::new(Cache::default()) }
    }

    #[must_use]
    pub fn config(&self) -> QueryConfig {
        self.config
    }

    fn cache(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All posts, from cache when fresh.
    ///
    /// # Errors
    ///
    /// Returns the last [`PostsError`] once retries are exhausted.
    pub async fn posts(&self) -> Result<Vec<Post>, PostsError> {
        let cached = self.cache().list.as_ref().and_then(|e| e.fresh(self.config.stale_time));
        if let Some(posts) = cached {
            debug!(count = posts.len(), "posts served from cache");
            return Ok(posts);
        }
        let posts = self.with_retry("posts", || self.api.list_posts()).await?;
        self.cache().list = Some(Entry::new(posts.clone()));
        Ok(posts)
    }

    /// A single post. Id `0` is a disabled query: no request, `None`.
    ///
    /// # Errors
    ///
    /// Returns the last [`PostsError`] once retries are exhausted.
    pub async fn post(&self, id: u64) -> Result<Option<Post>, PostsError> {
        if id == 0 {
            return Ok(None);
        }
        let cached = self.cache().items.get(&id).and_then(|e| e.fresh(self.config.stale_time));
        if let Some(post) = cached {
            debug!(id, "post served from cache");
            return Ok(Some(post));
        }
        let post = self.with_retry("post", || self.api.get_post(id)).await?;
        self.cache().items.insert(id, Entry::new(post.clone()));
        Ok(Some(post))
    }

    /// Create a post and put it at the front of the cached list.
    ///
    /// # Errors
    ///
    /// Returns the [`PostsError`] from the single attempt; the cached list is
    /// marked stale.
    pub async fn create_post(&self, new_post: &NewPost) -> Result<Post, PostsError> {
        match self.api.create_post(new_post).await {
            Ok(post) => {
                let mut cache = self.cache();
                let mut posts = cache.list.take().map(|e| e.value).unwrap_or_default();
                posts.insert(0, post.clone());
                cache.list = Some(Entry::new(posts));
                debug!(id = post.id, "post created");
                Ok(post)
            }
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "create post failed, invalidating list");
                if let Some(list) = self.cache().list.as_mut() {
                    list.invalidated = true;
                }
                Err(e)
            }
        }
    }

    /// Mark every cached posts entry stale.
    pub fn invalidate_posts(&self) {
        let mut cache = self.cache();
        if let Some(list) = cache.list.as_mut() {
            list.invalidated = true;
        }
        for item in cache.items.values_mut() {
            item.invalidated = true;
        }
    }

    async fn with_retry<T, F, Fut>(&self, query: &'static str, mut fetch: F) -> Result<T, PostsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PostsError>>,
    {
        let mut failures = 0;
        loop {
            match fetch().await {
                Ok(value) => return Ok(value),
                Err(e) if self.config.should_retry(failures, &e) => {
                    let delay = self.config.retry_delay(failures);
                    warn!(query, error = %e, failures, delay_ms = delay.as_millis(), "query failed, retrying");
                    failures += 1;
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(query, error = %e, code = e.error_code(), failures, "query failed");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
