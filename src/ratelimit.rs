//! Fixed-window rate limiting behind an injectable store.
//!
//! The store holds per-key counters; `RateLimiter` applies the policy. Swap
//! `InMemoryRateLimitStore` for a shared-cache implementation when several
//! processes must share limits.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::ConversationError;

/// Counter for one key within its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    pub count: u32,
    pub expires_at: Instant,
}

impl RateWindow {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Counter storage.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Current, unexpired window for `key`.
    async fn get(&self, key: &str) -> Option<RateWindow>;

    /// Count one hit, opening a new window of length `window` if none is live.
    async fn increment(&self, key: &str, window: Duration) -> RateWindow;

    /// Forget `key`.
    async fn reset(&self, key: &str);
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    windows: RwLock<HashMap<String, RateWindow>>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired windows. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let mut windows = self.windows.write().await;
        drop_expired(&mut windows, Instant::now())
    }
}

fn drop_expired(windows: &mut HashMap<String, RateWindow>, now: Instant) -> usize {
    let before = windows.len();
    windows.retain(|_, w| !w.is_expired(now));
    let removed = before - windows.len();
    if removed > 0 {
        debug!(removed, "Purged expired rate-limit windows");
    }
    removed
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn get(&self, key: &str) -> Option<RateWindow> {
        let now = Instant::now();
        self.windows
            .read()
            .await
            .get(key)
            .copied()
            .filter(|w| !w.is_expired(now))
    }

    async fn increment(&self, key: &str, window: Duration) -> RateWindow {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        // Expired keys never come back on their own.
        drop_expired(&mut windows, now);
        let entry = windows.entry(key.to_string()).or_insert(RateWindow {
            count: 0,
            expires_at: now + window,
        });
        entry.count += 1;
        *entry
    }

    async fn reset(&self, key: &str) {
        self.windows.write().await.remove(key);
    }
}

/// At most `max_requests` per key per `window`.
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, max_requests: u32, window: Duration) -> Self {
        Self {
            store,
            max_requests,
            window,
        }
    }

    /// Record a request for `key`, failing once the window is full.
    pub async fn check(&self, key: &str) -> Result<(), ConversationError> {
        let current = self.store.increment(key, self.window).await;
        if current.count > self.max_requests {
            let retry_after = current.expires_at.saturating_duration_since(Instant::now());
            warn!(key, count = current.count, ?retry_after, "Rate limit exceeded");
            return Err(ConversationError::RateLimited {
                key: key.to_string(),
                retry_after,
            });
        }
        Ok(())
    }

    pub async fn reset(&self, key: &str) {
        self.store.reset(key).await;
    }
}
