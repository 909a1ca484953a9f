//! Fixed-window rate limiting for the public notify-send path.
//!
//! Counter semantics: INCR, then set the expiry only when this increment
//! created the key, so the count and its window always age together. A
//! backing-store failure fails open; availability wins over strict
//! enforcement and the failure is logged for investigation.

use crate::config::RateLimit;
use crate::storage::{NotificationStore, keys};
use std::sync::Arc;
use tracing::warn;

pub struct RateLimiter {
    store: Arc<dyn NotificationStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Increment the counter for `key` and report whether the request is
    /// still within `limit` for the current window.
    pub async fn check_and_increment(&self, key: &str, limit: i64, window_seconds: u64) -> bool {
        let count = match self.store.incr(key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, key = %key, "Rate-limit increment failed, failing open");
                return true;
            }
        };

        if count == 1 {
            if let Err(e) = self.store.expire(key, window_seconds).await {
                warn!(error = %e, key = %key, "Rate-limit expiry set failed");
            }
        }

        count <= limit
    }

    /// Apply both notify-path scopes; a request passes only if neither the
    /// global nor the per-fid window is exceeded.
    pub async fn allow_notify(&self, fid: u64, global: &RateLimit, per_fid: &RateLimit) -> bool {
        let global_ok = self
            .check_and_increment(&keys::rate_global(), global.limit, global.window_seconds)
            .await;
        let fid_ok = self
            .check_and_increment(&keys::rate_fid(fid), per_fid.limit, per_fid.window_seconds)
            .await;
        global_ok && fid_ok
    }
}
