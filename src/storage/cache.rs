//! Redis cache pool management using deadpool-redis

use crate::errors::StoreError;
use anyhow::Result;
use deadpool_redis::{Config, Pool, Runtime};

/// Create a Redis connection pool from a Redis URL
///
/// # Arguments
/// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
///
/// # Returns
/// A deadpool-redis Pool configured for async operation
pub fn create_cache_pool(redis_url: &str) -> Result<Pool> {
    let cfg = Config::from_url(redis_url);
    cfg.create_pool(Some(Runtime::Tokio1)).map_err(|err| {
        StoreError::ConnectionFailed {
            details: format!("Failed to create Redis pool: {}", err),
        }
        .into()
    })
}

/// Key builders for the notification pipeline's persisted state.
///
/// Every key the pipeline writes is produced here so the layout stays in one
/// place and the admin key-introspection endpoints can enforce a prefix
/// allow-list against the same strings.
pub mod keys {
    /// Prefix for fence warn/expire/pending markers
    pub const FENCE_PREFIX: &str = "notif:fence";

    /// Prefix for wilt (12h) throttle markers
    pub const WILT_PREFIX: &str = "notif:plant12h";

    /// Prefix for rate-limit counters
    pub const RATE_PREFIX: &str = "notif:rate";

    /// Set of every fid that has ever been sent a notification
    pub const ELIGIBLE_FIDS: &str = "notif:eligible:fids";

    /// Cached enabled-fid list from the push gateway
    pub const ENABLED_FIDS_CACHE: &str = "notif:neynar:enabled_fids";

    /// Prefixes an admin may delete by pattern. Anything else is refused.
    pub const DELETABLE_PREFIXES: &[&str] = &["notif:fence:", "notif:plant12h:", "notif:rate:"];

    /// Guard for the advance fence warning, per (fid, plant)
    pub fn fence_warned(fid: u64, plant_id: u64) -> String {
        format!("{}:warned:fid:{}:plant:{}", FENCE_PREFIX, fid, plant_id)
    }

    /// Guard for the at-expiry fence push, per (fid, plant)
    pub fn fence_expired(fid: u64, plant_id: u64) -> String {
        format!("{}:expired:fid:{}:plant:{}", FENCE_PREFIX, fid, plant_id)
    }

    /// Write-ahead record of an observed active fence's expiry timestamp
    pub fn fence_pending(fid: u64, plant_id: u64) -> String {
        format!("{}:pending:fid:{}:plant:{}", FENCE_PREFIX, fid, plant_id)
    }

    /// Pattern matching every pending-fence marker for one fid
    pub fn fence_pending_pattern(fid: u64) -> String {
        format!("{}:pending:fid:{}:plant:*", FENCE_PREFIX, fid)
    }

    /// Extract the plant id from a pending-fence key
    pub fn plant_id_from_pending(key: &str) -> Option<u64> {
        key.rsplit(":plant:").next()?.parse().ok()
    }

    /// Recipient-level wilt throttle, caps pushes per fid regardless of how
    /// many plants qualify
    pub fn wilt_fid(fid: u64) -> String {
        format!("{}:fid:{}", WILT_PREFIX, fid)
    }

    /// Per-plant wilt throttle
    pub fn wilt_plant(fid: u64, plant_id: u64) -> String {
        format!("{}:fid:{}:plant:{}", WILT_PREFIX, fid, plant_id)
    }

    /// Global rate-limit counter
    pub fn rate_global() -> String {
        format!("{}:global", RATE_PREFIX)
    }

    /// Per-fid rate-limit counter
    pub fn rate_fid(fid: u64) -> String {
        format!("{}:fid:{}", RATE_PREFIX, fid)
    }

    /// Cached fid-to-address mapping
    pub fn fidmap(fid: u64) -> String {
        format!("fidmap:{}", fid)
    }

    /// Delivery log list, `scope` is "global" or "type:{type}"
    pub fn delivery_log(scope: &str) -> String {
        format!("notif:{}:log", scope)
    }

    /// Last-sent map (fid field -> timestamp)
    pub fn delivery_last(scope: &str) -> String {
        format!("notif:{}:last", scope)
    }

    /// Monotonic sent counter
    pub fn delivery_sent_count(scope: &str) -> String {
        format!("notif:{}:sentCount", scope)
    }

    /// Scope string for a logical notification type
    pub fn type_scope(notification_type: &str) -> String {
        format!("type:{}", notification_type)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_fence_key_layout() {
            assert_eq!(fence_warned(42, 7), "notif:fence:warned:fid:42:plant:7");
            assert_eq!(fence_expired(42, 7), "notif:fence:expired:fid:42:plant:7");
            assert_eq!(fence_pending(42, 7), "notif:fence:pending:fid:42:plant:7");
            assert_eq!(fence_pending_pattern(42), "notif:fence:pending:fid:42:plant:*");
        }

        #[test]
        fn test_plant_id_from_pending() {
            assert_eq!(plant_id_from_pending(&fence_pending(42, 7)), Some(7));
            assert_eq!(plant_id_from_pending("notif:fence:pending:fid:42"), None);
        }

        #[test]
        fn test_delivery_scopes() {
            assert_eq!(delivery_log("global"), "notif:global:log");
            assert_eq!(
                delivery_sent_count(&type_scope("fence-warn")),
                "notif:type:fence-warn:sentCount"
            );
        }
    }
}
