//! Application-wide constants for the notification pipeline.

/// A plant becomes eligible for the wilt-warning push when its time until
/// wilting drops to this many seconds or fewer (12 hours).
pub(crate) const WILT_THRESHOLD_SECONDS: i64 = 12 * 3600;

/// Advance-warning window before a fence lapses (2 hours).
pub(crate) const FENCE_WARN_WINDOW_SECONDS: i64 = 2 * 3600;

/// Grace period after a fence lapses during which the expiry push may still
/// fire (1 hour).
pub(crate) const FENCE_GRACE_SECONDS: i64 = 3600;

/// TTL for the fence "expired" throttle marker. Must outlive the grace
/// period by a wide margin so the same lapse can never fire twice.
pub(crate) const FENCE_EXPIRED_MARKER_TTL_SECONDS: u64 = 3 * 86400;

/// TTL for pending-fence markers. Must exceed the longest fence duration a
/// plant can carry so the marker survives until reconciliation sees it.
pub(crate) const FENCE_PENDING_TTL_SECONDS: u64 = 7 * 86400;

/// Default TTL for the per-plant and per-recipient wilt throttle markers.
/// Equals the eligibility window so a marker never outlives the occurrence
/// it guards by more than one window.
pub(crate) const WILT_MARKER_TTL_SECONDS: u64 = 12 * 3600;

/// Maximum recipients per upstream send call.
pub(crate) const SEND_CHUNK_SIZE: usize = 500;

/// Recipients processed concurrently per orchestrator window.
pub(crate) const BATCH_CONCURRENCY: usize = 30;

/// Safety valve against runaway cursor pagination of the enabled-token API.
pub(crate) const ENABLED_FIDS_PAGE_CAP: usize = 100;

/// Short cache TTL for the full enabled-fid list (5 minutes).
pub(crate) const ENABLED_FIDS_CACHE_TTL_SECONDS: u64 = 300;

/// Delivery log lists are trimmed to this many most-recent entries.
pub(crate) const DELIVERY_LOG_MAX_ENTRIES: usize = 200;

/// SCAN page hint when introspecting or reconciling keys.
pub(crate) const KEY_SCAN_LIMIT: usize = 1000;
