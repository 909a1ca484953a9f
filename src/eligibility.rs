//! Pure time-window eligibility math for the wilt and fence conditions.
//!
//! Everything here is a function of seconds-left and configured windows; no
//! store access, no clock access. The boundaries are load-bearing: the grace
//! window is inclusive at both ends, and the warn side is never "freshly
//! true" at zero seconds left.

/// Which fence window, if any, a seconds-left value falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceWindow {
    /// Fence is active and lapses within the warn window.
    Warn,
    /// Fence lapsed within the grace period.
    Expire,
    /// Neither: still comfortably active, or lapsed too long ago.
    None,
}

/// Wilt eligibility: strictly positive seconds left, at or under the
/// threshold. A plant at exactly the threshold is eligible; a wilted plant
/// (zero or negative) is not.
pub fn wilt_eligible(seconds_left: i64, threshold: i64) -> bool {
    seconds_left > 0 && seconds_left <= threshold
}

/// Classify a fence's seconds-left into its warn/expire window.
///
/// Warn: `0 < seconds_left <= warn_window`. Expire: `-grace <= seconds_left
/// <= 0`, both bounds inclusive.
pub fn fence_window(seconds_left: i64, warn_window: i64, grace: i64) -> FenceWindow {
    if seconds_left > 0 && seconds_left <= warn_window {
        FenceWindow::Warn
    } else if seconds_left >= -grace && seconds_left <= 0 {
        FenceWindow::Expire
    } else {
        FenceWindow::None
    }
}

/// Whether a pending-fence marker is stale enough to garbage-collect: the
/// grace period has fully passed without the expiry ever being caught.
pub fn pending_is_stale(seconds_left: i64, grace: i64) -> bool {
    seconds_left < -grace
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: i64 = 12 * 3600;
    const WARN: i64 = 2 * 3600;
    const GRACE: i64 = 3600;

    #[test]
    fn test_wilt_threshold_boundaries() {
        assert!(wilt_eligible(THRESHOLD, THRESHOLD));
        assert!(!wilt_eligible(THRESHOLD + 1, THRESHOLD));
        assert!(wilt_eligible(1, THRESHOLD));
        assert!(!wilt_eligible(0, THRESHOLD));
        assert!(!wilt_eligible(-1, THRESHOLD));
    }

    #[test]
    fn test_fence_warn_boundaries() {
        assert_eq!(fence_window(WARN, WARN, GRACE), FenceWindow::Warn);
        assert_eq!(fence_window(WARN + 1, WARN, GRACE), FenceWindow::None);
        assert_eq!(fence_window(1, WARN, GRACE), FenceWindow::Warn);
        assert_eq!(fence_window(0, WARN, GRACE), FenceWindow::Expire);
    }

    #[test]
    fn test_fence_grace_boundaries() {
        assert_eq!(fence_window(0, WARN, GRACE), FenceWindow::Expire);
        assert_eq!(fence_window(-GRACE, WARN, GRACE), FenceWindow::Expire);
        assert_eq!(fence_window(-GRACE - 1, WARN, GRACE), FenceWindow::None);
        assert_eq!(fence_window(-1, WARN, GRACE), FenceWindow::Expire);
    }

    #[test]
    fn test_pending_staleness() {
        assert!(!pending_is_stale(-GRACE, GRACE));
        assert!(pending_is_stale(-GRACE - 1, GRACE));
        assert!(!pending_is_stale(100, GRACE));
    }
}
