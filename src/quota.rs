//! Per-caller daily request quota.
//!
//! The pipeline only talks to the [`QuotaStore`] trait; the in-memory store
//! below is the default.  It is best-effort: counters live in process memory,
//! vanish on restart and are not shared between instances.  A deployment
//! that needs a stricter guarantee plugs in a shared store instead.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Length of one quota window.
pub const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allowed,
    /// `retry_after` is the full window length, not the time left in it.
    Denied { retry_after: Duration },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

#[async_trait::async_trait]
pub trait QuotaStore: Send + Sync {
    /// Count one request against `key` unless it already used `limit`
    /// requests in the current window.
    async fn check_and_increment(&self, key: &str, limit: u32) -> QuotaDecision;
}

#[derive(Debug, Clone, Copy)]
struct QuotaWindow {
    count: u32,
    reset_at: Instant,
}

/// Process-local quota counters keyed by caller.
pub struct InMemoryQuota {
    windows: DashMap<String, QuotaWindow>,
    window: Duration,
}

impl InMemoryQuota {
    pub fn new() -> Self {
        Self::with_window(QUOTA_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window,
        }
    }

    /// Same as [`QuotaStore::check_and_increment`] with an explicit clock.
    pub fn check_and_increment_at(&self, key: &str, limit: u32, now: Instant) -> QuotaDecision {
        let mut entry = self.windows.entry(key.to_string()).or_insert(QuotaWindow {
            count: 0,
            reset_at: now + self.window,
        });
        let win = entry.value_mut();

        if win.count == 0 {
            win.count = 1;
            return QuotaDecision::Allowed;
        }
        if now > win.reset_at {
            win.count = 1;
            win.reset_at = now + self.window;
            return QuotaDecision::Allowed;
        }
        if win.count >= limit {
            return QuotaDecision::Denied {
                retry_after: self.window,
            };
        }
        win.count += 1;
        QuotaDecision::Allowed
    }

    /// Current count for `key`, if it has been seen.
    pub fn count(&self, key: &str) -> Option<u32> {
        self.windows.get(key).map(|w| w.count)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Default for InMemoryQuota {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl QuotaStore for InMemoryQuota {
    async fn check_and_increment(&self, key: &str, limit: u32) -> QuotaDecision {
        self.check_and_increment_at(key, limit, Instant::now())
    }
}

/// Store that admits everything.  Used when rate limiting is switched off
/// for local testing.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlimitedQuota;

#[async_trait::async_trait]
impl QuotaStore for UnlimitedQuota {
    async fn check_and_increment(&self, _key: &str, _limit: u32) -> QuotaDecision {
        QuotaDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_denies() {
        let quota = InMemoryQuota::new();
        let now = Instant::now();
        for n in 1..=3 {
            assert!(
                quota.check_and_increment_at("a", 3, now).is_allowed(),
                "request {n} should pass"
            );
        }
        assert_eq!(
            quota.check_and_increment_at("a", 3, now),
            QuotaDecision::Denied {
                retry_after: QUOTA_WINDOW
            }
        );
        assert_eq!(quota.count("a"), Some(3));
    }

    #[test]
    fn denial_does_not_advance_counter() {
        let quota = InMemoryQuota::new();
        let now = Instant::now();
        quota.check_and_increment_at("a", 1, now);
        for _ in 0..5 {
            assert!(!quota.check_and_increment_at("a", 1, now).is_allowed());
        }
        assert_eq!(quota.count("a"), Some(1));
    }

    #[test]
    fn window_expiry_resets_count() {
        let quota = InMemoryQuota::new();
        let start = Instant::now();
        for _ in 0..30 {
            quota.check_and_increment_at("relay:a", 30, start);
        }
        assert!(!quota.check_and_increment_at("relay:a", 30, start).is_allowed());

        // Exactly at reset_at the old window still applies.
        let edge = start + QUOTA_WINDOW;
        assert!(!quota.check_and_increment_at("relay:a", 30, edge).is_allowed());

        let later = edge + Duration::from_secs(1);
        assert!(quota.check_and_increment_at("relay:a", 30, later).is_allowed());
        assert_eq!(quota.count("relay:a"), Some(1));
    }

    #[test]
    fn new_window_is_measured_from_reset_request() {
        let quota = InMemoryQuota::with_window(Duration::from_secs(10));
        let start = Instant::now();
        quota.check_and_increment_at("k", 1, start);
        let reset = start + Duration::from_secs(15);
        assert!(quota.check_and_increment_at("k", 1, reset).is_allowed());
        // 20s is past the first window but inside the second one.
        assert!(!quota
            .check_and_increment_at("k", 1, start + Duration::from_secs(20))
            .is_allowed());
        assert!(quota
            .check_and_increment_at("k", 1, start + Duration::from_secs(26))
            .is_allowed());
    }

    #[test]
    fn keys_are_independent() {
        let quota = InMemoryQuota::new();
        let now = Instant::now();
        assert!(quota.check_and_increment_at("a", 1, now).is_allowed());
        assert!(quota.check_and_increment_at("b", 1, now).is_allowed());
        assert!(!quota.check_and_increment_at("a", 1, now).is_allowed());
        assert_eq!(quota.len(), 2);
    }

    #[tokio::test]
    async fn unlimited_store_never_denies() {
        let quota = UnlimitedQuota;
        for _ in 0..100 {
            assert!(quota.check_and_increment("a", 1).await.is_allowed());
        }
    }
}
