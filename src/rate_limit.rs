//! Per-origin request throttling, independent of user identity.

use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::debug;

/// Bucket shared by every request whose origin can't be determined.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Trailing-window limiter keyed by client origin.
///
/// Each origin keeps the timestamps of its admitted requests inside the
/// window. Refused attempts are not recorded.
pub struct RateLimiter {
    entries: DashMap<String, VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_requests,
            window,
        }
    }

    pub fn tracked_origins(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the request is admitted.
    pub fn admit(&self, origin: &str) -> bool {
        self.admit_at(origin, Instant::now())
    }

    pub fn admit_at(&self, origin: &str, now: Instant) -> bool {
        let key = if origin.is_empty() { UNKNOWN_ORIGIN } else { origin };
        let mut timestamps = self.entries.entry(key.to_string()).or_default();

        while let Some(oldest) = timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        if timestamps.len() >= self.max_requests as usize {
            return false;
        }
        timestamps.push_back(now);
        true
    }

    /// Drop origins with no request inside the window. Returns how many went.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, timestamps| {
            timestamps
                .back()
                .is_some_and(|last| now.saturating_duration_since(*last) < self.window)
        });
        before - self.entries.len()
    }
}

// Idle origin eviction - runs every `cleanup_interval`
pub async fn cleanup_task(limiter: Arc<RateLimiter>, cleanup_interval: Duration) {
    let mut interval = interval(cleanup_interval);

    debug!(?cleanup_interval, "rate limiter cleanup started");

    loop {
        interval.tick().await;
        let removed = limiter.evict_idle(Instant::now());
        if removed > 0 {
            debug!(
                removed,
                remaining = limiter.tracked_origins(),
                "idle rate limit origins evicted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_ceiling_then_refuses() {
        let limiter = RateLimiter::new(60, Duration::from_secs(900));
        let now = Instant::now();

        for i in 0..60 {
            assert!(limiter.admit_at("10.0.0.1", now), "request {} refused", i);
        }
        assert!(!limiter.admit_at("10.0.0.1", now));
    }

    #[test]
    fn admission_resumes_after_window() {
        let window = Duration::from_secs(900);
        let limiter = RateLimiter::new(2, window);
        let start = Instant::now();

        assert!(limiter.admit_at("10.0.0.1", start));
        assert!(limiter.admit_at("10.0.0.1", start + Duration::from_secs(1)));
        assert!(!limiter.admit_at("10.0.0.1", start + Duration::from_secs(899)));

        // first timestamp has aged out, second has not
        assert!(limiter.admit_at("10.0.0.1", start + window));
        assert!(!limiter.admit_at("10.0.0.1", start + window));

        assert!(limiter.admit_at("10.0.0.1", start + window * 2));
    }

    #[test]
    fn refused_attempts_are_not_recorded() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();

        assert!(limiter.admit_at("a", start));
        for s in 1..10 {
            assert!(!limiter.admit_at("a", start + Duration::from_secs(s)));
        }
        assert!(limiter.admit_at("a", start + Duration::from_secs(10)));
    }

    #[test]
    fn origins_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.admit_at("10.0.0.1", now));
        assert!(!limiter.admit_at("10.0.0.1", now));
        assert!(limiter.admit_at("10.0.0.2", now));
    }

    #[test]
    fn empty_origin_shares_unknown_bucket() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.admit_at("", now));
        assert!(!limiter.admit_at(UNKNOWN_ORIGIN, now));
        assert_eq!(limiter.tracked_origins(), 1);
    }

    #[test]
    fn evicts_only_idle_origins() {
        let window = Duration::from_secs(60);
        let limiter = RateLimiter::new(5, window);
        let start = Instant::now();

        limiter.admit_at("old", start);
        limiter.admit_at("fresh", start + Duration::from_secs(50));

        assert_eq!(limiter.evict_idle(start + window), 1);
        assert_eq!(limiter.tracked_origins(), 1);
        assert!(limiter.admit_at("fresh", start + window));
    }
}
