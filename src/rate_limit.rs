//! Fixed-window login rate limiting.
//!
//! Counters live in process memory behind a mutex, keyed by `"<client ip>:<email>"`.
//! Nothing is shared between instances.

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

/// Table size above which expired records are swept on the next check.
const PRUNE_THRESHOLD: usize = 10_000;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum attempts allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    /// Five login attempts per minute.
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct AttemptRecord {
    count: u32,
    expires_at: Instant,
}

/// LoginRateLimiter
///
/// Single owner of the attempt table. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct LoginRateLimiter {
    config: RateLimitConfig,
    attempts: Mutex<HashMap<String, AttemptRecord>>,
}

impl LoginRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(client_ip: &str, email: &str) -> String {
        format!("{client_ip}:{email}")
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    /// Records an attempt for `key` at `now` and decides whether it may proceed.
    ///
    /// A missing or expired record is replaced with a fresh window holding one attempt.
    /// Rejected attempts do not extend the window.
    pub fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut attempts = self
            .attempts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if attempts.len() > PRUNE_THRESHOLD {
            attempts.retain(|_, record| record.expires_at > now);
        }

        match attempts.get_mut(key) {
            Some(record) if record.expires_at > now => {
                if record.count >= self.config.max_requests {
                    return RateLimitDecision::Limited {
                        retry_after: record.expires_at - now,
                    };
                }
                record.count += 1;
                RateLimitDecision::Allowed {
                    remaining: self.config.max_requests - record.count,
                }
            }
            _ => {
                attempts.insert(
                    key.to_string(),
                    AttemptRecord {
                        count: 1,
                        expires_at: now + self.config.window,
                    },
                );
                RateLimitDecision::Allowed {
                    remaining: self.config.max_requests.saturating_sub(1),
                }
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts
            .lock()
            .map(|attempts| attempts.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixth_attempt_in_window_is_limited() {
        let limiter = LoginRateLimiter::default();
        let now = Instant::now();
        let key = LoginRateLimiter::key("10.0.0.1", "jake@jake.jake");

        for expected_remaining in (0..5).rev() {
            assert_eq!(
                limiter.check_at(&key, now),
                RateLimitDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }

        assert!(!limiter.check_at(&key, now + Duration::from_secs(1)).is_allowed());
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = LoginRateLimiter::default();
        let start = Instant::now();
        let key = "1.1.1.1:a@b.c";

        for _ in 0..5 {
            limiter.check_at(key, start);
        }
        assert!(!limiter.check_at(key, start + Duration::from_secs(59)).is_allowed());
        assert_eq!(
            limiter.check_at(key, start + Duration::from_secs(60)),
            RateLimitDecision::Allowed { remaining: 4 }
        );
    }

    #[test]
    fn keys_are_independent() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let now = Instant::now();

        assert!(limiter.check_at("ip:a@x.io", now).is_allowed());
        assert!(!limiter.check_at("ip:a@x.io", now).is_allowed());
        assert!(limiter.check_at("ip:b@x.io", now).is_allowed());
        assert!(limiter.check_at("other-ip:a@x.io", now).is_allowed());
        assert_eq!(limiter.tracked_keys(), 3);
    }

    #[test]
    fn limited_reports_time_left_in_window() {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(1, Duration::from_secs(60)));
        let now = Instant::now();
        limiter.check_at("k", now);

        assert_eq!(
            limiter.check_at("k", now + Duration::from_secs(15)),
            RateLimitDecision::Limited {
                retry_after: Duration::from_secs(45)
            }
        );
    }
}
