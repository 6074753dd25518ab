use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::config::RateLimitSettings;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitKind {
    SignIn,
    Email,
}

/// Requests per minute per client; `0` disables a limit.
#[derive(Clone, Copy, Debug)]
pub struct RateLimitConfig {
    pub signin_per_min: u32,
    pub email_per_min: u32,
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            signin_per_min: settings.signin_per_min,
            email_per_min: settings.email_per_min,
        }
    }
}

/// Token buckets keyed by client address and limit kind.
pub struct RateLimiter {
    buckets: DashMap<String, TokenBucket>,
    limits: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(limits: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            limits,
        }
    }

    pub fn allow(&self, key: &str, kind: RateLimitKind) -> bool {
        let capacity = match kind {
            RateLimitKind::SignIn => self.limits.signin_per_min,
            RateLimitKind::Email => self.limits.email_per_min,
        };
        if capacity == 0 {
            return true;
        }
        let refill = capacity as f64 / 60.0;

        let mut entry = self
            .buckets
            .entry(format!("{key}:{kind:?}"))
            .or_insert_with(|| TokenBucket::new(capacity));
        entry.allow(capacity, refill)
    }

    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        if max_idle.is_zero() {
            return 0;
        }
        let now = Instant::now();
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| !bucket.is_idle(now, max_idle));
        before.saturating_sub(self.buckets.len())
    }
}

#[derive(Clone)]
struct TokenBucket {
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    fn new(capacity: u32) -> Self {
        Self {
            tokens: capacity as f64,
            last: Instant::now(),
        }
    }

    fn allow(&mut self, capacity: u32, refill_per_sec: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * refill_per_sec).min(capacity as f64);
        self.last = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.duration_since(self.last) >= max_idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(signin: u32, email: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            signin_per_min: signin,
            email_per_min: email,
        })
    }

    #[test]
    fn bucket_empties_then_rejects() {
        let limiter = limiter(2, 0);
        assert!(limiter.allow("10.0.0.1", RateLimitKind::SignIn));
        assert!(limiter.allow("10.0.0.1", RateLimitKind::SignIn));
        assert!(!limiter.allow("10.0.0.1", RateLimitKind::SignIn));
        assert!(limiter.allow("10.0.0.2", RateLimitKind::SignIn));
        // zero disables the email limit
        for _ in 0..50 {
            assert!(limiter.allow("10.0.0.1", RateLimitKind::Email));
        }
    }

    #[test]
    fn prune_idle_removes_stale_buckets() {
        let limiter = limiter(10, 5);
        limiter
            .buckets
            .insert("client:SignIn".into(), TokenBucket::new(5));
        limiter.buckets.insert(
            "client:Email".into(),
            TokenBucket {
                tokens: 0.0,
                last: Instant::now() - Duration::from_secs(600),
            },
        );

        let removed = limiter.prune_idle(Duration::from_secs(300));
        assert_eq!(removed, 1);
        assert!(limiter.buckets.contains_key("client:SignIn"));
        assert!(!limiter.buckets.contains_key("client:Email"));
    }
}
