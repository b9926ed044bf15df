//! Token-bucket rate limiting keyed by source address.
//!
//! Two limiter instances front the HTTP surface: a global bucket for all
//! API routes and a stricter bucket for the authentication endpoints. The
//! auth bucket additionally blocks a source for a full window once its
//! tokens are exhausted.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Entries whose last touch is older than twice the window are pruned when
/// the table grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited {
        /// How long the source should wait before retrying.
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug, Clone)]
struct BucketState {
    tokens: f64,
    last: Instant,
    blocked_until: Option<Instant>,
}

/// Per-source token bucket limiter.
pub struct RateLimiter {
    /// Bucket capacity (admitted requests per window).
    capacity: f64,
    /// Refill rate in tokens per second.
    refill_per_sec: f64,
    window: Duration,
    /// When set, an exhausted bucket blocks the source for this long.
    block: Option<Duration>,
    buckets: Mutex<HashMap<IpAddr, BucketState>>,
}

impl RateLimiter {
    /// Limiter admitting `max` requests per `window`.
    pub fn new(max: u32, window: Duration) -> Self {
        Self::build(max, window, None)
    }

    /// Limiter that additionally blocks a source for `block` once the
    /// bucket is exhausted (used for the auth endpoints).
    pub fn with_block(max: u32, window: Duration, block: Duration) -> Self {
        Self::build(max, window, Some(block))
    }

    fn build(max: u32, window: Duration, block: Option<Duration>) -> Self {
        let capacity = f64::from(max.max(1));
        let refill_per_sec = capacity / window.as_secs_f64().max(0.001);
        Self {
            capacity,
            refill_per_sec,
            window,
            block,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a request from `source` is admitted now.
    pub fn check(&self, source: IpAddr) -> RateLimitDecision {
        self.check_at(source, Instant::now())
    }

    fn check_at(&self, source: IpAddr, now: Instant) -> RateLimitDecision {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            // a poisoned lock means a panic elsewhere; fail open
            Err(poisoned) => poisoned.into_inner(),
        };

        if buckets.len() > PRUNE_THRESHOLD {
            let stale_after = self.window * 2;
            buckets.retain(|_, state| {
                now.duration_since(state.last) < stale_after
                    || state.blocked_until.is_some_and(|until| until > now)
            });
        }

        let state = buckets.entry(source).or_insert(BucketState {
            tokens: self.capacity,
            last: now,
            blocked_until: None,
        });

        if let Some(until) = state.blocked_until {
            if until > now {
                return RateLimitDecision::Limited {
                    retry_after: until - now,
                };
            }
            state.blocked_until = None;
            state.tokens = self.capacity;
        }

        let elapsed = now.duration_since(state.last).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            return RateLimitDecision::Allowed;
        }

        if let Some(block) = self.block {
            state.blocked_until = Some(now + block);
            return RateLimitDecision::Limited { retry_after: block };
        }

        let deficit = 1.0 - state.tokens;
        let retry_after = Duration::from_secs_f64(deficit / self.refill_per_sec);
        RateLimitDecision::Limited { retry_after }
    }
}
