//! Per-client token buckets for the public routes.

use super::config::RateLimitConfig;
use super::error::QueueError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Calls between two sweeps of idle buckets.
pub const PURGE_EVERY_CHECKS: u64 = 1_024;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token-bucket limiter keyed by client (IP, session cookie, API key...).
///
/// Each client starts with `burst` requests and regains
/// `refill_per_minute` per minute, up to `burst`. Every
/// [`PURGE_EVERY_CHECKS`] calls, buckets that have been idle long enough to
/// refill completely are dropped; such a client is indistinguishable from a
/// new one.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<String, Bucket>,
    checks: AtomicU64,
}

impl RateLimiter {
    /// Creates a limiter with the given budget.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
            checks: AtomicU64::new(0),
        }
    }

    /// Consume one request from `client`'s budget.
    ///
    /// # Errors
    /// [`QueueError::RateLimited`] with the seconds until the next request fits.
    pub fn check(&self, client: &str) -> Result<(), QueueError> {
        self.check_at(client, Instant::now())
    }

    /// [`check`](Self::check) at an explicit instant.
    pub fn check_at(&self, client: &str, now: Instant) -> Result<(), QueueError> {
        let burst = f64::from(self.config.burst);
        let per_second = f64::from(self.config.refill_per_minute) / 60.0;

        if (self.checks.fetch_add(1, Ordering::Relaxed) + 1) % PURGE_EVERY_CHECKS == 0 {
            if let Some(idle) = self.full_refill() {
                self.purge_idle_at(idle, now);
            }
        }

        let mut bucket = self.buckets.entry(client.to_string()).or_insert(Bucket {
            tokens: burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        bucket.tokens = (bucket.tokens + elapsed.as_secs_f64() * per_second).min(burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            return Ok(());
        }

        let missing = 1.0 - bucket.tokens;
        let retry_after_secs = if per_second > 0.0 {
            (missing / per_second).ceil().max(1.0) as u64
        } else {
            u64::MAX
        };
        trace!("client {} limited for {}s", client, retry_after_secs);
        Err(QueueError::RateLimited { retry_after_secs })
    }

    /// Forget clients idle for longer than `idle`. A forgotten client starts
    /// again with a full bucket.
    pub fn purge_idle(&self, idle: Duration) {
        self.purge_idle_at(idle, Instant::now());
    }

    /// [`purge_idle`](Self::purge_idle) at an explicit instant.
    pub fn purge_idle_at(&self, idle: Duration, now: Instant) {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < idle);
        trace!(
            "rate limiter purged {} idle clients",
            before.saturating_sub(self.buckets.len())
        );
    }

    /// Time an empty bucket needs to refill to `burst`, or `None` if it never
    /// refills.
    #[must_use]
    pub fn full_refill(&self) -> Option<Duration> {
        if self.config.refill_per_minute == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            f64::from(self.config.burst) * 60.0 / f64::from(self.config.refill_per_minute),
        ))
    }

    /// Number of clients tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    /// The configured budget.
    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }
}
