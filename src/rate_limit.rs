//! A token-bucket rate limiter for outbound and inbound byte accounting.
//!
//! This capability has no direct precedent elsewhere in the crate, so it
//! follows the ambient style of the rest of the codebase (plain struct,
//! no async, driven by an externally supplied clock tick) rather than
//! mirroring any one module's shape.

/// Tracks available tokens for a capped-rate resource (frames or bytes
/// per second, depending on what the caller meters). `now` is handed in
/// rather than read from the clock so the session controller stays the
/// one place that owns time.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: std::time::Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_per_sec: u32, now: std::time::Instant) -> Self {
        Self {
            capacity: capacity as f64,
            tokens: capacity as f64,
            refill_per_sec: refill_per_sec as f64,
            last_refill: now,
        }
    }

    fn refill(&mut self, now: std::time::Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Attempts to withdraw `cost` tokens. Returns `true` (and commits the
    /// withdrawal) if enough tokens are available, `false` otherwise;
    /// the caller decides whether that means queueing, dropping, or
    /// erroring.
    pub fn try_take(&mut self, cost: u32, now: std::time::Instant) -> bool {
        self.refill(now);
        let cost = cost as f64;
        if self.tokens >= cost {
            self.tokens -= cost;
            true
        } else {
            false
        }
    }

    /// How long the caller must wait before `cost` tokens would be
    /// available, assuming no other withdrawals happen in the meantime.
    pub fn time_until_available(&self, cost: u32) -> std::time::Duration {
        let cost = cost as f64;
        if self.tokens >= cost {
            return std::time::Duration::ZERO;
        }
        if self.refill_per_sec <= 0.0 {
            return std::time::Duration::MAX;
        }
        let deficit = cost - self.tokens;
        std::time::Duration::from_secs_f64(deficit / self.refill_per_sec)
    }
}
