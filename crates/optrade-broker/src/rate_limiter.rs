//! Token-bucket rate limiting for outbound broker calls.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::warn;

/// Caps requests per rolling window, with a separate inflight cap for
/// order-placement calls (brokers typically rate-limit order posts far
/// more aggressively than market-data reads).
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
    max_inflight_orders: u32,
    inflight_orders: Mutex<u32>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration, max_inflight_orders: u32) -> Self {
        Self {
            max_requests,
            window,
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
            max_inflight_orders,
            inflight_orders: Mutex::new(0),
        }
    }

    fn cleanup(&self) {
        let cutoff = Instant::now() - self.window;
        let mut timestamps = self.timestamps.lock();
        while timestamps.front().is_some_and(|&t| t < cutoff) {
            timestamps.pop_front();
        }
    }

    pub fn can_send(&self) -> bool {
        self.cleanup();
        self.timestamps.lock().len() < self.max_requests as usize
    }

    pub fn can_send_order(&self) -> bool {
        self.can_send() && *self.inflight_orders.lock() < self.max_inflight_orders
    }

    pub fn record_send(&self) {
        self.cleanup();
        let mut timestamps = self.timestamps.lock();
        timestamps.push_back(Instant::now());
        if timestamps.len() >= self.max_requests as usize {
            warn!(
                count = timestamps.len(),
                max = self.max_requests,
                "approaching broker rate limit"
            );
        }
    }

    pub fn record_order_send(&self) {
        self.record_send();
        *self.inflight_orders.lock() += 1;
    }

    pub fn record_order_response(&self) {
        let mut inflight = self.inflight_orders.lock();
        *inflight = inflight.saturating_sub(1);
    }

    /// Poll until capacity is available. Callers should prefer this over
    /// busy-checking `can_send` so backpressure doesn't spin the runtime.
    pub async fn wait_for_capacity(&self) {
        while !self.can_send() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub async fn wait_for_order_capacity(&self) {
        while !self.can_send_order() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    pub fn remaining_capacity(&self) -> u32 {
        self.cleanup();
        self.max_requests
            .saturating_sub(self.timestamps.lock().len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_allows_up_to_max() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60), 10);
        for _ in 0..5 {
            assert!(limiter.can_send());
            limiter.record_send();
        }
        assert!(!limiter.can_send());
    }

    #[test]
    fn test_inflight_orders_gate_independently() {
        let limiter = RateLimiter::new(1000, Duration::from_secs(60), 2);
        limiter.record_order_send();
        limiter.record_order_send();
        assert!(!limiter.can_send_order());
        limiter.record_order_response();
        assert!(limiter.can_send_order());
    }

    #[tokio::test]
    async fn test_wait_for_capacity_returns_once_window_clears() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50), 10);
        limiter.record_send();
        assert!(!limiter.can_send());
        tokio::time::timeout(Duration::from_secs(1), limiter.wait_for_capacity())
            .await
            .expect("capacity should free up once the window elapses");
    }
}
