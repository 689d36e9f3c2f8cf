//! Sliding-window limiter for outbound model calls
//!
//! Shared by every stage that calls the generation capability; concurrent
//! workflow runs hand the same instance around so the provider quota is
//! respected process-wide.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Bounds outbound calls to `max_calls` per rolling window (60 s by default).
///
/// The evict-then-check-then-record step runs under one lock so two callers
/// can never both claim the last slot.
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls_per_minute: usize) -> Self {
        Self::with_window(max_calls_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a slot frees up in the rolling window, then record the call.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .map_or(false, |t| now.duration_since(*t) >= self.window)
                {
                    calls.pop_front();
                }
                if calls.len() < self.max_calls {
                    calls.push_back(now);
                    return;
                }
                // The oldest recorded call leaves the window first.
                match calls.front() {
                    Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
                    None => Duration::ZERO,
                }
            };
            debug!("rate limiter saturated, sleeping {:?}", wait);
            tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        }
    }
}
