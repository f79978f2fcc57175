//! Outbound send ceiling using a fixed one-second window.
//!
//! ```text
//! Ceiling: 2/s
//! t=0ms    permit 1  (window opens)
//! t=10ms   permit 2
//! t=20ms   permit 3  -> sleeps 980ms, new window opens at t=1000ms
//! ```
//!
//! The window lock is held while sleeping, so concurrent callers queue up
//! behind the one that is waiting.

use std::time::Duration;

use courier_common::internal;
use tokio::{sync::Mutex, time::Instant};

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Grants at most `per_second` permits per window. A ceiling of zero
/// disables limiting entirely.
#[derive(Debug)]
pub struct RateLimiter {
    per_second: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(per_second: u32) -> Self {
        Self {
            per_second,
            window: Mutex::new(Window {
                start: Instant::now(),
                count: 0,
            }),
        }
    }

    #[must_use]
    pub const fn per_second(&self) -> u32 {
        self.per_second
    }

    /// Wait until a permit is available in the current window, then take it.
    pub async fn wait_if_needed(&self) {
        if self.per_second == 0 {
            return;
        }

        let mut window = self.window.lock().await;

        let now = Instant::now();
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }

        if window.count >= self.per_second {
            let wait = WINDOW.saturating_sub(now.duration_since(window.start));
            if !wait.is_zero() {
                internal!(
                    level = DEBUG,
                    wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                    per_second = self.per_second,
                    "Send ceiling reached, waiting for next window"
                );
                tokio::time::sleep(wait).await;
            }
            window.start = Instant::now();
            window.count = 0;
        }

        window.count += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::task::JoinSet;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn permits_up_to_ceiling_without_waiting() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.wait_if_needed().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn one_over_ceiling_waits_for_next_window() {
        let limiter = RateLimiter::new(2);
        let start = Instant::now();

        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;
        limiter.wait_if_needed().await;

        assert!(start.elapsed() >= WINDOW);
        assert!(start.elapsed() < WINDOW * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn window_resets_after_a_second() {
        let limiter = RateLimiter::new(1);

        limiter.wait_if_needed().await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        let start = Instant::now();
        limiter.wait_if_needed().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_disables_limiting() {
        let limiter = RateLimiter::new(0);
        let start = Instant::now();

        for _ in 0..1000 {
            limiter.wait_if_needed().await;
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_spread_over_windows() {
        let limiter = Arc::new(RateLimiter::new(2));
        let start = Instant::now();
        let mut tasks = JoinSet::new();

        for _ in 0..6 {
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                limiter.wait_if_needed().await;
                start.elapsed()
            });
        }

        let mut elapsed = tasks.join_all().await;
        elapsed.sort();

        assert!(elapsed[1] < WINDOW);
        assert!(elapsed[2] >= WINDOW);
        assert!(elapsed[4] >= WINDOW * 2);
    }
}
