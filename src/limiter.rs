//! Provider-scoped request rate limiting.
//!
//! Limiters hold in-memory state only; counters reset each process start
//! and are never shared across providers.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::{sleep, Instant};

/// Blocks the caller until the next request is allowed under the active
/// provider's ceiling.
#[derive(Debug)]
pub enum RateLimiter {
    /// At least `min_interval` between completions of consecutive
    /// `acquire()` calls, independent of how long the request itself takes.
    FixedInterval {
        min_interval: Duration,
        last: Option<Instant>,
    },
    /// No more than `max_requests` acquisitions within any rolling window
    /// of length `window`.
    Windowed {
        max_requests: usize,
        window: Duration,
        acquired: VecDeque<Instant>,
    },
}

impl RateLimiter {
    pub fn fixed_interval(min_interval: Duration) -> Self {
        RateLimiter::FixedInterval {
            min_interval,
            last: None,
        }
    }

    pub fn windowed(max_requests: usize, window: Duration) -> Self {
        RateLimiter::Windowed {
            max_requests,
            window,
            acquired: VecDeque::with_capacity(max_requests),
        }
    }

    /// Wait until it is safe to issue the next request.
    pub async fn acquire(&mut self) {
        match self {
            RateLimiter::FixedInterval { min_interval, last } => {
                if let Some(prev) = *last {
                    let ready_at = prev + *min_interval;
                    let now = Instant::now();
                    if ready_at > now {
                        sleep(ready_at - now).await;
                    }
                }
                *last = Some(Instant::now());
            }
            RateLimiter::Windowed {
                max_requests,
                window,
                acquired,
            } => {
                let mut now = Instant::now();
                while let Some(&oldest) = acquired.front() {
                    if now.duration_since(oldest) >= *window {
                        acquired.pop_front();
                    } else {
                        break;
                    }
                }
                if acquired.len() >= *max_requests {
                    // Budget exhausted: wait for the oldest slot to expire.
                    let oldest = *acquired.front().expect("non-empty at capacity");
                    sleep((oldest + *window) - now).await;
                    now = Instant::now();
                    while let Some(&front) = acquired.front() {
                        if now.duration_since(front) >= *window {
                            acquired.pop_front();
                        } else {
                            break;
                        }
                    }
                }
                acquired.push_back(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_enforces_gap() {
        let mut limiter = RateLimiter::fixed_interval(Duration::from_secs(1));

        let start = Instant::now();
        limiter.acquire().await;
        // First acquisition is immediate.
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(1));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_absorbs_slow_requests() {
        let mut limiter = RateLimiter::fixed_interval(Duration::from_secs(1));

        limiter.acquire().await;
        // Simulate a request that itself took longer than the interval.
        sleep(Duration::from_secs(3)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert!(before.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_windowed_allows_burst_then_blocks() {
        let mut limiter = RateLimiter::windowed(3, Duration::from_secs(60));

        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(10));

        // Fourth acquisition must wait for the first slot to leave the window.
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_windowed_rolling_budget() {
        let window = Duration::from_secs(60);
        let mut limiter = RateLimiter::windowed(2, window);
        let mut times = Vec::new();

        for _ in 0..6 {
            limiter.acquire().await;
            times.push(Instant::now());
        }

        // No window of length W may contain more than 2 acquisitions:
        // every acquisition must be >= W after the one two places back.
        for pair in times.windows(3) {
            assert!(pair[2].duration_since(pair[0]) >= window);
        }
    }
}
