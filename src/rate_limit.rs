//! # Rate Limiter
//! Fixed 60-second request budget per provider.
//!
//! `acquire` is called before every outbound request. When the window has
//! elapsed it resets; when the budget is spent the calling task sleeps for the
//! remainder of the window, then starts a fresh one. The wait is a tokio sleep,
//! so only callers of this provider are suspended.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub const DEFAULT_LIMIT: u32 = 60;
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

#[derive(Debug)]
pub struct RateLimiter {
    provider: &'static str,
    limit: u32,
    period: Duration,
    state: Mutex<RateWindow>,
}

impl RateLimiter {
    pub fn new(provider: &'static str, limit: u32) -> Self {
        Self::with_period(provider, limit, WINDOW)
    }

    pub fn with_period(provider: &'static str, limit: u32, period: Duration) -> Self {
        Self {
            provider,
            // A zero budget would never admit a request.
            limit: limit.max(1),
            period,
            state: Mutex::new(RateWindow {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Reserve one request slot, waiting for the window to roll over if needed.
    pub async fn acquire(&self) {
        let mut w = self.state.lock().await;

        let now = Instant::now();
        if now.duration_since(w.window_start) >= self.period {
            w.window_start = now;
            w.count = 0;
        }

        if w.count >= self.limit {
            let wait = self
                .period
                .saturating_sub(now.duration_since(w.window_start));
            if !wait.is_zero() {
                tracing::info!(
                    target: "ingest",
                    provider = self.provider,
                    wait_ms = wait.as_millis() as u64,
                    "rate limit reached, waiting"
                );
                metrics::counter!("provider_rate_limited_total", "provider" => self.provider)
                    .increment(1);
                tokio::time::sleep(wait).await;
            }
            w.window_start = Instant::now();
            w.count = 0;
        }

        w.count += 1;
    }

    /// Requests counted in the current window, if the state is not busy.
    pub fn requests_in_window(&self) -> Option<u32> {
        let w = self.state.try_lock().ok()?;
        if w.window_start.elapsed() >= self.period {
            Some(0)
        } else {
            Some(w.count)
        }
    }
}
