//! Per-user fixed-window rate limiting.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::Filter;
use crate::context::ExecutionContext;

/// Windows are pruned once this many users are tracked.
const PRUNE_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Allows each user at most `max_events` interactions per `window`.
///
/// Register at `BeforeRouting` so throttled users cost nothing downstream.
#[derive(Debug)]
pub struct RateLimitFilter {
    max_events: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimitFilter {
    pub fn new(max_events: u32, window: Duration) -> Self {
        Self {
            max_events,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_events(&self) -> u32 {
        self.max_events
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Counts one event for `user_id` at `now`; returns the time left in the
    /// window when the budget is exhausted.
    fn record(&self, user_id: &str, now: Instant) -> Result<(), Duration> {
        let mut windows = self.windows.lock();
        if windows.len() >= PRUNE_THRESHOLD {
            let span = self.window;
            windows.retain(|_, w| now.duration_since(w.start) < span);
        }

        let window = windows.entry(user_id.to_string()).or_insert(Window {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= self.window {
            *window = Window {
                start: now,
                count: 0,
            };
        }
        if window.count >= self.max_events {
            return Err(self.window - now.duration_since(window.start));
        }
        window.count += 1;
        Ok(())
    }
}

#[async_trait]
impl Filter for RateLimitFilter {
    fn name(&self) -> &str {
        "rate_limit"
    }

    async fn apply(&self, ctx: &mut ExecutionContext) {
        let user = ctx.interaction().user_id().to_string();
        if let Err(retry_after) = self.record(&user, Instant::now()) {
            debug!(user = %user, ?retry_after, "Rate limit exceeded");
            let secs = retry_after.as_secs_f64().ceil().max(1.0);
            ctx.reject(
                self.name(),
                format!("You are being rate limited. Try again in {secs:.0}s."),
            );
        }
    }
}
