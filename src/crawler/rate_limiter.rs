//! Minimum-interval gate for outbound requests

use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Enforces a minimum interval between consecutive `wait` completions
///
/// One instance is owned by the fetcher; requests are sequential so no
/// locking is involved.
#[derive(Debug)]
pub struct RateLimiter {
    delay: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    /// Sleeps for whatever remains of `delay` since the previous call
    ///
    /// The first call returns immediately.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                sleep(self.delay - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}
