use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Minimum spacing between outbound requests to one provider.
#[derive(Debug, Default)]
pub struct RateLimiter {
    last: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last: Mutex::new(None),
            min_interval,
        }
    }

    /// Waits until a slot is free, then claims it.
    pub async fn acquire(&self) {
        while let Some(wait) = self.try_claim(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
    }

    fn try_claim(&self, now: Instant) -> Option<Duration> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(prev) = *last {
            let elapsed = now.duration_since(prev);
            if elapsed < self.min_interval {
                return Some(self.min_interval - elapsed);
            }
        }
        *last = Some(now);
        None
    }
}
