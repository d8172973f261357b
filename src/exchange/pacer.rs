// =============================================================================
// Request Pacer — minimum gap between outbound exchange requests
// =============================================================================
//
// The exchange rate-limits aggressively; the pacer enforces a configurable
// minimum gap (default 60 ms) between any two outbound requests, process-wide.
// Callers await `pace()` immediately before sending.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::time::sleep;
use tracing::debug;

/// Default minimum gap between requests.
pub const DEFAULT_MIN_GAP: Duration = Duration::from_millis(60);

pub struct RequestPacer {
    min_gap: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RequestPacer {
    pub fn new(min_gap: Duration) -> Self {
        Self {
            min_gap,
            last_request: Mutex::new(None),
        }
    }

    /// Sleep until at least `min_gap` has passed since the previous request,
    /// then mark now as the latest request time.
    ///
    /// The lock is held only to compute the wait and to stamp the slot; the
    /// sleep itself happens outside the lock.
    pub async fn pace(&self) {
        let wait = {
            let mut last = self.last_request.lock();
            let now = Instant::now();
            match *last {
                Some(prev) => {
                    let elapsed = now.duration_since(prev);
                    if elapsed < self.min_gap {
                        let wait = self.min_gap - elapsed;
                        // Reserve the future slot so concurrent callers queue
                        // behind each other rather than all firing at once.
                        *last = Some(now + wait);
                        Some(wait)
                    } else {
                        *last = Some(now);
                        None
                    }
                }
                None => {
                    *last = Some(now);
                    None
                }
            }
        };

        if let Some(wait) = wait {
            debug!(wait_ms = wait.as_millis() as u64, "pacing outbound request");
            sleep(wait).await;
        }
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAP)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_request_is_not_delayed() {
        let pacer = RequestPacer::new(Duration::from_millis(50));
        let start = Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn second_request_waits_for_gap() {
        let pacer = RequestPacer::new(Duration::from_millis(50));
        pacer.pace().await;
        let start = Instant::now();
        pacer.pace().await;
        assert!(
            start.elapsed() >= Duration::from_millis(40),
            "expected ~50ms gap, got {:?}",
            start.elapsed()
        );
    }

    #[tokio::test]
    async fn gap_elapsed_means_no_wait() {
        let pacer = RequestPacer::new(Duration::from_millis(10));
        pacer.pace().await;
        sleep(Duration::from_millis(30)).await;
        let start = Instant::now();
        pacer.pace().await;
        assert!(start.elapsed() < Duration::from_millis(10));
    }
}
