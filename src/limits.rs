use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Bounds outbound requests for one run.
///
/// Two independent limits: a semaphore capping in-flight requests, and a
/// token-paced minimum interval between request starts. Pacing hands each
/// caller the next free start slot and advances it, so a slow request
/// never blocks other callers beyond the interval itself.
#[derive(Debug)]
pub struct RateLimiter {
    slots: Arc<Semaphore>,
    ceiling: usize,
    min_interval: Duration,
    next_start: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(ceiling: usize, min_interval: Duration) -> Self {
        let ceiling = ceiling.max(1);
        Self {
            slots: Arc::new(Semaphore::new(ceiling)),
            ceiling,
            min_interval,
            next_start: Mutex::new(Instant::now()),
        }
    }

    /// Maximum number of concurrently held permits.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Waits for a request slot and for this caller's paced start time.
    ///
    /// The returned permit must be held for the duration of the request so
    /// the in-flight ceiling stays accurate.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .expect("limiter semaphore closed");

        if !self.min_interval.is_zero() {
            let start_at = {
                let mut next = self.next_start.lock().await;
                let now = Instant::now();
                let at = if *next > now { *next } else { now };
                *next = at + self.min_interval;
                at
            };
            tokio::time::sleep_until(start_at).await;
        }

        permit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn probe_max_overlap(ceiling: usize, tasks: usize) -> usize {
        let limiter = Arc::new(RateLimiter::new(ceiling, Duration::ZERO));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..tasks {
            let limiter = Arc::clone(&limiter);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_ceiling_of_one_serializes_requests() {
        assert_eq!(probe_max_overlap(1, 6).await, 1);
    }

    #[tokio::test]
    async fn test_larger_ceiling_allows_bounded_overlap() {
        let peak = probe_max_overlap(4, 12).await;
        assert!(peak > 1, "expected some overlap, saw {peak}");
        assert!(peak <= 4, "overlap exceeded the ceiling: {peak}");
    }

    #[tokio::test]
    async fn test_pacing_spaces_request_starts() {
        let limiter = RateLimiter::new(8, Duration::from_millis(30));
        let started = Instant::now();
        for _ in 0..3 {
            let _permit = limiter.acquire().await;
        }
        // Third start cannot happen before two full intervals have passed.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_pace() {
        let limiter = RateLimiter::new(2, Duration::ZERO);
        let started = Instant::now();
        for _ in 0..20 {
            let _permit = limiter.acquire().await;
        }
        assert!(started.elapsed() < Duration::from_millis(50));
    }
}
