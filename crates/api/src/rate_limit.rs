use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window request counter keyed by client IP.
#[derive(Debug, Clone)]
pub struct IpRateLimiter {
    inner: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
    window: Duration,
    max_requests: usize,
}

impl IpRateLimiter {
    pub fn new(window: Duration, max_requests: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        let mut guard = self.inner.lock();
        let queue = guard.entry(key.to_string()).or_default();
        expire(queue, now, self.window);

        if queue.len() >= self.max_requests {
            return false;
        }

        queue.push_back(now);
        true
    }

    /// Drops keys whose window is empty. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let before = guard.len();
        guard.retain(|_, queue| {
            expire(queue, now, self.window);
            !queue.is_empty()
        });
        before - guard.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.lock().len()
    }
}

fn expire(queue: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(front) = queue.front() {
        if now.duration_since(*front) > window {
            queue.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_requests_in_window() {
        let limiter = IpRateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.2"));
    }

    #[test]
    fn window_slides_forward() {
        let limiter = IpRateLimiter::new(Duration::from_millis(10), 1);
        let start = Instant::now();
        assert!(limiter.allow_at("guest", start));
        assert!(!limiter.allow_at("guest", start + Duration::from_millis(5)));
        assert!(limiter.allow_at("guest", start + Duration::from_millis(20)));
    }

    #[test]
    fn prune_drops_idle_keys() {
        let limiter = IpRateLimiter::new(Duration::from_millis(1), 5);
        limiter.allow("idle");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(limiter.prune(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
