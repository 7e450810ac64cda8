use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Sliding-window limit on posts per author.
#[derive(Debug, Clone)]
pub struct PostRateLimiter {
    window: Duration,
    max_posts: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
}

impl PostRateLimiter {
    pub fn new(window: Duration, max_posts: u32) -> Self {
        Self {
            window,
            max_posts,
            buckets: Arc::new(DashMap::new()),
        }
    }

    /// Record one attempt by `author_id`. Returns false when the author has
    /// used up the window, in which case nothing is recorded.
    pub fn allow(&self, author_id: &str) -> bool {
        let now = Instant::now();
        let window = self.window;

        let mut entry = self.buckets.entry(author_id.to_string()).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        if entry.len() as u32 >= self.max_posts {
            return false;
        }
        entry.push(now);
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn limit(&self) -> u32 {
        self.max_posts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_per_author() {
        let limiter = PostRateLimiter::new(Duration::from_secs(60), 2);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn window_expiry_frees_slots() {
        let limiter = PostRateLimiter::new(Duration::from_millis(0), 1);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
    }
}
