//! Minimum-interval gate for client-initiated requests.

use std::time::{Duration, Instant};

/// Allows at most one request per `interval`.
///
/// Denied requests do not move the window; only granted ones do.
#[derive(Debug, Clone)]
pub struct FeedbackThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl FeedbackThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Grants the request if none was granted within the last `interval`.
    /// Exactly `interval` after the previous grant is allowed.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_request_is_allowed() {
        let mut throttle = FeedbackThrottle::new(Duration::from_secs(2));
        assert!(throttle.try_acquire(Instant::now()));
    }

    #[test]
    fn test_requests_inside_interval_are_denied() {
        let mut throttle = FeedbackThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(100)));
        assert!(!throttle.try_acquire(start + Duration::from_millis(1999)));
    }

    #[test]
    fn test_boundary_is_inclusive() {
        let mut throttle = FeedbackThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(throttle.try_acquire(start));
        assert!(throttle.try_acquire(start + Duration::from_secs(2)));
    }

    #[test]
    fn test_denied_requests_do_not_extend_window() {
        let mut throttle = FeedbackThrottle::new(Duration::from_secs(2));
        let start = Instant::now();
        assert!(throttle.try_acquire(start));
        assert!(!throttle.try_acquire(start + Duration::from_millis(1500)));
        assert!(throttle.try_acquire(start + Duration::from_millis(2100)));
        assert_eq!(throttle.interval(), Duration::from_secs(2));
    }
}
