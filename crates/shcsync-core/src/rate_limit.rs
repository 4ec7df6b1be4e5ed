// ── Outbound rate limiter ──
//
// Spaces outbound writes by a fixed interval. Requests are deferred,
// never dropped; the caller serializes `acquire` so submission order is
// dispatch order.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RateLimiter {
    interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    /// A zero interval disables limiting.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.interval.is_zero()
    }

    /// How long a request arriving at `now` has to wait.
    pub fn delay_for(&self, now: Instant) -> Duration {
        if self.is_disabled() {
            return Duration::ZERO;
        }
        match self.last {
            Some(last) => self.interval.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    /// Record a dispatch at `now`.
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Wait until the next dispatch slot and claim it.
    pub async fn acquire(&mut self) {
        let delay = self.delay_for(Instant::now());
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.mark(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_request_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_millis(1000));
        assert_eq!(limiter.delay_for(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn early_request_waits_the_remainder() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1000));
        let start = Instant::now();
        limiter.mark(start);
        assert_eq!(
            limiter.delay_for(start + Duration::from_millis(300)),
            Duration::from_millis(700)
        );
        assert_eq!(
            limiter.delay_for(start + Duration::from_millis(1500)),
            Duration::ZERO
        );
    }

    #[test]
    fn zero_interval_disables() {
        let mut limiter = RateLimiter::new(Duration::ZERO);
        let now = Instant::now();
        limiter.mark(now);
        assert!(limiter.is_disabled());
        assert_eq!(limiter.delay_for(now), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_spaces_every_request() {
        let mut limiter = RateLimiter::new(Duration::from_millis(1000));
        let start = Instant::now();
        let mut dispatched = Vec::new();
        for _ in 0..4 {
            limiter.acquire().await;
            dispatched.push(start.elapsed());
        }
        assert_eq!(
            dispatched,
            vec![
                Duration::ZERO,
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(3000),
            ]
        );
    }
}
