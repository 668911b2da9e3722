use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::{Clock, DefaultClock, Reference};
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Minimum-interval throttle owned by one API client.
///
/// Two admitted calls are never closer than `60 / rpm` seconds, no matter how
/// long the throttle sat idle before. Waiters are served one at a time.
pub struct Throttle<C: Clock = DefaultClock> {
    clock: C,
    interval: Duration,
    last: Mutex<Option<C::Instant>>,
}

pub fn min_interval(rpm_limit: NonZeroU32) -> Duration {
    Duration::from_secs_f64(60.0 / rpm_limit.get() as f64)
}

impl Throttle<DefaultClock> {
    pub fn per_minute(rpm_limit: NonZeroU32) -> Self {
        Self::with_clock(rpm_limit, DefaultClock::default())
    }
}

impl<C: Clock> Throttle<C> {
    pub fn with_clock(rpm_limit: NonZeroU32, clock: C) -> Self {
        Self {
            clock,
            interval: min_interval(rpm_limit),
            last: Mutex::new(None),
        }
    }

    fn wait_after(&self, last: Option<C::Instant>, now: C::Instant) -> Duration {
        match last {
            None => Duration::ZERO,
            Some(last) => self
                .interval
                .saturating_sub(Duration::from(now.duration_since(last))),
        }
    }

    /// Waits until the interval since the previous admitted call has elapsed.
    pub async fn acquire(&self) {
        let mut last = self.last.lock().await;
        let wait = self.wait_after(*last, self.clock.now());
        if !wait.is_zero() {
            tracing::debug!("throttle: waiting {:?}", wait);
            sleep(wait).await;
        }
        *last = Some(self.clock.now());
    }

    /// Non-blocking admission check. Fails while another caller is waiting.
    pub fn try_acquire(&self) -> bool {
        let Ok(mut last) = self.last.try_lock() else {
            return false;
        };
        let now = self.clock.now();
        if !self.wait_after(*last, now).is_zero() {
            return false;
        }
        *last = Some(now);
        true
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;
    use nonzero_ext::nonzero;

    #[test]
    fn test_interval_from_rpm() {
        assert_eq!(min_interval(nonzero!(5u32)), Duration::from_secs(12));
        assert_eq!(min_interval(nonzero!(60u32)), Duration::from_secs(1));
    }

    #[test]
    fn test_calls_spaced_by_interval() {
        let clock = FakeRelativeClock::default();
        let throttle = Throttle::with_clock(nonzero!(5u32), clock.clone());

        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());

        clock.advance(Duration::from_secs(11));
        assert!(!throttle.try_acquire());

        clock.advance(Duration::from_secs(1));
        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());
    }

    #[test]
    fn test_idle_time_does_not_bank_calls() {
        let clock = FakeRelativeClock::default();
        let throttle = Throttle::with_clock(nonzero!(30u32), clock.clone());

        assert!(throttle.try_acquire());
        assert!(!throttle.try_acquire());

        clock.advance(Duration::from_secs(600));
        assert!(throttle.try_acquire());
        for _ in 0..4 {
            assert!(!throttle.try_acquire());
        }

        clock.advance(Duration::from_secs(1));
        assert!(!throttle.try_acquire());
        clock.advance(Duration::from_secs(1));
        assert!(throttle.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_sleeps_out_the_interval() {
        let throttle = Throttle::per_minute(nonzero!(600u32));
        let started = std::time::Instant::now();
        throttle.acquire().await;
        assert!(started.elapsed() < Duration::from_millis(100));

        throttle.acquire().await;
        throttle.acquire().await;
        assert!(started.elapsed() >= Duration::from_millis(190));
    }
}
