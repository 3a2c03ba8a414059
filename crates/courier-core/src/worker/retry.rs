//! Retry policy: how long a failed task waits before it is re-pushed.
//!
//! The retry *budget* (`max_retries`) belongs to the worker config. A policy
//! only decides the delay for a retry that the budget already allows.

use std::time::Duration;

use rand::Rng;

pub trait RetryPolicy: Send + Sync {
    /// Delay before re-pushing a task that has failed `retry_count + 1` times
    /// (`retry_count` is the value before increment).
    fn delay_for(&self, retry_count: u32) -> Duration;
}

/// Re-push right away. The task still joins the back of the queue, so a
/// poison task cannot monopolize the worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateRequeue;

impl RetryPolicy for ImmediateRequeue {
    fn delay_for(&self, _retry_count: u32) -> Duration {
        Duration::ZERO
    }
}

/// delay = base_delay * multiplier^retry_count, capped at `max_delay`.
///
/// Example with base_delay=2s, multiplier=2.0:
/// - first failure: 2s
/// - second failure: 4s
/// - third failure: 8s
///
/// With `jitter`, the delay is drawn uniformly from `[delay / 2, delay]`.
///
/// The worker sleeps through the delay on its own loop, so a long delay also
/// holds back the rest of that queue.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: false,
        }
    }
}

impl ExponentialBackoff {
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_for(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(i32::MAX as u32) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        // past u64::MAX seconds (or infinite) there is no Duration; use the cap
        let capped = Duration::try_from_secs_f64(secs.max(0.0))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay));

        if self.jitter && !capped.is_zero() {
            let factor = rand::thread_rng().gen_range(0.5..=1.0);
            capped.mul_f64(factor)
        } else {
            capped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_requeue_never_waits() {
        let policy = ImmediateRequeue;
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(10), Duration::ZERO);
    }

    #[test]
    fn exponential_backoff_increases() {
        let policy = ExponentialBackoff::default();

        let d1 = policy.delay_for(0);
        let d2 = policy.delay_for(1);
        let d3 = policy.delay_for(2);

        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
        assert_eq!(d3, Duration::from_secs(8));
    }

    #[test]
    fn exponential_backoff_is_capped() {
        let policy = ExponentialBackoff {
            max_delay: Duration::from_secs(10),
            ..ExponentialBackoff::default()
        };

        assert_eq!(policy.delay_for(3), Duration::from_secs(10));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn huge_exponents_saturate_at_max_delay() {
        let policy = ExponentialBackoff::default();
        for retry_count in 63..=1100 {
            assert_eq!(policy.delay_for(retry_count), Duration::from_secs(60));
        }
        assert!(policy.clone().with_jitter().delay_for(1100) <= Duration::from_secs(60));
    }

    #[test]
    fn negative_multiplier_never_waits_negative() {
        let policy = ExponentialBackoff {
            multiplier: -2.0,
            ..ExponentialBackoff::default()
        };
        assert_eq!(policy.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_half_to_full_delay() {
        let policy = ExponentialBackoff::default().with_jitter();
        for _ in 0..100 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_secs(4));
        }
    }
}
