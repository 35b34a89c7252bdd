use rand::prelude::*;
use rand::rngs::SmallRng;
use std::cell::RefCell;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Duration;

thread_local! {
    static THREAD_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::seed_from_u64(entropy_seed()));
}

/// Seed for the per-thread RNG; the clock stands in if the OS has no entropy to give.
fn entropy_seed() -> u64 {
    let mut seed = [0u8; 8];
    match getrandom::getrandom(&mut seed) {
        Ok(()) => u64::from_le_bytes(seed),
        Err(_) => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default(),
    }
}

/// Configuration for retry delays with jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDelay {
    /// Base delay (in milliseconds) before applying exponential backoff and jitter
    base_delay_ms: u64,
    /// Ceiling (in milliseconds) on any single wait, after exponential backoff
    max_delay_ms: u64,
}

impl RetryDelay {
    /// Creates a new RetryDelay configuration
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Returns the configured base delay in milliseconds
    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    /// Returns the configured maximum delay in milliseconds
    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Wait before retry number `retry_count` (zero-based).
    ///
    /// The window doubles from the base with every retry, saturating instead
    /// of overflowing, and never exceeds the ceiling. The wait is drawn
    /// uniformly from the whole window.
    pub fn calculate_delay(&self, retry_count: u32) -> Duration {
        let exp_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry_count));

        let capped_delay = exp_delay.min(self.max_delay_ms);

        let jittered_delay =
            THREAD_RNG.with(|rng| rng.borrow_mut().random_range(0..=capped_delay));

        Duration::from_millis(jittered_delay)
    }
}

impl Default for RetryDelay {
    fn default() -> Self {
        Self {
            base_delay_ms: 100,
            max_delay_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn default_window_reaches_the_five_second_ceiling() {
        let retry_delay = RetryDelay::default();
        // 100ms * 2^6 = 6.4s, past the ceiling
        let waits: Vec<Duration> = (0..200).map(|_| retry_delay.calculate_delay(6)).collect();

        assert!(waits.iter().all(|wait| *wait <= Duration::from_secs(5)));
        assert!(
            waits.iter().any(|wait| *wait > Duration::from_millis(3_200)),
            "window should be the full ceiling, not 2^5 * base"
        );
    }

    #[test]
    fn saturated_window_still_varies() {
        let retry_delay = RetryDelay::new(u64::MAX / 2, 1_000);
        let waits: HashSet<u128> = (0..100)
            .map(|_| retry_delay.calculate_delay(40).as_millis())
            .collect();

        assert!(waits.len() > 1);
        assert!(waits.iter().all(|&wait| wait <= 1_000));
    }

    #[test]
    fn respects_max_delay_for_huge_retry_counts() {
        let retry_delay = RetryDelay::new(100, 500);

        for retry_count in [10, 63, 64, 1_000, u32::MAX] {
            let delay = retry_delay.calculate_delay(retry_count);
            assert!(
                delay.as_millis() <= 500,
                "Delay should respect max_delay cap"
            );
        }
    }

    #[test]
    fn zero_ceiling_means_no_wait() {
        let retry_delay = RetryDelay::new(100, 0);
        assert_eq!(retry_delay.calculate_delay(4), Duration::ZERO);
    }
}
