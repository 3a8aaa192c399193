//! Exponential backoff with optional jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::{RecoveryConfig, RetryConfig};

/// `min(initial * factor^attempts, max)`.
fn exponential(initial: Duration, factor: f64, max: Duration, attempts: u32) -> Duration {
    let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
    let scaled = initial.as_secs_f64() * factor.powi(exponent);

    if scaled.is_finite() && scaled < max.as_secs_f64() {
        Duration::from_secs_f64(scaled.max(0.0))
    } else {
        max
    }
}

/// Delay before the retry that follows `retries` earlier ones.
pub fn retry_delay(config: &RetryConfig, retries: u32) -> Duration {
    exponential(
        config.initial_delay(),
        config.backoff_factor,
        config.max_delay(),
        retries,
    )
}

/// Delay before the recovery attempt that follows `attempts` failed ones.
///
/// The exponential delay plus up to `jitter_ratio` of it drawn at random.
pub fn recovery_delay(config: &RecoveryConfig, attempts: u32) -> Duration {
    let capped = exponential(
        config.initial_delay(),
        config.backoff_factor,
        config.max_delay(),
        attempts,
    );

    if config.jitter_ratio <= 0.0 {
        return capped;
    }
    let jitter_range = capped.as_secs_f64() * config.jitter_ratio;
    if jitter_range <= 0.0 {
        return capped;
    }
    capped + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..jitter_range))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(initial_ms: u64, factor: f64, max_ms: u64) -> RecoveryConfig {
        RecoveryConfig {
            initial_delay_ms: initial_ms,
            backoff_factor: factor,
            max_delay_ms: max_ms,
            ..RecoveryConfig::default()
        }
    }

    #[test]
    fn test_backoff_calculation() {
        let c = config(1000, 2.0, 60_000);
        assert_eq!(recovery_delay(&c, 0), Duration::from_secs(1));
        assert_eq!(recovery_delay(&c, 1), Duration::from_secs(2));
        assert_eq!(recovery_delay(&c, 3), Duration::from_secs(8));
        assert_eq!(recovery_delay(&c, 10), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_huge_attempts_saturate() {
        let c = config(1000, 2.0, 5_000);
        assert_eq!(recovery_delay(&c, u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_schedule() {
        let c = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 250,
            backoff_factor: 2.0,
            max_delay_ms: 1500,
        };
        let delays: Vec<u128> = (0..4).map(|n| retry_delay(&c, n).as_millis()).collect();
        assert_eq!(delays, vec![250, 500, 1000, 1500]);
    }

    #[test]
    fn test_jitter_bounds() {
        let c = RecoveryConfig {
            jitter_ratio: 0.5,
            ..config(1000, 2.0, 60_000)
        };
        for _ in 0..50 {
            let d = recovery_delay(&c, 1);
            assert!(d >= Duration::from_secs(2));
            assert!(d < Duration::from_secs(3));
        }
    }
}
