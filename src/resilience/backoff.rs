//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Calculate exponential backoff delay with jitter.
///
/// The delay for `attempt` n (1-based) is `base * 2^(n-1)` plus a random
/// jitter of up to `jitter_fraction` of that delay. The result never exceeds
/// `max` (or `base`, when `max` is smaller).
pub fn calculate_backoff(attempt: u32, base: Duration, max: Duration, jitter_fraction: f64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let delay_ms = base_ms.saturating_mul(exponential_base);
    let ceiling = max_ms.max(base_ms);
    let capped_delay = delay_ms.min(ceiling);

    let jitter_range = (capped_delay as f64 * jitter_fraction.clamp(0.0, 1.0)) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay.saturating_add(jitter).min(ceiling))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_backoff_calculation() {
        let b1 = calculate_backoff(1, ms(100), ms(2000), 0.1);
        assert!(b1 >= ms(100) && b1 < ms(110));

        let b2 = calculate_backoff(2, ms(100), ms(2000), 0.1);
        assert!(b2 >= ms(200) && b2 < ms(220));

        let max = calculate_backoff(10, ms(100), ms(1000), 0.1);
        assert_eq!(max, ms(1000));
    }

    #[test]
    fn test_jitter_never_exceeds_ceiling() {
        for attempt in 1..=8 {
            let delay = calculate_backoff(attempt, ms(300), ms(1000), 1.0);
            assert!(delay <= ms(1000), "attempt {attempt}: {delay:?}");
        }
        assert_eq!(calculate_backoff(3, ms(500), ms(100), 0.5), ms(500));
    }

    #[test]
    fn test_no_jitter_is_exact() {
        assert_eq!(calculate_backoff(3, ms(100), ms(10_000), 0.0), ms(400));
        assert_eq!(calculate_backoff(0, ms(100), ms(10_000), 0.0), Duration::ZERO);
        assert_eq!(calculate_backoff(64, ms(100), ms(10_000), 0.0), ms(10_000));
    }
}
