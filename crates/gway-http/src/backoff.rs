use std::time::Duration;

/// Exponential backoff with full jitter, per the engine's retry contract.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_percent: f64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter_percent: 0.1,
            max_attempts: 3,
        }
    }
}

const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// `delay = min(max_delay, base_delay * multiplier^attempt) * (1 + U[-j, +j])`, clamped to
/// `[0, max_delay]`. `attempt` is zero-based (the delay before the *next* attempt).
pub fn compute_delay(cfg: &RetryConfig, attempt: u32, jitter_sample: f64) -> Duration {
    let unjittered = cfg.base_delay.as_secs_f64() * cfg.multiplier.powi(attempt as i32);
    let capped = unjittered.min(cfg.max_delay.as_secs_f64());
    let jitter = 1.0 + jitter_sample.clamp(-1.0, 1.0) * cfg.jitter_percent;
    let jittered = (capped * jitter).max(0.0).min(cfg.max_delay.as_secs_f64());
    Duration::from_secs_f64(jittered)
}

/// Draws a uniform jitter sample in `[-1, 1]` using the `rand` crate, the same source the
/// rest of the gateway uses for masking keys and routing weight ties.
pub fn sample_jitter() -> f64 {
    use rand::Rng;
    rand::rng().random_range(-1.0..=1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses_match_spec_list() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable_status(status));
        }
        for status in [200, 201, 301, 400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(status));
        }
    }

    #[test]
    fn delay_grows_exponentially_before_clamping() {
        let cfg = RetryConfig::default();
        let d0 = compute_delay(&cfg, 0, 0.0);
        let d1 = compute_delay(&cfg, 1, 0.0);
        let d2 = compute_delay(&cfg, 2, 0.0);
        assert_eq!(d0, Duration::from_secs(1));
        assert_eq!(d1, Duration::from_secs(2));
        assert_eq!(d2, Duration::from_secs(4));
    }

    #[test]
    fn delay_clamps_to_max_delay() {
        let cfg = RetryConfig::default();
        let d = compute_delay(&cfg, 20, 0.0);
        assert!(d <= cfg.max_delay);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let cfg = RetryConfig::default();
        let low = compute_delay(&cfg, 1, -1.0);
        let high = compute_delay(&cfg, 1, 1.0);
        assert!(low < Duration::from_secs(2));
        assert!(high > Duration::from_secs(2));
        assert!(high <= cfg.max_delay);
    }
}
