use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use gway_common::{CancelToken, GatewayError};

const MIN_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LimitDimension {
    Rpm,
    Tpm,
    Custom(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketKey {
    pub provider: String,
    pub plan: String,
    pub dimension: LimitDimension,
}

impl BucketKey {
    pub fn new(provider: impl Into<String>, plan: impl Into<String>, dimension: LimitDimension) -> Self {
        Self {
            provider: provider.into(),
            plan: plan.into(),
            dimension,
        }
    }
}

/// One catalog-supplied limit record; `TokenBucketLimiter::new` materializes one bucket per
/// record, seeded at full capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimit {
    pub provider: String,
    pub plan: String,
    pub dimension: LimitDimension,
    pub capacity: u64,
    pub refill_rate: u64,
    pub refill_interval: Duration,
}

struct BucketState {
    capacity: u64,
    refill_rate: u64,
    refill_interval: Duration,
    tokens: u64,
    last_refill: Instant,
}

impl BucketState {
    fn new(record: &RateLimit, now: Instant) -> Self {
        Self {
            capacity: record.capacity,
            refill_rate: record.refill_rate,
            refill_interval: record.refill_interval,
            tokens: record.capacity,
            last_refill: now,
        }
    }

    /// `periods = floor((now - last_refill) / refill_interval)`; credits `periods * refill_rate`
    /// tokens, clamped to capacity. Only integral periods advance, so `last_refill` resets to
    /// `now` whenever at least one period elapsed (spec §4.D step 1).
    fn refill(&mut self, now: Instant) {
        if self.refill_interval.is_zero() {
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let periods = (elapsed.as_secs_f64() / self.refill_interval.as_secs_f64()).floor();
        if periods >= 1.0 {
            let credited = (periods as u64).saturating_mul(self.refill_rate);
            self.tokens = self.tokens.saturating_add(credited).min(self.capacity);
            self.last_refill = now;
        }
    }

    fn try_acquire(&mut self, n: u64, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= n {
            self.tokens -= n;
            return Ok(());
        }
        let since_refill = now.saturating_duration_since(self.last_refill);
        let wait = self.refill_interval.saturating_sub(since_refill).max(MIN_WAIT);
        Err(wait)
    }

    fn rollback(&mut self, n: u64, now: Instant) {
        self.refill(now);
        self.tokens = self.tokens.saturating_add(n).min(self.capacity);
    }

    fn available(&mut self, now: Instant) -> u64 {
        self.refill(now);
        self.tokens
    }
}

/// One bucket per `(provider, plan, dimension)` (spec §4.D). Dimensions with no matching
/// catalog record acquire successfully with no effect — fail-open for forward compatibility.
pub struct TokenBucketLimiter {
    buckets: HashMap<BucketKey, Mutex<BucketState>>,
}

impl TokenBucketLimiter {
    pub fn new(records: impl IntoIterator<Item = RateLimit>) -> Self {
        let now = Instant::now();
        let buckets = records
            .into_iter()
            .map(|record| {
                let key = BucketKey::new(record.provider.clone(), record.plan.clone(), record.dimension.clone());
                (key, Mutex::new(BucketState::new(&record, now)))
            })
            .collect();
        Self { buckets }
    }

    /// Snapshot of currently available tokens; refills first. `None` means no catalog record
    /// exists for this key (unbounded / not rate-limited).
    pub async fn get_available(&self, key: &BucketKey) -> Option<u64> {
        let bucket = self.buckets.get(key)?;
        let mut state = bucket.lock().await;
        Some(state.available(Instant::now()))
    }

    /// Acquires `n` tokens, retrying with a refill-interval-derived wait until it succeeds or
    /// `cancel` fires. Fail-open (returns `Ok`) immediately for a key with no bucket.
    pub async fn acquire(&self, key: &BucketKey, n: u64, cancel: Option<&CancelToken>) -> Result<(), GatewayError> {
        let Some(bucket) = self.buckets.get(key) else {
            return Ok(());
        };
        loop {
            let wait = {
                let mut state = bucket.lock().await;
                match state.try_acquire(n, Instant::now()) {
                    Ok(()) => return Ok(()),
                    Err(wait) => wait,
                }
            };
            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                        _ = tokio::time::sleep(wait) => {}
                    }
                }
                None => tokio::time::sleep(wait).await,
            }
        }
    }

    async fn rollback(&self, key: &BucketKey, n: u64) {
        if let Some(bucket) = self.buckets.get(key) {
            let mut state = bucket.lock().await;
            state.rollback(n, Instant::now());
        }
    }

    /// Acquires every `(key, n)` pair in list order. On the first failure, rolls back every
    /// previously acquired pair (best-effort, clamped to capacity) and returns the failure.
    pub async fn acquire_all(
        &self,
        requests: &[(BucketKey, u64)],
        cancel: Option<&CancelToken>,
    ) -> Result<(), GatewayError> {
        let mut acquired: Vec<&(BucketKey, u64)> = Vec::with_capacity(requests.len());
        for request @ (key, n) in requests {
            match self.acquire(key, *n, cancel).await {
                Ok(()) => acquired.push(request),
                Err(err) => {
                    for (key, n) in acquired {
                        self.rollback(key, *n).await;
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(dimension: LimitDimension, capacity: u64, refill_rate: u64, interval_ms: u64) -> RateLimit {
        RateLimit {
            provider: "openai".into(),
            plan: "default".into(),
            dimension,
            capacity,
            refill_rate,
            refill_interval: Duration::from_millis(interval_ms),
        }
    }

    #[tokio::test]
    async fn acquire_succeeds_while_tokens_available() {
        let limiter = TokenBucketLimiter::new([record(LimitDimension::Rpm, 5, 5, 1000)]);
        let key = BucketKey::new("openai", "default", LimitDimension::Rpm);
        for _ in 0..5 {
            limiter.acquire(&key, 1, None).await.unwrap();
        }
        assert_eq!(limiter.get_available(&key).await, Some(0));
    }

    #[tokio::test]
    async fn acquire_waits_for_refill_then_succeeds() {
        let limiter = TokenBucketLimiter::new([record(LimitDimension::Rpm, 1, 1, 20)]);
        let key = BucketKey::new("openai", "default", LimitDimension::Rpm);
        limiter.acquire(&key, 1, None).await.unwrap();
        assert_eq!(limiter.get_available(&key).await, Some(0));

        // Real-time wait: the bucket refills ~20ms after the first acquire.
        limiter.acquire(&key, 1, None).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_dimension_fails_open() {
        let limiter = TokenBucketLimiter::new([record(LimitDimension::Rpm, 1, 1, 1000)]);
        let key = BucketKey::new("openai", "default", LimitDimension::Tpm);
        assert_eq!(limiter.get_available(&key).await, None);
        limiter.acquire(&key, 1_000_000, None).await.unwrap();
    }

    #[tokio::test]
    async fn acquire_all_succeeds_across_independent_buckets() {
        let limiter = TokenBucketLimiter::new([
            record(LimitDimension::Rpm, 1, 1, 1000),
            record(LimitDimension::Tpm, 100, 100, 1000),
        ]);
        let rpm = BucketKey::new("openai", "default", LimitDimension::Rpm);
        let tpm = BucketKey::new("openai", "default", LimitDimension::Tpm);

        limiter
            .acquire_all(&[(rpm.clone(), 1), (tpm.clone(), 10)], None)
            .await
            .unwrap();
        assert_eq!(limiter.get_available(&rpm).await, Some(0));
        assert_eq!(limiter.get_available(&tpm).await, Some(90));
    }

    #[tokio::test]
    async fn acquire_all_rolls_back_prior_legs_on_cancellation() {
        let limiter = TokenBucketLimiter::new([
            record(LimitDimension::Rpm, 5, 5, 1000),
            record(LimitDimension::Tpm, 1, 1, 60_000),
        ]);
        let rpm = BucketKey::new("openai", "default", LimitDimension::Rpm);
        let tpm = BucketKey::new("openai", "default", LimitDimension::Tpm);

        // Exhaust tpm so the second leg of acquire_all has to wait; cancel immediately so it
        // fails fast instead of hanging, exercising the rollback path.
        limiter.acquire(&tpm, 1, None).await.unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = limiter
            .acquire_all(&[(rpm.clone(), 3), (tpm.clone(), 1)], Some(&cancel))
            .await;
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert_eq!(limiter.get_available(&rpm).await, Some(5));
    }

    #[tokio::test]
    async fn acquire_never_leaves_tokens_negative() {
        let limiter = TokenBucketLimiter::new([record(LimitDimension::Rpm, 3, 1, 1000)]);
        let key = BucketKey::new("openai", "default", LimitDimension::Rpm);
        limiter.acquire(&key, 3, None).await.unwrap();
        assert_eq!(limiter.get_available(&key).await, Some(0));
    }

    #[tokio::test]
    async fn rollback_never_exceeds_capacity() {
        let limiter = TokenBucketLimiter::new([record(LimitDimension::Rpm, 3, 1, 1000)]);
        let key = BucketKey::new("openai", "default", LimitDimension::Rpm);
        limiter.rollback(&key, 100).await;
        assert_eq!(limiter.get_available(&key).await, Some(3));
    }
}
