use crate::core::cache::KeyValueCollection;
use crate::core::clock::Clock;
use crate::core::rates::RateMapping;
use crate::core::source::{FetchOutcome, RateSource};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Remembers successful fetches per date.
///
/// Archived dates never change once published and are kept without expiry;
/// today's mapping is kept for `today_ttl`. Failures always reach the inner
/// source again.
pub struct CachingRateSource<T: RateSource> {
    inner: T,
    cache: Arc<dyn KeyValueCollection>,
    clock: Arc<dyn Clock>,
    today_ttl: Duration,
}

impl<T: RateSource> CachingRateSource<T> {
    pub fn new(
        inner: T,
        cache: Arc<dyn KeyValueCollection>,
        clock: Arc<dyn Clock>,
        today_ttl: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            clock,
            today_ttl,
        }
    }

    async fn cached(&self, key: &str) -> Option<RateMapping> {
        let raw = self.cache.get(key.as_bytes()).await?;
        match serde_json::from_slice(&raw) {
            Ok(mapping) => Some(mapping),
            Err(e) => {
                debug!("Discarding unreadable cached rates for {}: {}", key, e);
                self.cache.remove(key.as_bytes()).await;
                None
            }
        }
    }
}

#[async_trait]
impl<T: RateSource> RateSource for CachingRateSource<T> {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        let key = date.to_string();
        if let Some(mapping) = self.cached(&key).await {
            debug!("Cache hit for rates: {}", key);
            return FetchOutcome::Success(Arc::new(mapping));
        }
        debug!("Cache miss for rates: {}", key);

        let outcome = self.inner.fetch(date).await;
        if let FetchOutcome::Success(mapping) = &outcome {
            let ttl = (date == self.clock.today()).then_some(self.today_ttl);
            match serde_json::to_vec(mapping.as_ref()) {
                Ok(raw) => {
                    if let Err(e) = self.cache.put(key.as_bytes(), &raw, ttl).await {
                        debug!("Could not cache rates for {}: {}", key, e);
                    }
                }
                Err(e) => debug!("Could not encode rates for {}: {}", key, e),
            }
        }
        outcome
    }
}
