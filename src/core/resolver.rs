//! Backward date search over a [`RateSource`]

use crate::core::clock::Clock;
use crate::core::rates::RateMapping;
use crate::core::source::{FetchOutcome, RateSource};
use chrono::{Months, NaiveDate};
use std::sync::Arc;
use tracing::{debug, info, instrument};

pub const DEFAULT_LOOKBACK_MONTHS: u32 = 12;

#[derive(Debug, Clone)]
pub struct Resolution {
    pub mapping: Arc<RateMapping>,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("No rates available between {requested} and {floor}")]
    RateRangeExhausted {
        requested: NaiveDate,
        floor: NaiveDate,
    },
}

pub struct RateResolver<S: RateSource> {
    source: S,
    clock: Arc<dyn Clock>,
    lookback: Months,
}

impl<S: RateSource> RateResolver<S> {
    pub fn new(source: S, clock: Arc<dyn Clock>) -> Self {
        Self::with_lookback(source, clock, DEFAULT_LOOKBACK_MONTHS)
    }

    pub fn with_lookback(source: S, clock: Arc<dyn Clock>, lookback_months: u32) -> Self {
        Self {
            source,
            clock,
            lookback: Months::new(lookback_months),
        }
    }

    /// Oldest date the search may probe, relative to today.
    pub fn floor(&self) -> NaiveDate {
        let today = self.clock.today();
        today.checked_sub_months(self.lookback).unwrap_or(NaiveDate::MIN)
    }

    /// Finds the latest published mapping on or before `date`.
    ///
    /// `date` itself is always probed. Any failure for a date, transport
    /// errors included, moves the search one day back until the probe falls
    /// before [`RateResolver::floor`].
    #[instrument(name = "ResolveRates", skip(self), fields(date = %date))]
    pub async fn resolve(&self, date: NaiveDate) -> Result<Resolution, ResolveError> {
        let floor = self.floor();
        let mut probe = date;

        loop {
            match self.source.fetch(probe).await {
                FetchOutcome::Success(mapping) if !mapping.is_empty() => {
                    info!(effective_date = %probe, "Resolved rates");
                    return Ok(Resolution {
                        mapping,
                        effective_date: probe,
                    });
                }
                FetchOutcome::Success(_) => debug!("Empty mapping for {}", probe),
                FetchOutcome::Failure(reason) => debug!("No rates for {}: {}", probe, reason),
            }

            probe = match probe.pred_opt() {
                Some(previous) if previous >= floor => previous,
                _ => {
                    return Err(ResolveError::RateRangeExhausted {
                        requested: date,
                        floor,
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::rates::CurrencyRate;
    use crate::core::source::FetchFailure;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Publishes rates only for the listed dates and records every probe.
    struct ScriptedSource {
        available: HashSet<NaiveDate>,
        probes: Mutex<Vec<NaiveDate>>,
    }

    impl ScriptedSource {
        fn new(available: &[NaiveDate]) -> Self {
            Self {
                available: available.iter().copied().collect(),
                probes: Mutex::new(Vec::new()),
            }
        }

        fn probes(&self) -> Vec<NaiveDate> {
            self.probes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RateSource for ScriptedSource {
        async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
            self.probes.lock().unwrap().push(date);
            if self.available.contains(&date) {
                let usd = CurrencyRate::new("USD", "Доллар США", Decimal::from(90), Decimal::ONE)
                    .unwrap();
                FetchOutcome::Success(Arc::new(RateMapping::new(date, vec![usd])))
            } else {
                FetchFailure::Transport("connection reset".to_string()).into()
            }
        }
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clock(today: NaiveDate) -> Arc<dyn Clock> {
        Arc::new(FixedClock(today))
    }

    #[tokio::test]
    async fn test_resolves_requested_date_directly() {
        let today = ymd(2024, 5, 20);
        let source = ScriptedSource::new(&[today]);
        let resolver = RateResolver::new(&source, clock(today));

        let resolution = resolver.resolve(today).await.unwrap();
        assert_eq!(resolution.effective_date, today);
        assert_eq!(resolution.mapping.date(), today);
        assert_eq!(source.probes(), vec![today]);
    }

    #[tokio::test]
    async fn test_falls_back_over_three_missing_days() {
        let today = ymd(2024, 5, 20);
        let day_four = ymd(2024, 5, 17);
        let source = ScriptedSource::new(&[day_four]);
        let resolver = RateResolver::new(&source, clock(today));

        let resolution = resolver.resolve(today).await.unwrap();
        assert_eq!(resolution.effective_date, day_four);
        assert!(resolution.mapping.contains("USD"));
        assert_eq!(
            source.probes(),
            vec![today, ymd(2024, 5, 19), ymd(2024, 5, 18), day_four]
        );
    }

    #[tokio::test]
    async fn test_gives_up_after_a_year_without_rates() {
        let today = ymd(2024, 5, 20);
        let source = ScriptedSource::new(&[]);
        let resolver = RateResolver::new(&source, clock(today));

        let result = resolver.resolve(today).await;
        assert_eq!(
            result.unwrap_err(),
            ResolveError::RateRangeExhausted {
                requested: today,
                floor: ymd(2023, 5, 20),
            }
        );

        let probes = source.probes();
        // today back to the floor, inclusive
        assert_eq!(probes.len(), 367);
        assert_eq!(probes.last(), Some(&ymd(2023, 5, 20)));
    }

    #[tokio::test]
    async fn test_data_older_than_floor_is_not_reached() {
        let today = ymd(2024, 5, 20);
        let too_old = today - chrono::Duration::days(370);
        let source = ScriptedSource::new(&[too_old]);
        let resolver = RateResolver::new(&source, clock(today));

        assert!(resolver.resolve(today).await.is_err());
        assert!(!source.probes().contains(&too_old));
    }

    #[tokio::test]
    async fn test_requested_date_before_floor_is_probed_once() {
        let today = ymd(2024, 5, 20);
        let ancient = ymd(2020, 1, 10);
        let source = ScriptedSource::new(&[ancient]);
        let resolver = RateResolver::new(&source, clock(today));

        let resolution = resolver.resolve(ancient).await.unwrap();
        assert_eq!(resolution.effective_date, ancient);

        let empty = ScriptedSource::new(&[]);
        let resolver = RateResolver::new(&empty, clock(today));
        assert!(resolver.resolve(ancient).await.is_err());
        assert_eq!(empty.probes(), vec![ancient]);
    }

    #[tokio::test]
    async fn test_base_only_mapping_counts_as_missing() {
        struct BaseOnly;

        #[async_trait]
        impl RateSource for BaseOnly {
            async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
                FetchOutcome::Success(Arc::new(RateMapping::new(date, Vec::new())))
            }
        }

        let today = ymd(2024, 5, 20);
        let resolver = RateResolver::with_lookback(BaseOnly, clock(today), 1);
        assert!(matches!(
            resolver.resolve(today).await,
            Err(ResolveError::RateRangeExhausted { .. })
        ));
    }
}
