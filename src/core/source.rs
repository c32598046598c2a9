//! Rate source abstractions

use crate::core::rates::RateMapping;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Why a source produced no rates for a date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("Request error: {0}")]
    Transport(String),

    #[error("HTTP error: {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("No rates published for {0}")]
    NoData(NaiveDate),
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(Arc<RateMapping>),
    Failure(FetchFailure),
}

impl From<FetchFailure> for FetchOutcome {
    fn from(failure: FetchFailure) -> Self {
        FetchOutcome::Failure(failure)
    }
}

/// Publishes the rate mapping for a single calendar date.
///
/// Implementations never return an error: every problem is folded into
/// [`FetchOutcome::Failure`] so callers can keep searching other dates.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome;
}

#[async_trait]
impl<T: RateSource + ?Sized> RateSource for &T {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        (**self).fetch(date).await
    }
}

#[async_trait]
impl<T: RateSource + ?Sized> RateSource for Arc<T> {
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        (**self).fetch(date).await
    }
}
