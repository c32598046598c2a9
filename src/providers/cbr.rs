use super::util::{RetryPolicy, with_retry};
use crate::core::clock::Clock;
use crate::core::rates::{CurrencyRate, RateMapping};
use crate::core::source::{FetchFailure, FetchOutcome, RateSource};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DailyResponse {
    valute: HashMap<String, ValuteEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValuteEntry {
    #[serde(default)]
    char_code: String,
    #[serde(default)]
    name: String,
    value: serde_json::Number,
    nominal: serde_json::Number,
}

fn to_decimal(number: &serde_json::Number) -> Option<Decimal> {
    let text = number.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Builds the mapping for `date` from a CBR daily JSON document. A document
/// without a single usable record counts as no publication for that date.
fn parse_daily(date: NaiveDate, body: &str) -> Result<RateMapping, FetchFailure> {
    let response: DailyResponse =
        serde_json::from_str(body).map_err(|e| FetchFailure::Malformed(e.to_string()))?;

    let rates = response.valute.into_iter().filter_map(|(key, entry)| {
        let code = if entry.char_code.is_empty() {
            key
        } else {
            entry.char_code
        };
        let rate = to_decimal(&entry.value)
            .zip(to_decimal(&entry.nominal))
            .and_then(|(value, nominal)| CurrencyRate::new(&code, &entry.name, value, nominal));
        if rate.is_none() {
            debug!("Skipping unusable rate record for {}", code);
        }
        rate
    });

    let mapping = RateMapping::new(date, rates);
    if mapping.is_empty() {
        return Err(FetchFailure::NoData(date));
    }
    Ok(mapping)
}

/// Daily official rates published by the Central Bank of Russia, via the
/// cbr-xml-daily JSON mirror.
pub struct CbrRateSource {
    base_url: String,
    client: reqwest::Client,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl CbrRateSource {
    pub fn new(base_url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder().user_agent("mconv/0.1").build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            clock,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Today's rates live at a fixed address; earlier dates under the archive.
    pub fn url_for(&self, date: NaiveDate) -> String {
        if date == self.clock.today() {
            format!("{}/daily_json.js", self.base_url)
        } else {
            format!(
                "{}/archive/{:04}/{:02}/{:02}/daily_json.js",
                self.base_url,
                date.year(),
                date.month(),
                date.day()
            )
        }
    }

    async fn fetch_mapping(&self, date: NaiveDate) -> Result<RateMapping, FetchFailure> {
        let url = self.url_for(date);
        debug!("Requesting rates from {}", url);

        let response = with_retry(
            self.retry,
            || async { self.client.get(&url).send().await },
            |e: &reqwest::Error| e.is_connect() || e.is_timeout(),
        )
        .await
        .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;
        parse_daily(date, &body)
    }
}

#[async_trait]
impl RateSource for CbrRateSource {
    #[instrument(name = "CbrRateFetch", skip(self), fields(date = %date))]
    async fn fetch(&self, date: NaiveDate) -> FetchOutcome {
        match self.fetch_mapping(date).await {
            Ok(mapping) => {
                debug!(currencies = mapping.len(), "Received CBR rates");
                FetchOutcome::Success(Arc::new(mapping))
            }
            Err(failure) => {
                debug!(%failure, "CBR rates unavailable");
                FetchOutcome::Failure(failure)
            }
        }
    }
}
