//! Rate records and the immutable per-date mapping built from them

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Currency every CBR rate is quoted against.
pub const BASE_CURRENCY: &str = "RUB";
pub const BASE_CURRENCY_NAME: &str = "Российский рубль";

/// Price of `nominal` units of a currency, expressed in the base currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyRate {
    pub code: String,
    pub name: String,
    pub value: Decimal,
    pub nominal: Decimal,
}

impl CurrencyRate {
    /// Builds a rate, rejecting records that would make conversions divide by zero.
    pub fn new(code: &str, name: &str, value: Decimal, nominal: Decimal) -> Option<Self> {
        if code.is_empty() || value <= Decimal::ZERO || nominal <= Decimal::ZERO {
            return None;
        }
        Some(Self {
            code: code.to_string(),
            name: name.to_string(),
            value,
            nominal,
        })
    }

    pub fn base() -> Self {
        Self {
            code: BASE_CURRENCY.to_string(),
            name: BASE_CURRENCY_NAME.to_string(),
            value: Decimal::ONE,
            nominal: Decimal::ONE,
        }
    }

    /// Value of `amount` units of this currency in the base currency.
    pub fn to_base(&self, amount: Decimal) -> Option<Decimal> {
        amount.checked_mul(self.value)?.checked_div(self.nominal)
    }

    /// Units of this currency worth `amount` of the base currency.
    pub fn from_base(&self, amount: Decimal) -> Option<Decimal> {
        amount.checked_mul(self.nominal)?.checked_div(self.value)
    }
}

/// All rates published for one date. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateMapping {
    date: NaiveDate,
    rates: BTreeMap<String, CurrencyRate>,
}

impl RateMapping {
    /// Creates a mapping for `date`. The base currency entry is always present
    /// so conversions to and from it need no special casing.
    pub fn new(date: NaiveDate, rates: impl IntoIterator<Item = CurrencyRate>) -> Self {
        let mut rates: BTreeMap<String, CurrencyRate> = rates
            .into_iter()
            .map(|rate| (rate.code.clone(), rate))
            .collect();
        rates.insert(BASE_CURRENCY.to_string(), CurrencyRate::base());
        Self { date, rates }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn get(&self, code: &str) -> Option<&CurrencyRate> {
        self.rates.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rates.contains_key(code)
    }

    /// Currency codes in sorted order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    pub fn rates(&self) -> impl Iterator<Item = &CurrencyRate> {
        self.rates.values()
    }

    /// True when the source published nothing besides the synthetic base entry.
    pub fn is_empty(&self) -> bool {
        self.rates.keys().all(|code| code == BASE_CURRENCY)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }
}

/// The most recently resolved mapping together with the date it is effective for.
#[derive(Debug, Clone, Default)]
pub struct RateCache {
    active: Option<Arc<RateMapping>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&mut self, mapping: Arc<RateMapping>) {
        self.active = Some(mapping);
    }

    pub fn mapping(&self) -> Option<&RateMapping> {
        self.active.as_deref()
    }

    pub fn effective_date(&self) -> Option<NaiveDate> {
        self.active.as_ref().map(|m| m.date())
    }

    pub fn lookup(&self, code: &str) -> Option<&CurrencyRate> {
        self.active.as_ref().and_then(|m| m.get(code))
    }
}
