//! Last-used screen values and the store that keeps them between runs

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

pub const DEFAULT_SOURCE_CURRENCY: &str = "USD";
pub const DEFAULT_TARGET_CURRENCY: &str = "EUR";
pub const DEFAULT_SOURCE_AMOUNT: &str = "1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub selected_date: NaiveDate,
    pub source_currency: String,
    pub target_currency: String,
    pub source_amount: String,
}

impl Preferences {
    pub fn defaults(today: NaiveDate) -> Self {
        Self {
            selected_date: today,
            source_currency: DEFAULT_SOURCE_CURRENCY.to_string(),
            target_currency: DEFAULT_TARGET_CURRENCY.to_string(),
            source_amount: DEFAULT_SOURCE_AMOUNT.to_string(),
        }
    }
}

/// Persists the four user-facing fields of the converter.
///
/// `load` never fails: every missing or unreadable slot falls back to its
/// entry in [`Preferences::defaults`].
#[async_trait]
pub trait PreferencesStore: Send + Sync {
    async fn load(&self, today: NaiveDate) -> Preferences;
    async fn save(&self, preferences: &Preferences) -> Result<()>;
}
