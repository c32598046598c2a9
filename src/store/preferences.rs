use crate::core::cache::KeyValueCollection;
use crate::core::preferences::{Preferences, PreferencesStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::debug;

pub const SELECTED_DATE_KEY: &str = "SelectedDate";
pub const SOURCE_CURRENCY_KEY: &str = "SourceCurrency";
pub const TARGET_CURRENCY_KEY: &str = "TargetCurrency";
pub const SOURCE_AMOUNT_KEY: &str = "SourceAmount";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Keeps each preference in its own slot of a key-value collection.
pub struct CollectionPreferences {
    collection: Arc<dyn KeyValueCollection>,
}

impl CollectionPreferences {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    async fn text(&self, key: &str) -> Option<String> {
        let raw = self.collection.get(key.as_bytes()).await?;
        match String::from_utf8(raw) {
            Ok(text) if !text.is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!("Ignoring unreadable preference {}: {}", key, e);
                None
            }
        }
    }
}

#[async_trait]
impl PreferencesStore for CollectionPreferences {
    async fn load(&self, today: NaiveDate) -> Preferences {
        let defaults = Preferences::defaults(today);

        let selected_date = self
            .text(SELECTED_DATE_KEY)
            .await
            .and_then(|text| NaiveDate::parse_from_str(&text, DATE_FORMAT).ok())
            .unwrap_or(defaults.selected_date);

        Preferences {
            selected_date,
            source_currency: self
                .text(SOURCE_CURRENCY_KEY)
                .await
                .unwrap_or(defaults.source_currency),
            target_currency: self
                .text(TARGET_CURRENCY_KEY)
                .await
                .unwrap_or(defaults.target_currency),
            source_amount: self
                .text(SOURCE_AMOUNT_KEY)
                .await
                .unwrap_or(defaults.source_amount),
        }
    }

    async fn save(&self, preferences: &Preferences) -> Result<()> {
        let date = preferences.selected_date.format(DATE_FORMAT).to_string();
        let slots = [
            (SELECTED_DATE_KEY, date.as_str()),
            (SOURCE_CURRENCY_KEY, preferences.source_currency.as_str()),
            (TARGET_CURRENCY_KEY, preferences.target_currency.as_str()),
            (SOURCE_AMOUNT_KEY, preferences.source_amount.as_str()),
        ];
        for (key, value) in slots {
            self.collection
                .put(key.as_bytes(), value.as_bytes(), None)
                .await
                .with_context(|| format!("Failed to save {key}"))?;
        }
        debug!(?preferences, "Saved preferences");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCollection;
    use std::time::Duration;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_empty() {
        let prefs = CollectionPreferences::new(Arc::new(MemoryCollection::new()));
        let today = ymd(2024, 6, 10);

        let loaded = prefs.load(today).await;
        assert_eq!(loaded, Preferences::defaults(today));
        assert_eq!(loaded.source_currency, "USD");
        assert_eq!(loaded.target_currency, "EUR");
        assert_eq!(loaded.source_amount, "1");
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let prefs = CollectionPreferences::new(Arc::new(MemoryCollection::new()));
        let saved = Preferences {
            selected_date: ymd(2024, 1, 9),
            source_currency: "JPY".to_string(),
            target_currency: "RUB".to_string(),
            source_amount: "100".to_string(),
        };
        prefs.save(&saved).await.unwrap();

        assert_eq!(prefs.load(ymd(2024, 6, 10)).await, saved);
    }

    #[tokio::test]
    async fn test_unreadable_slots_fall_back_individually() {
        let collection = Arc::new(MemoryCollection::new());
        collection
            .put(SELECTED_DATE_KEY.as_bytes(), b"10.01.2024", None)
            .await
            .unwrap();
        collection
            .put(SOURCE_CURRENCY_KEY.as_bytes(), &[0xff, 0xfe], None)
            .await
            .unwrap();
        collection
            .put(TARGET_CURRENCY_KEY.as_bytes(), b"", None)
            .await
            .unwrap();
        collection
            .put(SOURCE_AMOUNT_KEY.as_bytes(), b"42", None)
            .await
            .unwrap();

        let prefs = CollectionPreferences::new(collection);
        let today = ymd(2024, 6, 10);
        let loaded = prefs.load(today).await;

        assert_eq!(loaded.selected_date, today);
        assert_eq!(loaded.source_currency, "USD");
        assert_eq!(loaded.target_currency, "EUR");
        assert_eq!(loaded.source_amount, "42");
    }

    struct ReadOnlyCollection;

    #[async_trait]
    impl KeyValueCollection for ReadOnlyCollection {
        async fn get(&self, _key: &[u8]) -> Option<Vec<u8>> {
            None
        }

        async fn put(&self, _key: &[u8], _value: &[u8], _ttl: Option<Duration>) -> Result<()> {
            anyhow::bail!("partition is read-only")
        }

        async fn remove(&self, _key: &[u8]) {}
    }

    #[tokio::test]
    async fn test_save_reports_write_failures() {
        let prefs = CollectionPreferences::new(Arc::new(ReadOnlyCollection));

        let err = prefs
            .save(&Preferences::defaults(ymd(2024, 6, 10)))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), format!("Failed to save {SELECTED_DATE_KEY}"));
        assert!(format!("{err:#}").contains("partition is read-only"));
    }
}
