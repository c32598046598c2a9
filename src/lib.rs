pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::cli::screen::Screen;
use crate::core::cache::Store;
use crate::core::clock::{Clock, SystemClock};
use crate::core::config::AppConfig;
use crate::core::converter::{Converter, ConverterState};
use crate::core::preferences::PreferencesStore;
use crate::core::resolver::RateResolver;
use crate::providers::{CachingRateSource, CbrRateSource};
use crate::store::KeyValueStore;
use crate::store::preferences::CollectionPreferences;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{debug, info};

pub const RATES_COLLECTION: &str = "rates";
pub const PREFERENCES_COLLECTION: &str = "preferences";

/// Wires the CBR source, the rate cache and stored preferences into a
/// converter whose state reflects the last session.
pub async fn build_converter(
    config: &AppConfig,
    store: &KeyValueStore,
    clock: Arc<dyn Clock>,
) -> Result<Converter<CachingRateSource<CbrRateSource>>> {
    config.validate()?;
    let persist = store.is_persistent();
    let rates_collection = store
        .get_collection(RATES_COLLECTION, persist, true)
        .context("Could not open the rates cache")?;
    let preferences_collection = store
        .get_collection(PREFERENCES_COLLECTION, persist, true)
        .context("Could not open the preferences store")?;

    let cbr = CbrRateSource::new(config.cbr_base_url(), Arc::clone(&clock))?;
    let source = CachingRateSource::new(
        cbr,
        rates_collection,
        Arc::clone(&clock),
        Duration::from_secs(config.rates.today_ttl_secs),
    );
    let resolver =
        RateResolver::with_lookback(source, Arc::clone(&clock), config.rates.lookback_months);

    let preferences: Arc<dyn PreferencesStore> =
        Arc::new(CollectionPreferences::new(preferences_collection));
    let restored = preferences.load(clock.today()).await;
    debug!(?restored, "Restored preferences");

    Ok(Converter::new(
        ConverterState::from_preferences(restored),
        resolver,
        preferences,
    ))
}

pub async fn run(config_path: Option<&str>) -> Result<()> {
    info!("Currency converter starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load_or_default()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.data_path()?;
    let store = KeyValueStore::open(&data_path);
    if !store.is_persistent() {
        info!(
            "Preferences and rates will not persist: {} is unavailable",
            data_path.display()
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let converter = build_converter(&config, &store, Arc::clone(&clock)).await?;

    Screen::new(Arc::new(converter), clock, std::io::stdout())
        .run(BufReader::new(tokio::io::stdin()))
        .await
}
