//! Two amount fields kept in sync over the active rate mapping

use crate::core::conversion::{Direction, convert, format_amount, parse_amount};
use crate::core::preferences::{Preferences, PreferencesStore};
use crate::core::rates::RateCache;
use crate::core::resolver::{RateResolver, Resolution, ResolveError};
use crate::core::source::RateSource;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Display;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Currency conventionally traded in lots of a hundred units.
pub const LOT_CURRENCY: &str = "JPY";
pub const LOT_AMOUNT: &str = "100";

/// Which amount field is driving the current recompute.
///
/// Outside of a target edit the state is always `Idle` and the source amount
/// drives. A target edit moves to `TargetDriven` for the duration of the
/// reverse recompute and back to `Idle` when it ends, however it ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Idle,
    TargetDriven,
}

impl SyncMode {
    fn direction(self) -> Direction {
        match self {
            SyncMode::Idle => Direction::Forward,
            SyncMode::TargetDriven => Direction::Reverse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateStatus {
    Loading,
    Loaded(NaiveDate),
    Unavailable,
}

impl Display for RateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateStatus::Loading => write!(f, "Loading rates..."),
            RateStatus::Loaded(date) => write!(f, "{}", date.format("%d.%m.%Y")),
            RateStatus::Unavailable => write!(f, "Rates unavailable for the selected range"),
        }
    }
}

/// A single field mutation, carrying the field's new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldChange {
    SelectedDate(NaiveDate),
    SourceCurrency(Option<String>),
    TargetCurrency(Option<String>),
    SourceAmount(String),
    TargetAmount(String),
    Currencies(Vec<String>),
    Status(RateStatus),
}

pub type Observer = Box<dyn Fn(&FieldChange) + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct AmountField {
    text: String,
    value: Decimal,
}

impl AmountField {
    fn typed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            value: parse_amount(text).unwrap_or(Decimal::ZERO),
        }
    }
}

pub struct ConverterState {
    selected_date: NaiveDate,
    source_currency: Option<String>,
    target_currency: Option<String>,
    source: AmountField,
    target: AmountField,
    rates: RateCache,
    currencies: Vec<String>,
    status: RateStatus,
    mode: SyncMode,
    observers: Vec<Observer>,
}

fn normalize_code(code: &str) -> Option<String> {
    let code = code.trim().to_uppercase();
    (!code.is_empty()).then_some(code)
}

impl ConverterState {
    pub fn from_preferences(preferences: Preferences) -> Self {
        Self {
            selected_date: preferences.selected_date,
            source_currency: normalize_code(&preferences.source_currency),
            target_currency: normalize_code(&preferences.target_currency),
            source: AmountField::typed(&preferences.source_amount),
            target: AmountField::default(),
            rates: RateCache::new(),
            currencies: Vec::new(),
            status: RateStatus::Loading,
            mode: SyncMode::Idle,
            observers: Vec::new(),
        }
    }

    /// Registers a callback invoked synchronously for every field that changes.
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    fn notify(&self, change: FieldChange) {
        for observer in &self.observers {
            observer(&change);
        }
    }

    pub fn selected_date(&self) -> NaiveDate {
        self.selected_date
    }

    pub fn source_currency(&self) -> Option<&str> {
        self.source_currency.as_deref()
    }

    pub fn target_currency(&self) -> Option<&str> {
        self.target_currency.as_deref()
    }

    pub fn source_amount(&self) -> &str {
        &self.source.text
    }

    pub fn target_amount(&self) -> &str {
        &self.target.text
    }

    pub fn source_value(&self) -> Decimal {
        self.source.value
    }

    pub fn target_value(&self) -> Decimal {
        self.target.value
    }

    pub fn currencies(&self) -> &[String] {
        &self.currencies
    }

    pub fn rates(&self) -> &RateCache {
        &self.rates
    }

    pub fn status(&self) -> &RateStatus {
        &self.status
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Snapshot of the fields that survive a restart.
    pub fn preferences(&self) -> Preferences {
        Preferences {
            selected_date: self.selected_date,
            source_currency: self.source_currency.clone().unwrap_or_default(),
            target_currency: self.target_currency.clone().unwrap_or_default(),
            source_amount: self.source.text.clone(),
        }
    }

    pub fn set_source_amount(&mut self, text: &str) {
        if self.assign_source_text(text) {
            self.recompute();
        }
    }

    pub fn set_target_amount(&mut self, text: &str) {
        if self.target.text == text {
            return;
        }
        // The reverse recompute writes the source field directly and never
        // comes back through here.
        debug_assert_eq!(self.mode, SyncMode::Idle);
        self.target = AmountField::typed(text);
        self.notify(FieldChange::TargetAmount(self.target.text.clone()));

        self.mode = SyncMode::TargetDriven;
        self.recompute();
        self.mode = SyncMode::Idle;
    }

    pub fn set_source_currency(&mut self, code: &str) {
        let code = normalize_code(code);
        if self.source_currency == code {
            return;
        }
        self.source_currency = code;
        self.notify(FieldChange::SourceCurrency(self.source_currency.clone()));

        if self.source_currency.as_deref() == Some(LOT_CURRENCY) {
            self.assign_source_text(LOT_AMOUNT);
        }
        self.recompute();
    }

    pub fn set_target_currency(&mut self, code: &str) {
        let code = normalize_code(code);
        if self.target_currency == code {
            return;
        }
        self.target_currency = code;
        self.notify(FieldChange::TargetCurrency(self.target_currency.clone()));
        self.recompute();
    }

    /// Exchanges source and target currencies, keeping the source amount as the driver.
    pub fn swap_currencies(&mut self) {
        let source = self.source_currency.clone().unwrap_or_default();
        let target = self.target_currency.clone().unwrap_or_default();
        self.set_source_currency(&target);
        self.set_target_currency(&source);
    }

    /// Changes the selected date. Returns `true` when rates must be reloaded.
    pub fn set_selected_date(&mut self, date: NaiveDate) -> bool {
        if self.selected_date == date {
            return false;
        }
        self.selected_date = date;
        self.notify(FieldChange::SelectedDate(date));
        self.set_status(RateStatus::Loading);
        true
    }

    /// Applies the outcome of a rate resolution.
    ///
    /// On success the mapping is replaced, the currency list refreshed and the
    /// target amount recomputed; the returned preferences should be persisted.
    /// On failure only the status changes.
    pub fn apply_resolution(
        &mut self,
        outcome: Result<Resolution, ResolveError>,
    ) -> Option<Preferences> {
        match outcome {
            Ok(resolution) => {
                self.rates.replace(resolution.mapping);
                self.set_status(RateStatus::Loaded(resolution.effective_date));
                self.refresh_currencies();
                self.recompute();
                Some(self.preferences())
            }
            Err(e) => {
                debug!("Keeping previous rates: {}", e);
                self.set_status(RateStatus::Unavailable);
                None
            }
        }
    }

    fn set_status(&mut self, status: RateStatus) {
        if self.status != status {
            self.status = status;
            self.notify(FieldChange::Status(self.status.clone()));
        }
    }

    fn refresh_currencies(&mut self) {
        let Some(mapping) = self.rates.mapping() else {
            return;
        };
        let codes: Vec<String> = mapping.codes().map(str::to_string).collect();

        let keep_source = self.source_currency.as_ref().filter(|c| mapping.contains(c));
        let source_dropped = keep_source.is_none() && self.source_currency.is_some();
        let keep_target = self.target_currency.as_ref().filter(|c| mapping.contains(c));
        let target_dropped = keep_target.is_none() && self.target_currency.is_some();

        if self.currencies != codes {
            self.currencies = codes;
            self.notify(FieldChange::Currencies(self.currencies.clone()));
        }
        if source_dropped {
            self.source_currency = None;
            self.notify(FieldChange::SourceCurrency(None));
        }
        if target_dropped {
            self.target_currency = None;
            self.notify(FieldChange::TargetCurrency(None));
        }
    }

    fn assign_source_text(&mut self, text: &str) -> bool {
        if self.source.text == text {
            return false;
        }
        self.source = AmountField::typed(text);
        self.notify(FieldChange::SourceAmount(self.source.text.clone()));
        true
    }

    /// Recomputes the derived amount. The driving side follows [`SyncMode`].
    fn recompute(&mut self) {
        let (Some(mapping), Some(from), Some(to)) = (
            self.rates.mapping(),
            self.source_currency.as_deref(),
            self.target_currency.as_deref(),
        ) else {
            return;
        };

        let direction = self.mode.direction();
        let driving = match direction {
            Direction::Forward => self.source.value,
            Direction::Reverse => self.target.value,
        };
        let Some(result) = convert(mapping, from, to, driving, direction) else {
            return;
        };

        let derived = AmountField {
            text: format_amount(result),
            value: result,
        };
        match direction {
            Direction::Forward => {
                let changed = self.target.text != derived.text;
                self.target = derived;
                if changed {
                    self.notify(FieldChange::TargetAmount(self.target.text.clone()));
                }
            }
            Direction::Reverse => {
                let changed = self.source.text != derived.text;
                self.source = derived;
                if changed {
                    self.notify(FieldChange::SourceAmount(self.source.text.clone()));
                }
            }
        }
    }
}

/// Drives a [`ConverterState`] from asynchronous rate resolutions.
///
/// The state lock is never held across an `.await`: edits made while a
/// resolution is in flight see the previous mapping, and overlapping
/// resolutions are applied in the order they finish. Observers run under the
/// lock and must not call back into the converter.
pub struct Converter<S: RateSource> {
    state: Mutex<ConverterState>,
    resolver: RateResolver<S>,
    preferences: Arc<dyn PreferencesStore>,
}

impl<S: RateSource> Converter<S> {
    pub fn new(
        state: ConverterState,
        resolver: RateResolver<S>,
        preferences: Arc<dyn PreferencesStore>,
    ) -> Self {
        Self {
            state: Mutex::new(state),
            resolver,
            preferences,
        }
    }

    /// Runs `f` against the state. All synchronous edits go through here.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut ConverterState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Resolves rates for the currently selected date and applies them.
    pub async fn reload(&self) -> Result<NaiveDate, ResolveError> {
        let date = self.with_state(|state| state.selected_date());
        let outcome = self.resolver.resolve(date).await;
        let effective = outcome.as_ref().map(|r| r.effective_date).map_err(Clone::clone);

        if let Some(preferences) = self.with_state(|state| state.apply_resolution(outcome))
            && let Err(e) = self.preferences.save(&preferences).await
        {
            warn!("Failed to persist preferences: {e:#}");
        }
        effective
    }

    /// Selects a new date and reloads rates for it. Returns `None` when the
    /// date did not change.
    pub async fn select_date(&self, date: NaiveDate) -> Option<Result<NaiveDate, ResolveError>> {
        if self.with_state(|state| state.set_selected_date(date)) {
            Some(self.reload().await)
        } else {
            None
        }
    }
}
