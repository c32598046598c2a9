//! Core business logic abstractions

pub mod cache;
pub mod clock;
pub mod config;
pub mod conversion;
pub mod converter;
pub mod log;
pub mod preferences;
pub mod rates;
pub mod resolver;
pub mod source;

// Re-export main types for cleaner imports
pub use clock::{Clock, FixedClock, SystemClock};
pub use conversion::{Direction, convert, format_amount, parse_amount};
pub use converter::{Converter, ConverterState, FieldChange, RateStatus, SyncMode};
pub use preferences::{Preferences, PreferencesStore};
pub use rates::{CurrencyRate, RateCache, RateMapping};
pub use resolver::{RateResolver, Resolution, ResolveError};
pub use source::{FetchFailure, FetchOutcome, RateSource};
