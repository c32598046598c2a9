pub mod caching;
pub mod cbr;
pub mod util;

pub use caching::CachingRateSource;
pub use cbr::CbrRateSource;
