use crate::core::resolver::DEFAULT_LOOKBACK_MONTHS;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_CBR_BASE_URL: &str = "https://www.cbr-xml-daily.ru";
const DEFAULT_TODAY_TTL_SECS: u64 = 3600;
/// Upper bound for `rates.lookback_months`.
pub const MAX_LOOKBACK_MONTHS: u32 = 120;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CbrProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub cbr: Option<CbrProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            cbr: Some(CbrProviderConfig {
                base_url: DEFAULT_CBR_BASE_URL.to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RatesConfig {
    /// How far back the date search may go before giving up.
    #[serde(default = "default_lookback_months")]
    pub lookback_months: u32,
    /// How long today's rates stay cached. Archived dates never expire.
    #[serde(default = "default_today_ttl_secs")]
    pub today_ttl_secs: u64,
}

fn default_lookback_months() -> u32 {
    DEFAULT_LOOKBACK_MONTHS
}

fn default_today_ttl_secs() -> u64 {
    DEFAULT_TODAY_TTL_SECS
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            lookback_months: DEFAULT_LOOKBACK_MONTHS,
            today_ttl_secs: DEFAULT_TODAY_TTL_SECS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    pub data_path: Option<String>,
}

impl AppConfig {
    /// Loads the config from the default location, falling back to defaults
    /// when no file has been created yet.
    pub fn load_or_default() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!("No config at {}, using defaults", config_path.display());
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "mconv", "mconv")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("org", "mconv", "mconv")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn cbr_base_url(&self) -> &str {
        self.providers
            .cbr
            .as_ref()
            .map_or(DEFAULT_CBR_BASE_URL, |p| &p.base_url)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rates.lookback_months > MAX_LOOKBACK_MONTHS {
            anyhow::bail!(
                "rates.lookback_months is {}, the maximum is {}",
                self.rates.lookback_months,
                MAX_LOOKBACK_MONTHS
            );
        }
        Ok(())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
