//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::path::PathBuf;

use crate::dates;

pub const DATA_ENV: &str = "CRUCIVERBA_DATA";
pub const OUTPUT_ENV: &str = "CRUCIVERBA_OUTPUT";
pub const PORT_ENV: &str = "CRUCIVERBA_PORT";
pub const TODAY_ENV: &str = "CRUCIVERBA_TODAY";

pub const DEFAULT_PORT: u16 = 8080;

/// Runtime settings. CLI flags override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// JSON record document
    pub data_path: PathBuf,
    /// Where `build` writes `index.html` and `calendar.json`
    pub output_dir: PathBuf,
    pub port: u16,
    /// Pinned "today"; the local date when unset
    pub today: Option<NaiveDate>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data.json"),
            output_dir: PathBuf::from("."),
            port: DEFAULT_PORT,
            today: None,
        }
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Reads `CRUCIVERBA_DATA`, `CRUCIVERBA_OUTPUT`, `CRUCIVERBA_PORT` and
    /// `CRUCIVERBA_TODAY`, either from the environment or from a `.env` file.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(path) = lookup(DATA_ENV) {
            settings.data_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup(OUTPUT_ENV) {
            settings.output_dir = PathBuf::from(dir);
        }
        if let Some(port) = lookup(PORT_ENV) {
            settings.port = port
                .trim()
                .parse()
                .with_context(|| format!("{PORT_ENV} is not a valid port: {port:?}"))?;
        }
        if let Some(today) = lookup(TODAY_ENV) {
            let date = dates::parse_date(&today)
                .with_context(|| format!("{TODAY_ENV} is not a valid date"))?;
            settings.today = Some(date);
        }

        Ok(settings)
    }

    /// The date aggregation runs against
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }
}
