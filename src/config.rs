//! Import options and ambient application configuration.
//!
//! The import itself is driven by command line options; the logging
//! level comes from the environment (`LOG_LEVEL`).

use chrono::{Duration, NaiveDate};
use clap::Parser;
use serde_derive::Deserialize;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::sources::ImportSource;

const START_DATE_FORMAT: &str = "%d.%m.%Y";

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl AppConfig {
    pub fn log_level(&self) -> tracing::Level {
        tracing::Level::from_str(self.log_level.as_str()).unwrap_or(tracing::Level::INFO)
    }
}

pub(crate) fn load_app_config() -> Result<AppConfig, ConfigError> {
    envy::from_env::<AppConfig>().map_err(ConfigError::env_parse)
}

/// Command line options of one import run.
#[derive(Parser, Debug)]
#[command(
    name = "outdoor-temp-importer",
    about = "Imports daily-average outdoor temperatures from a weather site \
             into a metering server's territory registry."
)]
pub struct ImportOptions {
    /// City to import temperatures for
    #[arg(long = "incity")]
    pub source_city: String,

    /// Base URL of the destination metering server
    #[arg(long)]
    pub server: String,

    /// Server login (requires --password)
    #[arg(long)]
    pub login: Option<String>,

    /// Server password (requires --login)
    #[arg(long)]
    pub password: Option<String>,

    /// Bearer token, as an alternative to login/password
    #[arg(long)]
    pub token: Option<String>,

    /// Destination territory name; the server's default territory when empty
    #[arg(long = "dest-territory", default_value = "")]
    pub destination_territory: String,

    /// First day of the import window, dd.MM.yyyy; derived from
    /// --import-days when omitted
    #[arg(long = "import-start")]
    pub import_start_date: Option<String>,

    /// Number of days before today to start the import at
    #[arg(long = "import-days", default_value_t = 1)]
    pub import_days: i64,

    /// Only write dates that are absent from the registry; existing
    /// values are never overwritten
    #[arg(long = "missing-only")]
    pub missing_only: bool,

    /// Weather site to import temperatures from
    #[arg(long, value_enum, default_value = "meteoinfo")]
    pub source: ImportSource,
}

/// How the run authenticates against the metering server.
#[derive(Debug, PartialEq, Eq)]
pub enum AuthMode {
    Token(String),
    Credentials { login: String, password: String },
}

impl ImportOptions {
    /// Picks the authentication mode; exactly one of token or a full
    /// login/password pair must be present.
    pub fn auth_mode(&self) -> Result<AuthMode, ConfigError> {
        let credentials = match (&self.login, &self.password) {
            (Some(login), Some(password)) => Some(AuthMode::Credentials {
                login: login.clone(),
                password: password.clone(),
            }),
            _ => None,
        };

        match (&self.token, credentials) {
            (Some(_), Some(_)) => Err(ConfigError::AmbiguousCredentials),
            (Some(token), None) => Ok(AuthMode::Token(token.clone())),
            (None, Some(credentials)) => Ok(credentials),
            (None, None) => Err(ConfigError::MissingCredentials),
        }
    }

    /// Computes the import window `[start, today)`.
    ///
    /// The start is the explicit `--import-start` date when given,
    /// otherwise `today - import_days`.
    pub fn import_window(&self, today: NaiveDate) -> Result<(NaiveDate, NaiveDate), ConfigError> {
        let start = match &self.import_start_date {
            Some(text) => NaiveDate::parse_from_str(text, START_DATE_FORMAT)
                .map_err(|_| ConfigError::invalid_start_date(text))?,
            None => today - Duration::days(self.import_days),
        };
        Ok((start, today))
    }
}
