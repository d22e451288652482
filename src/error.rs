//! Error types for the outdoor temperature importer.
//!
//! This module defines typed errors for the different stages of an import
//! run: configuration, reading temperatures from a weather site, and
//! saving them to the metering server.

use thiserror::Error;

/// Result type alias using our custom error types.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type that encompasses all application errors.
#[derive(Error, Debug)]
pub enum Error {
    /// Command line / environment configuration errors
    #[error("configuration error")]
    Config(#[from] ConfigError),

    /// Weather site communication and parsing errors
    #[error("import error")]
    Import(#[from] ImportError),

    /// Metering server errors
    #[error("server error")]
    Server(#[from] ServerError),

    /// Generic errors that don't fit other categories
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration-related errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable parsing failed
    #[error("failed to parse environment variables: {0}")]
    EnvParse(String),

    /// Neither a token nor a complete login/password pair was supplied
    #[error("either a token or a login/password pair must be supplied")]
    MissingCredentials,

    /// Both a token and a login/password pair were supplied
    #[error("supply either a token or a login/password pair, not both")]
    AmbiguousCredentials,

    /// The import start date could not be parsed
    #[error("invalid import start date '{text}': expected dd.MM.yyyy")]
    InvalidStartDate { text: String },
}

/// Errors raised while reading temperatures from a weather site.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The city could not be mapped to a source-specific location id
    #[error("failed to resolve city: {0}")]
    Resolution(String),

    /// An HTTP request failed or returned a non-success status
    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    /// Expected structure was absent from successfully fetched content
    #[error("page parsing error")]
    Parse(#[from] ParseError),
}

/// Page content parsing errors.
#[derive(Error, Debug)]
pub enum ParseError {
    /// An extraction pattern did not match the page content
    #[error("pattern not found: {context}")]
    PatternMiss { context: String },

    /// Failed to parse a numeric value
    #[error("failed to parse number from '{text}': {message}")]
    NumberParse { text: String, message: String },

    /// Content shape differs from what the site used to serve
    #[error("unexpected content structure: {0}")]
    UnexpectedStructure(String),
}

/// Metering server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// HTTP transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed (401)
    #[error("authentication failed: invalid credentials")]
    AuthFailed,

    /// Server returned an error status
    #[error("server error (status {status}) for {url}")]
    Status { url: String, status: u16 },

    /// The requested territory does not exist on the server
    #[error("territory '{0}' was not found on the server")]
    TerritoryNotFound(String),

    /// Response body did not match the expected shape
    #[error("unexpected server response: {0}")]
    UnexpectedResponse(String),
}

impl ConfigError {
    /// Creates a new environment parse error.
    pub fn env_parse(err: impl std::fmt::Display) -> Self {
        Self::EnvParse(err.to_string())
    }

    /// Creates an invalid start date error.
    pub fn invalid_start_date(text: impl Into<String>) -> Self {
        Self::InvalidStartDate { text: text.into() }
    }
}

impl ImportError {
    /// Creates a city resolution error.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution(message.into())
    }

    /// Creates a fetch error from a URL and an underlying cause.
    pub fn fetch(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

impl ParseError {
    /// Creates a pattern miss error.
    pub fn pattern_miss(context: impl Into<String>) -> Self {
        Self::PatternMiss {
            context: context.into(),
        }
    }

    /// Creates a number parse error.
    pub fn number_parse(text: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::NumberParse {
            text: text.into(),
            message: err.to_string(),
        }
    }
}

impl ServerError {
    /// Creates an error from a non-success HTTP status.
    pub fn status(url: impl Into<String>, status: reqwest::StatusCode) -> Self {
        if status.as_u16() == 401 {
            Self::AuthFailed
        } else {
            Self::Status {
                url: url.into(),
                status: status.as_u16(),
            }
        }
    }
}
