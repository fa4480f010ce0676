use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::automod::{parse_filters, Filter};
use crate::constants::DEFAULT_PAGE_LIMIT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error(
        "no authentication data provided: set DISCUSSIONS_TOKEN (or DISCUSSIONS_USERNAME and DISCUSSIONS_PASSWORD)"
    )]
    MissingAuthentication,
    #[error("failed to read filters file {path}: {source}")]
    ReadFilters {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse filters file: {0}")]
    ParseFilters(#[from] toml::de::Error),
    #[error("filter '{filter}' is missing '{field}', required for action '{action}'")]
    MissingFilterField {
        filter: String,
        field: &'static str,
        action: String,
    },
    #[error("filter '{filter}' has an invalid rule {rule}: {message}")]
    InvalidRule {
        filter: String,
        rule: String,
        message: String,
    },
    #[error("filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },
}

/// Bot account authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    /// `access_token` cookie value.
    Token(String),
    /// Username and password. Login is currently disabled upstream, so the
    /// client refuses to start with only these.
    Credentials {
        username: Option<String>,
        password: Option<String>,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Wiki
    pub domain: String,
    pub base_url: String,
    pub authentication: Authentication,

    // Discussions API
    pub request_delay: Duration,
    pub http_timeout: Duration,

    // Filtering
    pub filters_path: PathBuf,
    pub filter_interval: Duration,
    pub page_limit: usize,
    pub default_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let domain = required_env("WIKI_DOMAIN")?;
        let base_url = optional_env("WIKI_BASE_URL")
            .unwrap_or_else(|| format!("https://{domain}.fandom.com"));

        Ok(Self {
            // Wiki
            base_url: base_url.trim_end_matches('/').to_string(),
            domain,
            authentication: authentication_from_env()?,

            // Discussions API
            request_delay: Duration::from_millis(parse_env_u64("REQUEST_DELAY_MS", 1000)?),
            http_timeout: Duration::from_secs(parse_env_u64("HTTP_TIMEOUT_SECS", 30)?),

            // Filtering
            filters_path: PathBuf::from(env_or_default("FILTERS_PATH", "./filters.toml")),
            filter_interval: Duration::from_millis(parse_env_u64("FILTER_INTERVAL_MS", 30_000)?),
            page_limit: parse_env_usize("POSTS_PAGE_LIMIT", DEFAULT_PAGE_LIMIT)?,
            default_webhook_url: optional_env("DEFAULT_WEBHOOK_URL"),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "WIKI_DOMAIN".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "WIKI_BASE_URL".to_string(),
                message: format!("'{}' is not a valid URL", self.base_url),
            });
        }
        if self.filter_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "FILTER_INTERVAL_MS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.page_limit == 0 || self.page_limit > 100 {
            return Err(ConfigError::InvalidValue {
                name: "POSTS_PAGE_LIMIT".to_string(),
                message: "must be between 1 and 100".to_string(),
            });
        }
        if let Some(webhook) = &self.default_webhook_url {
            if url::Url::parse(webhook).is_err() {
                return Err(ConfigError::InvalidValue {
                    name: "DEFAULT_WEBHOOK_URL".to_string(),
                    message: "is not a valid URL".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Read and parse the filters file named by `filters_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or any filter is invalid.
    pub fn load_filters(&self) -> Result<Vec<Filter>, ConfigError> {
        let raw = std::fs::read_to_string(&self.filters_path).map_err(|source| {
            ConfigError::ReadFilters {
                path: self.filters_path.clone(),
                source,
            }
        })?;
        parse_filters(&raw)
    }

    /// Configuration pointing at a local test server, with no request spacing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            domain: "test".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            authentication: Authentication::Token("test-token".to_string()),
            request_delay: Duration::ZERO,
            http_timeout: Duration::from_secs(5),
            filters_path: PathBuf::from("./filters.toml"),
            filter_interval: Duration::from_millis(100),
            page_limit: DEFAULT_PAGE_LIMIT,
            default_webhook_url: None,
        }
    }
}

fn authentication_from_env() -> Result<Authentication, ConfigError> {
    if let Some(token) = optional_env("DISCUSSIONS_TOKEN") {
        return Ok(Authentication::Token(token));
    }
    let username = optional_env("DISCUSSIONS_USERNAME");
    let password = optional_env("DISCUSSIONS_PASSWORD");
    if username.is_none() && password.is_none() {
        return Err(ConfigError::MissingAuthentication);
    }
    Ok(Authentication::Credentials { username, password })
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
