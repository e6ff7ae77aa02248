//! Store configuration.
//!
//! # Responsibility
//! - Hold paging, cache and logging knobs for a `DataStore`.
//! - Load them from JSON or `ITEMREPO_*` environment variables.
//!
//! # Invariants
//! - Missing settings fall back to defaults; present but unparsable settings
//!   are errors.
//! - A validated config has non-zero page and TTL bounds.

use crate::logging::{default_log_level, normalize_level};
use crate::query::engine::{PagingOptions, DEFAULT_MAX_PAGE_SIZE};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

pub const ENV_MAX_PAGE_SIZE: &str = "ITEMREPO_MAX_PAGE_SIZE";
pub const ENV_COUNT_ON_CURSOR_PAGES: &str = "ITEMREPO_COUNT_ON_CURSOR_PAGES";
pub const ENV_CACHE_TTL_SECS: &str = "ITEMREPO_CACHE_TTL_SECS";
pub const ENV_CACHE_CAPACITY: &str = "ITEMREPO_CACHE_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "ITEMREPO_LOG_LEVEL";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("invalid config document: {0}")]
    Parse(String),
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub max_page_size: u32,
    /// Count matches on cursor-only backends for every page.
    pub count_on_cursor_pages: bool,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub log_level: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            count_on_cursor_pages: false,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            log_level: default_log_level().to_string(),
        }
    }
}

impl StoreConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `ITEMREPO_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_page_size: parse_var(&lookup, ENV_MAX_PAGE_SIZE, defaults.max_page_size)?,
            count_on_cursor_pages: match lookup(ENV_COUNT_ON_CURSOR_PAGES) {
                Some(raw) => parse_flag(ENV_COUNT_ON_CURSOR_PAGES, &raw)?,
                None => defaults.count_on_cursor_pages,
            },
            cache_ttl_secs: parse_var(&lookup, ENV_CACHE_TTL_SECS, defaults.cache_ttl_secs)?,
            cache_capacity: parse_var(&lookup, ENV_CACHE_CAPACITY, defaults.cache_capacity)?,
            log_level: lookup(ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "max_page_size must be greater than 0".to_string(),
            ));
        }
        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        normalize_level(&self.log_level).map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(())
    }

    pub fn paging_options(&self) -> PagingOptions {
        PagingOptions {
            max_page_size: self.max_page_size,
            count_on_cursor_pages: self.count_on_cursor_pages,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_var<F, V>(lookup: &F, key: &'static str, default: V) -> Result<V, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    V: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.clone(),
        }),
        None => Ok(default),
    }
}

fn parse_flag(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        }),
    }
}
