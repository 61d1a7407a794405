use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

const fn default_max_pages() -> usize {
    100
}

/// Site structure a retailer's flyer listing follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingFormat {
    /// Retailer's own flyer overview with viewer pages embedding every page image.
    Lidl,
    /// Aggregator archive where every flyer page is a separate `seite-N` document.
    Angebote,
}

impl std::fmt::Display for ListingFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListingFormat::Lidl => write!(f, "lidl"),
            ListingFormat::Angebote => write!(f, "angebote"),
        }
    }
}

/// Immutable description of where and how to discover a retailer's flyers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetailerSource {
    pub key: String,
    pub name: String,
    pub listing_url: String,
    pub format: ListingFormat,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

#[derive(Debug, Deserialize)]
struct RetailersFile {
    retailers: Vec<RetailerSource>,
}

/// Validated, read-only set of configured retailers.
#[derive(Debug, Clone, Default)]
pub struct RetailerRegistry {
    sources: Vec<RetailerSource>,
}

impl RetailerRegistry {
    /// Build a registry from already-parsed sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any entry is malformed or duplicated.
    pub fn from_sources(sources: Vec<RetailerSource>) -> Result<Self, ConfigError> {
        validate_sources(&sources)?;
        Ok(Self { sources })
    }

    /// Look up a retailer by key. Matching is case-insensitive.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&RetailerSource> {
        let key = key.trim();
        self.sources
            .iter()
            .find(|source| source.key.eq_ignore_ascii_case(key))
    }

    #[must_use]
    pub fn sources(&self) -> &[RetailerSource] {
        &self.sources
    }

    #[must_use]
    pub fn keys(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.key.as_str()).collect()
    }
}

/// Load and validate the retailer registry from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_retailers(path: &Path) -> Result<RetailerRegistry, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::RetailersFileIo {
        path: path.display().to_string(),
        source: e,
    })?;

    let file: RetailersFile =
        serde_yaml::from_str(&content).map_err(ConfigError::RetailersFileParse)?;

    RetailerRegistry::from_sources(file.retailers)
}

fn validate_sources(sources: &[RetailerSource]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::Validation(
            "at least one retailer must be configured".to_string(),
        ));
    }

    let mut seen_keys = HashSet::new();

    for source in sources {
        let key = source.key.trim();
        if key.is_empty() {
            return Err(ConfigError::Validation(
                "retailer key must be non-empty".to_string(),
            ));
        }

        if !key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ConfigError::Validation(format!(
                "retailer key '{key}' must be a lowercase slug"
            )));
        }

        if !seen_keys.insert(key.to_string()) {
            return Err(ConfigError::Validation(format!(
                "duplicate retailer key: '{key}'"
            )));
        }

        let url = source.listing_url.trim();
        let has_host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
        if !has_host {
            return Err(ConfigError::Validation(format!(
                "retailer '{key}' has invalid listing_url '{url}'; must be an absolute http(s) URL"
            )));
        }

        if source.max_pages == 0 {
            return Err(ConfigError::Validation(format!(
                "retailer '{key}' has max_pages 0; must be at least 1"
            )));
        }
    }

    Ok(())
}
