use crate::error::{EtlError, Result};
use crate::types::Dataset;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::debug;

const CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Rows requested per page ($limit); offsets advance by exactly this.
    pub page_limit: u64,
    /// Flat sleep between successive page requests to the same source.
    pub delay_ms: u64,
    pub output_dir: String,
    pub sources: Sources,
}

/// Base endpoint URLs, one per dataset; ".json?$limit=..&$offset=.." is
/// appended by the fetcher.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Sources {
    pub crashes: String,
    pub vehicles: String,
    pub persons: String,
}

impl Default for Sources {
    fn default() -> Self {
        Self {
            crashes: "https://data.cityofnewyork.us/resource/h9gi-nx95".to_string(),
            vehicles: "https://data.cityofnewyork.us/resource/bm4k-52h4".to_string(),
            persons: "https://data.cityofnewyork.us/resource/f55k-p6yu".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_limit: 1000,
            delay_ms: 500,
            output_dir: "data".to_string(),
            sources: Sources::default(),
        }
    }
}

impl Config {
    /// Load config.toml from the working directory, falling back to defaults
    /// when it is absent.
    pub fn load() -> Result<Self> {
        let path = Path::new(CONFIG_PATH);
        if !path.exists() {
            debug!("No {} found, using defaults", CONFIG_PATH);
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            EtlError::Config(format!("Failed to read config file '{}': {}", CONFIG_PATH, e))
        })?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn source_url(&self, dataset: Dataset) -> &str {
        match dataset {
            Dataset::Crash => &self.sources.crashes,
            Dataset::Vehicle => &self.sources.vehicles,
            Dataset::Person => &self.sources.persons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults_per_field() {
        let config: Config = toml::from_str("page_limit = 50").unwrap();
        assert_eq!(config.page_limit, 50);
        assert_eq!(config.delay_ms, 500);
        assert!(config.source_url(Dataset::Crash).contains("h9gi-nx95"));
        assert!(config.source_url(Dataset::Person).contains("f55k-p6yu"));
    }
}
