//! Engine configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields a usable
//! configuration. Store timeouts and endpoints are only passed through to the
//! adapters.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::query::batch::{BatchGetter, UnprocessedKeyPolicy, DEFAULT_BATCH_LIMIT};
use crate::query::listing::ListingStrategy;
use crate::query::params::DEFAULT_MAX_PAGE_SIZE;
use crate::query::topology::{TopologyCache, DEFAULT_TOPOLOGY_CACHE_CAPACITY};

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Page size used when a request does not set one.
    pub default_page_size: usize,
    /// Keys per batch-get call.
    pub batch_limit: usize,
    /// Handling of unprocessed batch-get keys.
    pub unprocessed_keys: UnprocessedKeyPolicy,
    /// Tables whose topology is cached.
    pub topology_cache_capacity: usize,
    /// DynamoDB connection settings.
    pub dynamodb: Option<DynamoDbSection>,
    /// Object store listing settings.
    pub listing: Option<ListingSection>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_MAX_PAGE_SIZE,
            batch_limit: DEFAULT_BATCH_LIMIT,
            unprocessed_keys: UnprocessedKeyPolicy::default(),
            topology_cache_capacity: DEFAULT_TOPOLOGY_CACHE_CAPACITY,
            dynamodb: None,
            listing: None,
        }
    }
}

/// `[dynamodb]` table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DynamoDbSection {
    /// Table queried by default.
    pub table: Option<String>,
    /// AWS region override.
    pub region: Option<String>,
    /// Endpoint override, e.g. a local test instance.
    pub endpoint: Option<String>,
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: Option<u64>,
}

/// `[listing]` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListingSection {
    /// Bucket to list.
    pub bucket: String,
    /// Condition attribute whose value becomes the key prefix.
    pub prefix_field: Option<String>,
    /// Key delimiter.
    pub delimiter: Option<String>,
}

impl EngineConfig {
    /// Reads and validates the config at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `explicit`, else the default config file when it exists, else defaults.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "default_page_size",
                reason: "must be greater than 0",
            });
        }
        if !(1..=DEFAULT_BATCH_LIMIT).contains(&self.batch_limit) {
            return Err(ConfigError::Invalid {
                field: "batch_limit",
                reason: "must be between 1 and 100",
            });
        }
        if self.topology_cache_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "topology_cache_capacity",
                reason: "must be greater than 0",
            });
        }
        if self.listing.as_ref().is_some_and(|l| l.bucket.is_empty()) {
            return Err(ConfigError::Invalid {
                field: "listing.bucket",
                reason: "must not be empty",
            });
        }
        Ok(())
    }

    /// Batch getter for `table` honouring the batch settings.
    pub fn batch_getter(&self, table: impl Into<String>) -> BatchGetter {
        BatchGetter::new(table)
            .with_batch_limit(self.batch_limit)
            .with_policy(self.unprocessed_keys)
    }

    /// Topology cache sized by the config.
    pub fn topology_cache(&self) -> TopologyCache {
        TopologyCache::new(self.topology_cache_capacity)
    }

    /// Listing strategy from the `[listing]` table, if present.
    pub fn listing_strategy(&self) -> Option<ListingStrategy> {
        self.listing.as_ref().map(|section| {
            let mut strategy = ListingStrategy::new(section.bucket.clone());
            if let Some(field) = &section.prefix_field {
                strategy = strategy.with_prefix_field(field.clone());
            }
            if let Some(delimiter) = &section.delimiter {
                strategy = strategy.with_delimiter(delimiter.clone());
            }
            strategy
        })
    }
}

/// Platform config file location (`<config dir>/keyway/config.toml`).
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("keyway").join("config.toml"))
}
