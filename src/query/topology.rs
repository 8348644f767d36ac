//! Table key topology and its cached derivation from store metadata.
//!
//! The planner needs to know which attribute is the partition key, which one
//! orders items inside a partition, and which secondary indexes exist. A
//! [`TopologyProvider`] derives that from live store metadata; the call is
//! comparatively expensive, so [`TopologyCache`] memoizes it per table.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;

/// Key attributes of one secondary index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct IndexKeys {
    /// Partition attribute of the index.
    pub partition: String,
    /// Optional sort attribute of the index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

/// Primary and secondary key layout of a table.
///
/// Equality is structural: two topologies with identical key and index maps
/// are equal regardless of how they were obtained.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TableTopology {
    partition_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sort_key: Option<String>,
    #[serde(default)]
    indexes: BTreeMap<String, IndexKeys>,
}

impl TableTopology {
    /// Creates a topology with only a partition key.
    pub fn new(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: None,
            indexes: BTreeMap::new(),
        }
    }

    /// Sets the table sort key.
    pub fn with_sort_key(mut self, sort_key: impl Into<String>) -> Self {
        self.sort_key = Some(sort_key.into());
        self
    }

    /// Registers a secondary index with only a partition attribute.
    pub fn with_index(mut self, name: impl Into<String>, partition: impl Into<String>) -> Self {
        self.indexes.insert(
            name.into(),
            IndexKeys {
                partition: partition.into(),
                sort: None,
            },
        );
        self
    }

    /// Registers a secondary index with partition and sort attributes.
    pub fn with_sorted_index(
        mut self,
        name: impl Into<String>,
        partition: impl Into<String>,
        sort: impl Into<String>,
    ) -> Self {
        self.indexes.insert(
            name.into(),
            IndexKeys {
                partition: partition.into(),
                sort: Some(sort.into()),
            },
        );
        self
    }

    /// Partition key attribute of the table.
    pub fn partition_key(&self) -> &str {
        &self.partition_key
    }

    /// Sort key attribute of the table, if any.
    pub fn sort_key(&self) -> Option<&str> {
        self.sort_key.as_deref()
    }

    /// Secondary indexes by name.
    pub fn indexes(&self) -> &BTreeMap<String, IndexKeys> {
        &self.indexes
    }

    /// Key layout of the named index.
    pub fn index(&self, name: &str) -> Option<&IndexKeys> {
        self.indexes.get(name)
    }

    /// Indexes partitioned on `attribute`, ordered by index name.
    pub fn indexes_partitioned_on<'a>(
        &'a self,
        attribute: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a IndexKeys)> + 'a {
        self.indexes
            .iter()
            .filter(move |(_, keys)| keys.partition == attribute)
            .map(|(name, keys)| (name.as_str(), keys))
    }
}

/// Derives a table topology from store metadata.
pub trait TopologyProvider {
    /// Describes the key schema and secondary indexes of `table`.
    fn describe_topology(&self, table: &str) -> Result<TableTopology, StoreError>;
}

/// Default number of tables whose topology is retained.
pub const DEFAULT_TOPOLOGY_CACHE_CAPACITY: usize = 64;

/// LRU of table topologies shared by many query invocations.
pub struct TopologyCache {
    entries: Mutex<LruCache<String, Arc<TableTopology>>>,
}

impl TopologyCache {
    /// Creates a cache retaining up to `capacity` tables (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached topology for `table`, describing it on a miss.
    ///
    /// The provider is called without holding the cache lock, so two threads
    /// missing at once may both describe the table; the last insert wins.
    pub fn get_or_describe<P>(&self, provider: &P, table: &str) -> Result<Arc<TableTopology>, StoreError>
    where
        P: TopologyProvider + ?Sized,
    {
        if let Some(hit) = self.entries.lock().get(table) {
            return Ok(Arc::clone(hit));
        }
        debug!(table, "keyway.topology.cache_miss");
        let topology = Arc::new(provider.describe_topology(table)?);
        self.entries
            .lock()
            .put(table.to_string(), Arc::clone(&topology));
        Ok(topology)
    }

    /// Drops the cached entry for `table`, forcing the next lookup to describe it.
    pub fn invalidate(&self, table: &str) -> Option<Arc<TableTopology>> {
        self.entries.lock().pop(table)
    }

    /// Number of cached tables.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache holds no tables.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TopologyCache {
    fn default() -> Self {
        Self::new(DEFAULT_TOPOLOGY_CACHE_CAPACITY)
    }
}

impl std::fmt::Debug for TopologyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopologyCache")
            .field("len", &self.len())
            .finish()
    }
}
