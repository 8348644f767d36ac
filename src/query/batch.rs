//! Batch key retrieval.
//!
//! Keys are split into chunks bounded by the store's batch limit and fetched
//! one chunk per call, in order. Items are concatenated in call order; within
//! a chunk the store decides the order.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QueryError, Result};
use crate::store::{BatchGetRequest, Item, PrimaryKey, TableStore};

/// Store limit on keys per batch-get call.
pub const DEFAULT_BATCH_LIMIT: usize = 100;

/// What to do with keys a batch response reports as unprocessed.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnprocessedKeyPolicy {
    /// Finish every chunk, then fail with [`QueryError::PartialBatch`]
    /// carrying the items that were returned and the unprocessed keys.
    #[default]
    Fail,
    /// Drop unprocessed keys from the result, logging each occurrence.
    Drop,
}

/// Fetches items of one table by primary key.
#[derive(Clone, Debug)]
pub struct BatchGetter {
    table: String,
    batch_limit: usize,
    policy: UnprocessedKeyPolicy,
}

impl BatchGetter {
    /// Creates a getter with the default batch limit and [`UnprocessedKeyPolicy::Fail`].
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            policy: UnprocessedKeyPolicy::default(),
        }
    }

    /// Sets the chunk size, clamped to `1..=DEFAULT_BATCH_LIMIT`.
    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit.clamp(1, DEFAULT_BATCH_LIMIT);
        self
    }

    /// Sets the unprocessed-key policy.
    pub fn with_policy(mut self, policy: UnprocessedKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Effective chunk size.
    pub fn batch_limit(&self) -> usize {
        self.batch_limit
    }

    /// Fetches `keys`, one store call per chunk.
    ///
    /// Keys with no stored item contribute nothing. Store failures abort
    /// immediately and are returned untouched.
    pub fn get<S>(&self, store: &S, keys: &[PrimaryKey]) -> Result<Vec<Item>>
    where
        S: TableStore + ?Sized,
    {
        let mut items = Vec::with_capacity(keys.len());
        let mut unprocessed = Vec::new();
        for (chunk_idx, chunk) in keys.chunks(self.batch_limit).enumerate() {
            debug!(
                table = %self.table,
                chunk = chunk_idx,
                keys = chunk.len(),
                "keyway.batch.chunk"
            );
            let response = store.batch_get(&BatchGetRequest {
                table: self.table.clone(),
                keys: chunk.to_vec(),
            })?;
            items.extend(response.items);
            if response.unprocessed_keys.is_empty() {
                continue;
            }
            match self.policy {
                UnprocessedKeyPolicy::Drop => warn!(
                    table = %self.table,
                    chunk = chunk_idx,
                    dropped = response.unprocessed_keys.len(),
                    "keyway.batch.unprocessed_keys"
                ),
                UnprocessedKeyPolicy::Fail => unprocessed.extend(response.unprocessed_keys),
            }
        }
        if !unprocessed.is_empty() {
            return Err(QueryError::PartialBatch { items, unprocessed });
        }
        Ok(items)
    }
}
