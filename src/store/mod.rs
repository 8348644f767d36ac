//! Store execution surface consumed by the retrieval strategies.
//!
//! The core builds request shapes (rendered expressions, placeholder maps,
//! direction, page bound, start key) and interprets page responses. Owning
//! the connection is the job of whatever implements these traits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::query::value::Value;

pub mod eval;
pub mod memory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
#[cfg(feature = "s3")]
pub mod s3;

/// A stored item: attribute name to value.
pub type Item = BTreeMap<String, Value>;

/// Primary key of an item: partition (and sort) attribute to value.
pub type PrimaryKey = BTreeMap<String, Value>;

/// Key-condition read against a table or one of its secondary indexes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRequest {
    /// Table name.
    pub table: String,
    /// Secondary index to read, `None` for the base table.
    pub index: Option<String>,
    /// Key-condition expression.
    pub key_condition: String,
    /// Filter expression applied after the key condition.
    pub filter: Option<String>,
    /// `#alias` to attribute segment.
    pub names: BTreeMap<String, String>,
    /// `:placeholder` to value.
    pub values: BTreeMap<String, Value>,
    /// Traverse the sort key ascending when `true`.
    pub scan_forward: bool,
    /// Maximum number of items to evaluate.
    pub limit: usize,
    /// Resume after this key.
    pub exclusive_start_key: Option<PrimaryKey>,
}

/// Full read of a table with an optional filter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanRequest {
    /// Table name.
    pub table: String,
    /// Filter expression.
    pub filter: Option<String>,
    /// `#alias` to attribute segment.
    pub names: BTreeMap<String, String>,
    /// `:placeholder` to value.
    pub values: BTreeMap<String, Value>,
    /// Maximum number of items to evaluate.
    pub limit: usize,
    /// Resume after this key.
    pub exclusive_start_key: Option<PrimaryKey>,
}

/// One page returned by a query or scan.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Page {
    /// Items that passed the filter, in store order.
    pub items: Vec<Item>,
    /// Key of the last evaluated item when the store stopped early.
    pub last_evaluated_key: Option<PrimaryKey>,
}

/// Point reads of up to one store batch of keys.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchGetRequest {
    /// Table name.
    pub table: String,
    /// Keys to fetch.
    pub keys: Vec<PrimaryKey>,
}

/// Items found by a batch read plus the keys the store did not get to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetResponse {
    /// Found items. Missing keys simply have no item.
    pub items: Vec<Item>,
    /// Keys left unprocessed, e.g. under throttling.
    pub unprocessed_keys: Vec<PrimaryKey>,
}

/// Execution surface of a partitioned key-value store.
pub trait TableStore {
    /// Runs a key-condition query.
    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError>;
    /// Runs a scan.
    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError>;
    /// Fetches a batch of items by primary key.
    fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, StoreError>;
}

impl<T: TableStore + ?Sized> TableStore for &T {
    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError> {
        (**self).query(request)
    }

    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError> {
        (**self).scan(request)
    }

    fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, StoreError> {
        (**self).batch_get(request)
    }
}

/// Prefix listing against an object store bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListRequest {
    /// Bucket name.
    pub bucket: String,
    /// Only keys starting with this prefix.
    pub prefix: Option<String>,
    /// Groups keys sharing a prefix up to this delimiter.
    pub delimiter: Option<String>,
    /// Maximum number of keys returned.
    pub max_keys: usize,
    /// Token handed back by the previous page.
    pub continuation_token: Option<String>,
}

/// Summary of one listed object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSummary {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Entity tag, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Last modification time as reported by the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// One page of a listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListPage {
    /// Objects on this page.
    pub objects: Vec<ObjectSummary>,
    /// Prefixes rolled up by the delimiter.
    pub common_prefixes: Vec<String>,
    /// Token to request the next page.
    pub next_continuation_token: Option<String>,
    /// Whether the store reported more keys.
    pub is_truncated: bool,
}

/// Execution surface of an object store listing.
pub trait ObjectLister {
    /// Lists one page of objects.
    fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError>;
}

impl<T: ObjectLister + ?Sized> ObjectLister for &T {
    fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        (**self).list(request)
    }
}
