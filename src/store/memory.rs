//! In-memory table and bucket that execute rendered expressions.
//!
//! `MemoryTable` behaves like a single partitioned table: queries must pin the
//! partition attribute of the table or index with an equality, items are
//! returned in sort-key order, `limit` bounds the number of *evaluated*
//! items before the filter runs, and `last_evaluated_key` is reported when
//! evaluation stopped early. Every request is recorded so tests can inspect
//! what the strategies sent.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;

use crate::error::StoreError;
use crate::query::topology::{TableTopology, TopologyProvider};
use crate::query::value::Value;
use crate::store::eval::Expression;
use crate::store::{
    BatchGetRequest, BatchGetResponse, Item, ListPage, ListRequest, ObjectLister, ObjectSummary,
    Page, PrimaryKey, QueryRequest, ScanRequest, TableStore,
};

/// Batch-get key limit enforced by the store.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Request observed by a [`MemoryTable`].
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedCall {
    /// A key-condition query.
    Query(QueryRequest),
    /// A scan.
    Scan(ScanRequest),
    /// A batch get with this many keys.
    BatchGet(usize),
}

/// In-memory partitioned table.
#[derive(Debug)]
pub struct MemoryTable {
    name: String,
    topology: TableTopology,
    items: Vec<Item>,
    unprocessed: BTreeSet<String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MemoryTable {
    /// Creates an empty table.
    pub fn new(name: impl Into<String>, topology: TableTopology) -> Self {
        Self {
            name: name.into(),
            topology,
            items: Vec::new(),
            unprocessed: BTreeSet::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Adds items, replacing any existing item with the same primary key.
    pub fn with_items<I>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = Item>,
    {
        for item in items {
            self.put(item);
        }
        self
    }

    /// Inserts or replaces an item.
    pub fn put(&mut self, item: Item) {
        let key = self.primary_key(&item);
        match self.items.iter().position(|i| self.primary_key(i) == key) {
            Some(pos) => self.items[pos] = item,
            None => self.items.push(item),
        }
    }

    /// Makes batch gets report `key` as unprocessed, as a throttled store would.
    pub fn with_unprocessed_key(mut self, key: PrimaryKey) -> Self {
        self.unprocessed.insert(key_fingerprint(&key));
        self
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table topology.
    pub fn topology(&self) -> &TableTopology {
        &self.topology
    }

    /// Number of stored items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Key sizes of every batch get received so far.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                RecordedCall::BatchGet(n) => Some(*n),
                _ => None,
            })
            .collect()
    }

    /// Primary key attributes of `item`.
    pub fn primary_key(&self, item: &Item) -> PrimaryKey {
        let mut attrs = vec![self.topology.partition_key()];
        attrs.extend(self.topology.sort_key());
        project(item, attrs)
    }

    fn check_table(&self, table: &str) -> Result<(), StoreError> {
        if table == self.name {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("table {table}")))
        }
    }

    fn paginate(
        &self,
        operation: &'static str,
        candidates: Vec<&Item>,
        exclusive_start_key: Option<&PrimaryKey>,
        limit: usize,
        filter: Option<&Expression>,
        index_keys: &[&str],
    ) -> Result<Page, StoreError> {
        if limit == 0 {
            return Err(StoreError::service(operation, "limit must be greater than 0"));
        }
        let start = match exclusive_start_key {
            Some(key) => candidates
                .iter()
                .position(|i| &project(i, key.keys().map(String::as_str)) == key)
                .map(|p| p + 1)
                .ok_or_else(|| {
                    StoreError::service(operation, "exclusive start key does not match any item")
                })?,
            None => 0,
        };
        let remaining = &candidates[start.min(candidates.len())..];
        let evaluated = &remaining[..limit.min(remaining.len())];
        let items = evaluated
            .iter()
            .filter(|item| filter.map_or(true, |f| f.matches(item)))
            .map(|item| (*item).clone())
            .collect();
        let last_evaluated_key = match evaluated.last() {
            Some(last) if remaining.len() > evaluated.len() => {
                let mut key = self.primary_key(last);
                key.extend(project(last, index_keys.iter().copied()));
                Some(key)
            }
            _ => None,
        };
        Ok(Page {
            items,
            last_evaluated_key,
        })
    }
}

fn project<'a, I>(item: &Item, attrs: I) -> PrimaryKey
where
    I: IntoIterator<Item = &'a str>,
{
    attrs
        .into_iter()
        .filter_map(|a| item.get(a).map(|v| (a.to_string(), v.clone())))
        .collect()
}

fn key_fingerprint(key: &PrimaryKey) -> String {
    key.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn sort_value_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.compare(b).unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl TableStore for MemoryTable {
    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError> {
        self.calls.lock().push(RecordedCall::Query(request.clone()));
        self.check_table(&request.table)?;
        let (partition, sort) = match &request.index {
            Some(index) => {
                let keys = self
                    .topology
                    .index(index)
                    .ok_or_else(|| StoreError::NotFound(format!("index {index}")))?;
                (keys.partition.as_str(), keys.sort.as_deref())
            }
            None => (self.topology.partition_key(), self.topology.sort_key()),
        };
        let parse = |text: &str| {
            Expression::parse(text, &request.names, &request.values)
                .map_err(|e| StoreError::service("Query", e.to_string()))
        };
        let key_condition = parse(&request.key_condition)?;
        if !key_condition.has_equality_on(partition) {
            return Err(StoreError::service(
                "Query",
                format!("key condition must test partition attribute {partition} for equality"),
            ));
        }
        let filter = request.filter.as_deref().map(parse).transpose()?;

        let mut candidates: Vec<&Item> = self
            .items
            .iter()
            .filter(|item| key_condition.matches(item))
            .collect();
        if let Some(sort) = sort {
            candidates.sort_by(|a, b| sort_value_order(a.get(sort), b.get(sort)));
        }
        if !request.scan_forward {
            candidates.reverse();
        }
        let mut index_keys = vec![partition];
        index_keys.extend(sort);
        self.paginate(
            "Query",
            candidates,
            request.exclusive_start_key.as_ref(),
            request.limit,
            filter.as_ref(),
            &index_keys,
        )
    }

    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError> {
        self.calls.lock().push(RecordedCall::Scan(request.clone()));
        self.check_table(&request.table)?;
        let filter = request
            .filter
            .as_deref()
            .map(|text| {
                Expression::parse(text, &request.names, &request.values)
                    .map_err(|e| StoreError::service("Scan", e.to_string()))
            })
            .transpose()?;
        self.paginate(
            "Scan",
            self.items.iter().collect(),
            request.exclusive_start_key.as_ref(),
            request.limit,
            filter.as_ref(),
            &[],
        )
    }

    fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, StoreError> {
        self.calls
            .lock()
            .push(RecordedCall::BatchGet(request.keys.len()));
        self.check_table(&request.table)?;
        if request.keys.is_empty() || request.keys.len() > MAX_BATCH_GET_KEYS {
            return Err(StoreError::service(
                "BatchGetItem",
                format!("batch must hold 1..={MAX_BATCH_GET_KEYS} keys"),
            ));
        }
        let mut response = BatchGetResponse::default();
        for key in &request.keys {
            if self.unprocessed.contains(&key_fingerprint(key)) {
                response.unprocessed_keys.push(key.clone());
                continue;
            }
            if let Some(item) = self.items.iter().find(|i| &self.primary_key(i) == key) {
                response.items.push(item.clone());
            }
        }
        Ok(response)
    }
}

impl TopologyProvider for MemoryTable {
    fn describe_topology(&self, table: &str) -> Result<TableTopology, StoreError> {
        self.check_table(table)?;
        Ok(self.topology.clone())
    }
}

/// In-memory bucket answering prefix listings.
#[derive(Clone, Debug, Default)]
pub struct MemoryBucket {
    name: String,
    objects: Vec<ObjectSummary>,
}

impl MemoryBucket {
    /// Creates an empty bucket.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
        }
    }

    /// Adds an object of `size` bytes under `key`.
    pub fn with_object(mut self, key: impl Into<String>, size: u64) -> Self {
        let key = key.into();
        self.objects.retain(|o| o.key != key);
        self.objects.push(ObjectSummary {
            key,
            size,
            etag: None,
            last_modified: None,
        });
        self.objects.sort_by(|a, b| a.key.cmp(&b.key));
        self
    }
}

fn decode_position(token: &str) -> Result<usize, StoreError> {
    STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StoreError::service("ListObjectsV2", "invalid continuation token"))
}

impl ObjectLister for MemoryBucket {
    fn list(&self, request: &ListRequest) -> Result<ListPage, StoreError> {
        if request.bucket != self.name {
            return Err(StoreError::NotFound(format!("bucket {}", request.bucket)));
        }
        let mut pos = match &request.continuation_token {
            Some(token) => decode_position(token)?,
            None => 0,
        };
        let prefix = request.prefix.as_deref().unwrap_or("");
        let mut page = ListPage::default();
        let mut emitted = 0;
        while pos < self.objects.len() {
            let object = &self.objects[pos];
            let Some(rest) = object.key.strip_prefix(prefix) else {
                pos += 1;
                continue;
            };
            if emitted == request.max_keys {
                page.is_truncated = true;
                page.next_continuation_token = Some(STANDARD.encode(pos.to_string()));
                break;
            }
            let rolled = request
                .delimiter
                .as_deref()
                .filter(|d| !d.is_empty())
                .and_then(|d| rest.find(d).map(|at| &object.key[..prefix.len() + at + d.len()]));
            match rolled {
                Some(common) => {
                    page.common_prefixes.push(common.to_string());
                    while pos < self.objects.len() && self.objects[pos].key.starts_with(common) {
                        pos += 1;
                    }
                }
                None => {
                    page.objects.push(object.clone());
                    pos += 1;
                }
            }
            emitted += 1;
        }
        Ok(page)
    }
}
