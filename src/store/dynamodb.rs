//! Blocking DynamoDB adapter.
//!
//! Owns a current-thread tokio runtime and blocks on each SDK call, so the
//! planner and strategies stay synchronous. SDK failures become
//! [`StoreError`]s; throttling and missing tables are told apart by error code.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, KeySchemaElement, KeyType, KeysAndAttributes};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use tokio::runtime::Runtime;

use crate::config::DynamoDbSection;
use crate::error::StoreError;
use crate::query::topology::{TableTopology, TopologyProvider};
use crate::query::value::Value;
use crate::store::{
    BatchGetRequest, BatchGetResponse, Item, Page, PrimaryKey, QueryRequest, ScanRequest,
    TableStore,
};

type SdkItem = HashMap<String, AttributeValue>;

/// DynamoDB-backed [`TableStore`] and [`TopologyProvider`].
pub struct DynamoDbStore {
    client: Client,
    runtime: Runtime,
}

impl std::fmt::Debug for DynamoDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbStore").finish_non_exhaustive()
    }
}

impl DynamoDbStore {
    /// Connects using the default credential chain plus the section overrides.
    pub fn connect(section: &DynamoDbSection) -> Result<Self, StoreError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let sdk_config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(region) = &section.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region.clone()));
        }
        if let Some(endpoint) = &section.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        if let Some(timeout_ms) = section.timeout_ms {
            builder = builder.timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_millis(timeout_ms))
                    .build(),
            );
        }
        Ok(Self {
            client: Client::from_conf(builder.build()),
            runtime,
        })
    }

    /// Wraps an existing client and runtime.
    pub fn from_client(client: Client, runtime: Runtime) -> Self {
        Self { client, runtime }
    }
}

fn store_error<E, R>(operation: &'static str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match err.code() {
        Some("ProvisionedThroughputExceededException")
        | Some("ThrottlingException")
        | Some("RequestLimitExceeded") => StoreError::Throttled { operation, message },
        Some("ResourceNotFoundException") => StoreError::NotFound(message),
        _ => StoreError::Service { operation, message },
    }
}

/// Converts a value into its DynamoDB wire form.
pub fn to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Int(i) => AttributeValue::N(i.to_string()),
        Value::Float(f) => AttributeValue::N(f.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Bytes(b) => AttributeValue::B(Blob::new(b.clone())),
        Value::List(values) => AttributeValue::L(values.iter().map(to_attribute).collect()),
        Value::Map(entries) => AttributeValue::M(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_attribute(v)))
                .collect(),
        ),
    }
}

/// Converts a DynamoDB attribute into a [`Value`]. Sets become lists.
pub fn from_attribute(attribute: &AttributeValue) -> Value {
    match attribute {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::B(b) => Value::Bytes(b.as_ref().to_vec()),
        AttributeValue::L(values) => Value::List(values.iter().map(from_attribute).collect()),
        AttributeValue::M(entries) => Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), from_attribute(v)))
                .collect(),
        ),
        AttributeValue::Ss(values) => Value::List(values.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(values) => Value::List(values.iter().map(|n| parse_number(n)).collect()),
        AttributeValue::Bs(values) => {
            Value::List(values.iter().map(|b| Value::Bytes(b.as_ref().to_vec())).collect())
        }
        _ => Value::Null,
    }
}

fn parse_number(n: &str) -> Value {
    n.parse::<i64>()
        .map(Value::Int)
        .or_else(|_| n.parse::<f64>().map(Value::Float))
        .unwrap_or_else(|_| Value::String(n.to_string()))
}

fn to_sdk_item(item: &BTreeMap<String, Value>) -> SdkItem {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute(v)))
        .collect()
}

fn from_sdk_item(item: &SdkItem) -> Item {
    item.iter()
        .map(|(k, v)| (k.clone(), from_attribute(v)))
        .collect()
}

fn sdk_values(values: &BTreeMap<String, Value>) -> Option<SdkItem> {
    (!values.is_empty()).then(|| to_sdk_item(values))
}

fn sdk_names(names: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    (!names.is_empty()).then(|| names.clone().into_iter().collect())
}

fn sdk_limit(limit: usize) -> i32 {
    i32::try_from(limit).unwrap_or(i32::MAX)
}

impl TableStore for DynamoDbStore {
    fn query(&self, request: &QueryRequest) -> Result<Page, StoreError> {
        let call = self
            .client
            .query()
            .table_name(&request.table)
            .set_index_name(request.index.clone())
            .key_condition_expression(&request.key_condition)
            .set_filter_expression(request.filter.clone())
            .set_expression_attribute_names(sdk_names(&request.names))
            .set_expression_attribute_values(sdk_values(&request.values))
            .scan_index_forward(request.scan_forward)
            .limit(sdk_limit(request.limit))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_sdk_item));
        let output = self
            .runtime
            .block_on(call.send())
            .map_err(|e| store_error("Query", e))?;
        Ok(Page {
            items: output.items().iter().map(from_sdk_item).collect(),
            last_evaluated_key: output.last_evaluated_key().map(from_sdk_item),
        })
    }

    fn scan(&self, request: &ScanRequest) -> Result<Page, StoreError> {
        let call = self
            .client
            .scan()
            .table_name(&request.table)
            .set_filter_expression(request.filter.clone())
            .set_expression_attribute_names(sdk_names(&request.names))
            .set_expression_attribute_values(sdk_values(&request.values))
            .limit(sdk_limit(request.limit))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(to_sdk_item));
        let output = self
            .runtime
            .block_on(call.send())
            .map_err(|e| store_error("Scan", e))?;
        Ok(Page {
            items: output.items().iter().map(from_sdk_item).collect(),
            last_evaluated_key: output.last_evaluated_key().map(from_sdk_item),
        })
    }

    fn batch_get(&self, request: &BatchGetRequest) -> Result<BatchGetResponse, StoreError> {
        let keys = KeysAndAttributes::builder()
            .set_keys(Some(request.keys.iter().map(to_sdk_item).collect()))
            .build()
            .map_err(|e| StoreError::service("BatchGetItem", e.to_string()))?;
        let call = self
            .client
            .batch_get_item()
            .request_items(&request.table, keys);
        let output = self
            .runtime
            .block_on(call.send())
            .map_err(|e| store_error("BatchGetItem", e))?;
        let items = output
            .responses()
            .and_then(|r| r.get(&request.table))
            .map(|items| items.iter().map(from_sdk_item).collect())
            .unwrap_or_default();
        let unprocessed_keys: Vec<PrimaryKey> = output
            .unprocessed_keys()
            .and_then(|u| u.get(&request.table))
            .map(|k| k.keys().iter().map(from_sdk_item).collect())
            .unwrap_or_default();
        Ok(BatchGetResponse {
            items,
            unprocessed_keys,
        })
    }
}

fn split_key_schema(schema: &[KeySchemaElement]) -> (Option<String>, Option<String>) {
    let mut partition = None;
    let mut sort = None;
    for element in schema {
        match element.key_type() {
            KeyType::Hash => partition = Some(element.attribute_name().to_string()),
            KeyType::Range => sort = Some(element.attribute_name().to_string()),
            _ => {}
        }
    }
    (partition, sort)
}

fn add_index(topology: TableTopology, name: Option<&str>, schema: &[KeySchemaElement]) -> TableTopology {
    match (name, split_key_schema(schema)) {
        (Some(name), (Some(partition), Some(sort))) => {
            topology.with_sorted_index(name, partition, sort)
        }
        (Some(name), (Some(partition), None)) => topology.with_index(name, partition),
        _ => topology,
    }
}

impl TopologyProvider for DynamoDbStore {
    fn describe_topology(&self, table: &str) -> Result<TableTopology, StoreError> {
        let output = self
            .runtime
            .block_on(self.client.describe_table().table_name(table).send())
            .map_err(|e| store_error("DescribeTable", e))?;
        let description = output
            .table()
            .ok_or_else(|| StoreError::NotFound(format!("table {table}")))?;
        let (partition, sort) = split_key_schema(description.key_schema());
        let partition = partition.ok_or_else(|| {
            StoreError::service("DescribeTable", format!("table {table} has no hash key"))
        })?;
        let mut topology = TableTopology::new(partition);
        if let Some(sort) = sort {
            topology = topology.with_sort_key(sort);
        }
        for index in description.global_secondary_indexes() {
            topology = add_index(topology, index.index_name(), index.key_schema());
        }
        for index in description.local_secondary_indexes() {
            topology = add_index(topology, index.index_name(), index.key_schema());
        }
        Ok(topology)
    }
}
