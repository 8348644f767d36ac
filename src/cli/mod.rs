#![forbid(unsafe_code)]

//! Support code for the `keyway` binary: textual conditions, keys and
//! fixture files.
//!
//! Conditions are written `ATTR OP [VALUE[,VALUE...]]`, for example
//! `race = hobbit`, `age between 30,60`, `origin.place exists` or
//! `race in elf,dwarf`. Values parse as `null`, booleans, integers, floats or
//! strings; wrap a value in double quotes to force a string.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::error::{ConditionError, ConfigError, QueryError};
use crate::query::condition::{Comparator, Condition};
use crate::query::topology::TableTopology;
use crate::query::value::Value;
use crate::store::memory::{MemoryBucket, MemoryTable};
use crate::store::{Item, PrimaryKey};

/// Errors surfaced by the CLI helpers.
#[derive(Debug, Error)]
pub enum CliError {
    /// Malformed command-line input.
    #[error("{0}")]
    Message(String),
    /// IO error from file operations.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON fixture or topology was malformed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// TOML topology was malformed.
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    /// Condition failed validation.
    #[error(transparent)]
    Condition(#[from] ConditionError),
    /// Retrieval failed.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<String> for CliError {
    fn from(value: String) -> Self {
        CliError::Message(value)
    }
}

fn comparator(op: &str) -> Option<Comparator> {
    Some(match op.to_ascii_lowercase().as_str() {
        "=" | "==" | "eq" => Comparator::Equals,
        "<>" | "!=" | "ne" => Comparator::NotEquals,
        "<" | "lt" => Comparator::LessThan,
        "<=" | "le" => Comparator::LessThanEquals,
        ">" | "gt" => Comparator::GreaterThan,
        ">=" | "ge" => Comparator::GreaterThanEquals,
        "between" => Comparator::Between,
        "contains" => Comparator::Contains,
        "not_contains" => Comparator::NotContains,
        "exists" => Comparator::Exists,
        "not_exists" => Comparator::NotExists,
        "in" => Comparator::In,
        "begins_with" | "starts_with" => Comparator::StartsWith,
        _ => return None,
    })
}

/// Parses a scalar literal.
pub fn parse_value(text: &str) -> Value {
    let text = text.trim();
    if let Some(quoted) = text
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        return Value::String(quoted.to_string());
    }
    match text {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => text
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| text.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::String(text.to_string())),
    }
}

/// Parses `ATTR OP [VALUES]`.
pub fn parse_condition(text: &str) -> Result<Condition, CliError> {
    let mut parts = text.trim().splitn(3, char::is_whitespace);
    let attribute = parts.next().filter(|a| !a.is_empty());
    let (Some(attribute), Some(op)) = (attribute, parts.next()) else {
        return Err(format!("condition '{text}' must look like 'ATTR OP [VALUES]'").into());
    };
    let comparator = comparator(op).ok_or_else(|| format!("unknown comparator '{op}'"))?;
    let values = match parts.next().map(str::trim).filter(|v| !v.is_empty()) {
        Some(rest) => rest.split(',').map(parse_value).collect(),
        None => Vec::new(),
    };
    Ok(Condition::new(attribute, comparator, values)?)
}

/// Parses `ATTR=VALUE[,ATTR=VALUE]` into a primary key.
pub fn parse_key(text: &str) -> Result<PrimaryKey, CliError> {
    text.split(',')
        .map(|pair| -> Result<(String, Value), CliError> {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("key component '{pair}' must look like ATTR=VALUE"))?;
            Ok((name.trim().to_string(), parse_value(value)))
        })
        .collect()
}

/// Loads a topology from a `.json` or TOML file.
pub fn load_topology(path: &Path) -> Result<TableTopology, CliError> {
    let contents = fs::read_to_string(path)?;
    if path.extension().is_some_and(|ext| ext == "json") {
        Ok(serde_json::from_str(&contents)?)
    } else {
        Ok(toml::from_str(&contents)?)
    }
}

/// Table contents and topology used to seed a [`MemoryTable`].
#[derive(Debug, Deserialize)]
pub struct Fixture {
    /// Table name.
    pub table: String,
    /// Key layout.
    pub topology: TableTopology,
    /// Plain JSON objects.
    #[serde(default)]
    pub items: Vec<serde_json::Value>,
}

impl Fixture {
    /// Reads a JSON fixture file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Seeds an in-memory table with the fixture items.
    pub fn into_table(self) -> Result<MemoryTable, CliError> {
        let mut table = MemoryTable::new(self.table, self.topology);
        for (idx, item) in self.items.into_iter().enumerate() {
            match Value::from(item) {
                Value::Map(fields) => table.put(fields),
                _ => return Err(format!("fixture item {idx} is not an object").into()),
            }
        }
        Ok(table)
    }
}

/// Bucket name and object listing used to seed a [`MemoryBucket`].
#[derive(Debug, Deserialize)]
pub struct BucketFixture {
    /// Bucket name.
    pub bucket: String,
    /// Objects as `{"key": .., "size": ..}` entries.
    #[serde(default)]
    pub objects: Vec<FixtureObject>,
}

/// One object of a [`BucketFixture`].
#[derive(Debug, Deserialize)]
pub struct FixtureObject {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl BucketFixture {
    /// Reads a JSON bucket fixture file.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Seeds an in-memory bucket with the fixture objects.
    pub fn into_bucket(self) -> MemoryBucket {
        self.objects
            .into_iter()
            .fold(MemoryBucket::new(self.bucket), |bucket, object| {
                bucket.with_object(object.key, object.size)
            })
    }
}

/// Plain JSON rendering of an item.
pub fn item_to_json(item: &Item) -> serde_json::Value {
    serde_json::Value::Object(
        item.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect(),
    )
}
