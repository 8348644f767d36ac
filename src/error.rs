//! Error taxonomy shared by the planner, translator and retrieval strategies.

use std::path::PathBuf;

use thiserror::Error;

use crate::query::condition::Comparator;
use crate::store::{Item, PrimaryKey};

/// Raised when a condition carries the wrong number of operands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// Operand count does not match the comparator's arity.
    #[error("{comparator} expects {expected} value(s), got {found}")]
    Arity {
        /// Comparator being constructed.
        comparator: Comparator,
        /// Human-readable arity requirement.
        expected: &'static str,
        /// Number of values supplied.
        found: usize,
    },
    /// Attribute name was blank.
    #[error("condition attribute cannot be empty")]
    EmptyAttribute,
}

/// Raised when a condition cannot be rendered in the requested expression context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    /// Comparator is not allowed where it was used (e.g. `CONTAINS` on a range key).
    #[error("comparator {comparator} is not supported in {context} expressions")]
    UnsupportedComparator {
        /// Offending comparator.
        comparator: Comparator,
        /// Expression context name.
        context: &'static str,
    },
    /// Attribute path contains an empty segment (`a..b`, `.a`).
    #[error("attribute path '{attribute}' contains an empty segment")]
    EmptyAttributeSegment {
        /// Offending attribute path.
        attribute: String,
    },
}

/// Failure surfaced by the backing store. The core never interprets it.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The service rejected or failed the operation.
    #[error("{operation} failed: {message}")]
    Service {
        /// Store operation name (`Query`, `Scan`, `BatchGetItem`, ...).
        operation: &'static str,
        /// Message reported by the store client.
        message: String,
    },
    /// The store throttled the request.
    #[error("{operation} throttled: {message}")]
    Throttled {
        /// Store operation name.
        operation: &'static str,
        /// Message reported by the store client.
        message: String,
    },
    /// Referenced table, index or bucket does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local I/O failure while talking to the store.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Builds a [`StoreError::Service`] for the given operation.
    pub fn service(operation: &'static str, message: impl Into<String>) -> Self {
        StoreError::Service {
            operation,
            message: message.into(),
        }
    }
}

/// Raised when an opaque cursor string cannot be decoded.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Cursor was not valid URL-safe base64.
    #[error("cursor is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    /// Cursor payload was not a valid page key document.
    #[error("cursor payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
    /// Key value is NaN or infinite and would not decode back to itself.
    #[error("cursor key '{0}' holds a non-finite number")]
    NonFiniteNumber(String),
}

/// Crate-level error returned by retrieval strategies and batch retrieval.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Condition arity mismatch.
    #[error(transparent)]
    InvalidCondition(#[from] ConditionError),
    /// Comparator unsupported in the expression context.
    #[error(transparent)]
    Translation(#[from] TranslationError),
    /// Store execution failure, propagated untouched.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Opaque cursor could not be decoded.
    #[error(transparent)]
    Cursor(#[from] CursorError),
    /// Query parameters failed validation.
    #[error("invalid query parameters: {0}")]
    InvalidParams(&'static str),
    /// Batch retrieval finished with keys the store left unprocessed.
    #[error("batch get left {} key(s) unprocessed", .unprocessed.len())]
    PartialBatch {
        /// Items that were returned across all chunks, in chunk order.
        items: Vec<Item>,
        /// Keys the store reported as unprocessed.
        unprocessed: Vec<PrimaryKey>,
    },
}

/// Result type alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Errors raised while loading engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Config file was not valid TOML for [`crate::config::EngineConfig`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Path that failed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A setting is out of range.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Setting name.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
    },
}
