//! Condition-based query planning and expression translation for
//! partitioned key-value stores.
//!
//! See [`query`] for the planner, translator and retrieval strategies and
//! [`store`] for the execution surface they drive.

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod error;
pub mod query;
pub mod store;

pub use error::{
    ConditionError, ConfigError, CursorError, QueryError, Result, StoreError, TranslationError,
};
