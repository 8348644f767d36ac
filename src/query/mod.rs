#![forbid(unsafe_code)]

//! Condition-based access-path planning and expression translation.
//!
//! A request is a conjunction of [`Condition`]s plus paging options
//! ([`QueryParams`]). The planner picks a direct-key, indexed or scan access
//! path against a [`TableTopology`], the translator renders placeholder-based
//! expressions, and a [`RetrievalStrategy`] runs the resulting store request
//! and assembles a [`QueryResult`].

/// Attribute values shared by conditions, items and cursors.
pub mod value;

/// Predicates and their fluent builder.
pub mod condition;

/// Request parameters and their builder.
pub mod params;

/// Pagination cursors.
pub mod cursor;

/// Result pages.
pub mod result;

/// Table key layout, its provider trait and cache.
pub mod topology;

/// Access path selection and plan explain output.
///
/// Chooses between direct-key, indexed and scan reads and splits off the
/// post-retrieval filter conditions.
pub mod planner;

/// Rendering conditions into key-condition and filter expressions.
pub mod expression;

/// Retrieval strategies executing plans against a table store.
pub mod strategy;

/// Chunked retrieval by primary key.
pub mod batch;

/// Prefix listings of object stores.
pub mod listing;

pub use batch::{BatchGetter, UnprocessedKeyPolicy};
pub use condition::{attribute, Comparator, Condition, Operands};
pub use cursor::PageKey;
pub use expression::{ExpressionBuilder, ExpressionContext, Expressions, Placeholders};
pub use listing::ListingStrategy;
pub use params::{QueryParams, QueryParamsBuilder, SortOrder};
pub use planner::{plan, select, AccessPath, Plan, PlanExplain};
pub use result::QueryResult;
pub use strategy::RetrievalStrategy;
pub use topology::{IndexKeys, TableTopology, TopologyCache, TopologyProvider};
pub use value::Value;
