//! Retrieval strategies: turn a plan into store requests and a [`QueryResult`].
//!
//! Strategies hold no per-call state. Pagination is driven by the caller
//! feeding `next_key` back through [`QueryParams`].

use std::sync::Arc;

use tracing::debug;

use crate::error::{QueryError, Result, StoreError, TranslationError};
use crate::query::cursor::PageKey;
use crate::query::expression::{ExpressionBuilder, ExpressionContext, Expressions};
use crate::query::params::QueryParams;
use crate::query::planner::{self, AccessPath, Plan};
use crate::query::result::QueryResult;
use crate::query::topology::{TableTopology, TopologyCache, TopologyProvider};
use crate::store::{Item, PrimaryKey, QueryRequest, ScanRequest, TableStore};

/// How a request is turned into store calls.
///
/// Strategies compare structurally: two `Query` strategies built from equal
/// topologies are equal even when the topologies live in different `Arc`s.
#[derive(Clone, Debug, PartialEq)]
pub enum RetrievalStrategy {
    /// Always scan, filtering on every condition.
    Scan,
    /// Plan against the topology; scan when no key applies.
    Query(Arc<TableTopology>),
    /// Plan against the topology; run `fallback` when no key applies.
    Composed {
        /// Topology used for planning.
        topology: Arc<TableTopology>,
        /// Strategy used for scan-selected requests.
        fallback: Box<RetrievalStrategy>,
    },
}

impl RetrievalStrategy {
    /// Query strategy over `topology` with the scan fallback.
    pub fn query(topology: impl Into<Arc<TableTopology>>) -> Self {
        RetrievalStrategy::Query(topology.into())
    }

    /// Query strategy over `topology` with a caller-supplied fallback.
    pub fn composed(topology: impl Into<Arc<TableTopology>>, fallback: RetrievalStrategy) -> Self {
        RetrievalStrategy::Composed {
            topology: topology.into(),
            fallback: Box::new(fallback),
        }
    }

    /// Query strategy whose topology is described by `provider`.
    ///
    /// Describing is a metadata round trip; prefer [`Self::from_cache`] when
    /// many strategies are built for the same table.
    pub fn from_provider<P>(provider: &P, table: &str) -> std::result::Result<Self, StoreError>
    where
        P: TopologyProvider + ?Sized,
    {
        Ok(Self::query(provider.describe_topology(table)?))
    }

    /// Query strategy whose topology comes from `cache`, described on a miss.
    pub fn from_cache<P>(
        cache: &TopologyCache,
        provider: &P,
        table: &str,
    ) -> std::result::Result<Self, StoreError>
    where
        P: TopologyProvider + ?Sized,
    {
        Ok(RetrievalStrategy::Query(cache.get_or_describe(provider, table)?))
    }

    /// Topology used for planning, absent for [`RetrievalStrategy::Scan`].
    pub fn topology(&self) -> Option<&TableTopology> {
        match self {
            RetrievalStrategy::Scan => None,
            RetrievalStrategy::Query(topology) | RetrievalStrategy::Composed { topology, .. } => {
                Some(topology)
            }
        }
    }

    /// Plan this strategy would run for `params`. Scan strategies always scan.
    pub fn plan(&self, params: &QueryParams) -> Plan {
        match self.topology() {
            Some(topology) => planner::plan(params, topology),
            None => Plan {
                path: AccessPath::Scan,
                filters: params.conditions().to_vec(),
            },
        }
    }

    /// Retrieves one page of `table` matching `params`.
    pub fn execute<S>(&self, store: &S, table: &str, params: &QueryParams) -> Result<QueryResult<Item>>
    where
        S: TableStore + ?Sized,
    {
        match self {
            RetrievalStrategy::Scan => scan(store, table, params),
            RetrievalStrategy::Query(topology) => {
                query(store, table, params, topology, &RetrievalStrategy::Scan)
            }
            RetrievalStrategy::Composed { topology, fallback } => {
                query(store, table, params, topology, fallback)
            }
        }
    }
}

fn start_key(params: &QueryParams) -> Result<Option<PrimaryKey>> {
    match params.cursor() {
        None => Ok(None),
        Some(PageKey::Keys(keys)) => Ok(Some(keys.clone())),
        Some(PageKey::Token(_)) => Err(QueryError::InvalidParams(
            "continuation tokens are only valid for listings",
        )),
    }
}

/// Renders the key-condition and filter expressions for `plan`.
///
/// Ordinals follow the partition condition, then the range condition, then
/// the filters in insertion order.
pub fn render(plan: &Plan) -> std::result::Result<Expressions, TranslationError> {
    let mut builder = ExpressionBuilder::new();
    if let Some((partition, range)) = plan.path.key_conditions() {
        builder.key(partition, ExpressionContext::PartitionKey)?;
        if let Some(range) = range {
            builder.key(range, ExpressionContext::RangeKey)?;
        }
    }
    builder.filters(&plan.filters)?;
    Ok(builder.finish())
}

fn scan<S>(store: &S, table: &str, params: &QueryParams) -> Result<QueryResult<Item>>
where
    S: TableStore + ?Sized,
{
    let plan = Plan {
        path: AccessPath::Scan,
        filters: params.conditions().to_vec(),
    };
    let Expressions {
        filter,
        placeholders,
        ..
    } = render(&plan)?;
    debug!(
        table,
        path = "Scan",
        filters = plan.filters.len(),
        "keyway.strategy.path_selected"
    );
    let request = ScanRequest {
        table: table.to_string(),
        filter,
        names: placeholders.names,
        values: placeholders.values,
        limit: params.max_page_size(),
        exclusive_start_key: start_key(params)?,
    };
    let page = store.scan(&request)?;
    Ok(QueryResult::from_page(
        page.items,
        page.last_evaluated_key.map(PageKey::Keys),
        params.max_page_size(),
    ))
}

fn query<S>(
    store: &S,
    table: &str,
    params: &QueryParams,
    topology: &TableTopology,
    fallback: &RetrievalStrategy,
) -> Result<QueryResult<Item>>
where
    S: TableStore + ?Sized,
{
    let plan = planner::plan(params, topology);
    let Some((_, range)) = plan.path.key_conditions() else {
        return fallback.execute(store, table, params);
    };
    debug!(
        table,
        path = plan.path.name(),
        index = plan.path.index_name(),
        ranged = range.is_some(),
        filters = plan.filters.len(),
        "keyway.strategy.path_selected"
    );

    let Expressions {
        key_condition,
        filter,
        placeholders,
    } = render(&plan)?;

    let request = QueryRequest {
        table: table.to_string(),
        index: plan.path.index_name().map(str::to_string),
        key_condition: key_condition.unwrap_or_default(),
        filter,
        names: placeholders.names,
        values: placeholders.values,
        scan_forward: params.sort_order().is_forward(),
        limit: params.max_page_size(),
        exclusive_start_key: start_key(params)?,
    };
    let page = store.query(&request)?;
    Ok(QueryResult::from_page(
        page.items,
        page.last_evaluated_key.map(PageKey::Keys),
        params.max_page_size(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::{attribute, Comparator};
    use crate::query::params::SortOrder;
    use crate::query::value::Value;
    use crate::store::memory::{MemoryTable, RecordedCall};

    fn topology() -> TableTopology {
        TableTopology::new("id")
            .with_sort_key("updateTime")
            .with_sorted_index("age-index", "race", "age")
    }

    fn person(id: &str, time: i64, race: &str, age: i64) -> Item {
        Item::from([
            ("id".to_string(), Value::from(id)),
            ("updateTime".to_string(), Value::Int(time)),
            ("race".to_string(), Value::from(race)),
            ("age".to_string(), Value::Int(age)),
        ])
    }

    fn store() -> MemoryTable {
        MemoryTable::new("people", topology()).with_items([
            person("frodo", 1, "hobbit", 50),
            person("frodo", 2, "hobbit", 51),
            person("sam", 1, "hobbit", 38),
            person("legolas", 1, "elf", 2931),
        ])
    }

    #[test]
    fn strategies_from_equal_topologies_are_equal() {
        let a = RetrievalStrategy::query(topology());
        let b = RetrievalStrategy::from_provider(&store(), "people").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, RetrievalStrategy::Scan);
        assert_ne!(a, RetrievalStrategy::query(TableTopology::new("id")));
    }

    #[test]
    fn direct_key_query_honours_sort_order() {
        let store = store();
        let params = QueryParams::builder()
            .condition(attribute("id").equals_to("frodo").unwrap())
            .sort_order(SortOrder::Descending)
            .build()
            .unwrap();
        let result = RetrievalStrategy::query(topology())
            .execute(&store, "people", &params)
            .unwrap();
        let times: Vec<_> = result
            .items()
            .iter()
            .map(|i| i["updateTime"].clone())
            .collect();
        assert_eq!(times, [Value::Int(2), Value::Int(1)]);
        let calls = store.calls();
        let [RecordedCall::Query(request)] = calls.as_slice() else {
            panic!("expected one query, got {calls:?}");
        };
        assert!(!request.scan_forward);
        assert_eq!(request.index, None);
        assert!(request.filter.is_none());
    }

    #[test]
    fn indexed_query_pairs_range_and_filters_the_rest() {
        let store = store();
        let params = QueryParams::builder()
            .condition(attribute("race").equals_to("hobbit").unwrap())
            .condition(attribute("age").lt(50).unwrap())
            .condition(attribute("id").starts_with("s").unwrap())
            .build()
            .unwrap();
        let result = RetrievalStrategy::query(topology())
            .execute(&store, "people", &params)
            .unwrap();
        assert_eq!(result.items().len(), 1);
        assert_eq!(result.items()[0]["id"], Value::from("sam"));
        let calls = store.calls();
        let [RecordedCall::Query(request)] = calls.as_slice() else {
            panic!("expected one query, got {calls:?}");
        };
        assert_eq!(request.index.as_deref(), Some("age-index"));
        assert_eq!(request.key_condition, "#n1_0 = :v1_0 AND #n2_0 < :v2_0");
        assert_eq!(request.filter.as_deref(), Some("begins_with(#n3_0, :v3_0)"));
    }

    #[test]
    fn unsupported_range_comparator_fails_translation() {
        let params = QueryParams::builder()
            .condition(attribute("id").equals_to("frodo").unwrap())
            .condition(attribute("updateTime").contains(1).unwrap())
            .build()
            .unwrap();
        let err = RetrievalStrategy::query(topology())
            .execute(&store(), "people", &params)
            .unwrap_err();
        assert!(matches!(
            err,
            QueryError::Translation(TranslationError::UnsupportedComparator {
                comparator: Comparator::Contains,
                ..
            })
        ));
    }

    #[test]
    fn scan_fallback_applies_cursor_and_page_size() {
        let store = store();
        let strategy = RetrievalStrategy::query(topology());
        let params = QueryParams::builder().max_page_size(3).build().unwrap();
        let first = strategy.execute(&store, "people", &params).unwrap();
        assert_eq!(first.items().len(), 3);
        assert!(first.is_truncated());
        let next = first.next_key().cloned().unwrap();
        let params = QueryParams::builder()
            .max_page_size(3)
            .cursor(next)
            .build()
            .unwrap();
        let second = strategy.execute(&store, "people", &params).unwrap();
        assert_eq!(second.items().len(), 1);
        assert!(!second.is_truncated());
        assert!(second.next_key().is_none());
        assert!(store
            .calls()
            .iter()
            .all(|c| matches!(c, RecordedCall::Scan(_))));
    }

    #[test]
    fn composed_strategy_uses_its_fallback() {
        let store = store();
        let fallback_topology = TableTopology::new("race");
        let strategy = RetrievalStrategy::composed(
            TableTopology::new("id"),
            RetrievalStrategy::query(fallback_topology),
        );
        let params = QueryParams::builder()
            .condition(attribute("race").equals_to("elf").unwrap())
            .build()
            .unwrap();
        let result = strategy.execute(&store, "people", &params);
        // The fallback queries by `race` on the base table, which the store rejects.
        assert!(matches!(result, Err(QueryError::Store(_))));
        assert!(matches!(store.calls().as_slice(), [RecordedCall::Query(_)]));
    }

    #[test]
    fn token_cursor_is_rejected_for_tables() {
        let params = QueryParams::builder()
            .cursor(PageKey::token("abc"))
            .build()
            .unwrap();
        let err = RetrievalStrategy::Scan
            .execute(&store(), "people", &params)
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidParams(_)));
    }
}
