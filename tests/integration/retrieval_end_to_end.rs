#![allow(missing_docs)]

use std::path::Path;

use keyway::cli::Fixture;
use keyway::query::{
    attribute, plan, AccessPath, QueryParams, RetrievalStrategy, SortOrder, TopologyCache, Value,
};
use keyway::store::memory::{MemoryTable, RecordedCall};
use keyway::store::Item;
use keyway::{QueryError, StoreError};

fn hobbits() -> MemoryTable {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/hobbits.json");
    Fixture::load(&path)
        .expect("fixture")
        .into_table()
        .expect("seed table")
}

fn strategy(table: &MemoryTable) -> RetrievalStrategy {
    RetrievalStrategy::from_provider(table, table.name()).expect("describe")
}

fn ids(items: &[Item]) -> Vec<&str> {
    items.iter().filter_map(|i| i["id"].as_str()).collect()
}

#[test]
fn race_equality_uses_age_index_without_filter() {
    let table = hobbits();
    let params = QueryParams::builder()
        .condition(attribute("race").equals_to("hobbit").unwrap())
        .build()
        .unwrap();

    let planned = plan(&params, table.topology());
    assert_eq!(planned.path.index_name(), Some("age-index"));
    assert!(planned.filters.is_empty());

    let result = strategy(&table).execute(&table, "people", &params).unwrap();
    assert_eq!(result.items().len(), 6);
    assert!(result
        .items()
        .iter()
        .all(|i| i["race"] == Value::from("hobbit")));
    // age-index orders by age.
    assert_eq!(
        ids(result.items()),
        ["pippin", "merry", "sam", "frodo", "frodo", "bilbo"]
    );
    assert!(!result.is_truncated());
    assert!(result.next_key().is_none());

    let calls = table.calls();
    let [RecordedCall::Query(request)] = calls.as_slice() else {
        panic!("expected a single query, got {calls:?}");
    };
    assert_eq!(request.index.as_deref(), Some("age-index"));
    assert!(request.filter.is_none());
}

#[test]
fn empty_params_scan_one_page_at_a_time() {
    let table = hobbits();
    let strategy = strategy(&table);
    let mut cursor = None;
    let mut seen = Vec::new();
    loop {
        let params = QueryParams::builder()
            .max_page_size(4)
            .maybe_cursor(cursor.take())
            .build()
            .unwrap();
        let page = strategy.execute(&table, "people", &params).unwrap();
        assert!(page.items().len() <= 4);
        assert_eq!(page.is_truncated(), page.items().len() == 4);
        seen.extend(page.items().iter().cloned());
        match page.next_key() {
            Some(next) => cursor = Some(next.clone()),
            None => break,
        }
    }
    assert_eq!(seen.len(), table.len());
    for call in table.calls() {
        let RecordedCall::Scan(request) = call else {
            panic!("expected only scans, got {call:?}");
        };
        assert!(request.filter.is_none());
        assert_eq!(request.limit, 4);
    }
}

#[test]
fn partition_key_query_pages_through_sort_key_descending() {
    let table = hobbits();
    let params = QueryParams::builder()
        .condition(attribute("id").equals_to("frodo").unwrap())
        .sort_order(SortOrder::Descending)
        .max_page_size(1)
        .build()
        .unwrap();
    let strategy = strategy(&table);
    let first = strategy.execute(&table, "people", &params).unwrap();
    assert_eq!(first.items()[0]["updateTime"], Value::Int(2));
    assert!(first.is_truncated());

    let params = QueryParams::builder()
        .condition(attribute("id").equals_to("frodo").unwrap())
        .sort_order(SortOrder::Descending)
        .max_page_size(1)
        .maybe_cursor(first.next_key().cloned())
        .build()
        .unwrap();
    let second = strategy.execute(&table, "people", &params).unwrap();
    assert_eq!(second.items()[0]["updateTime"], Value::Int(1));
}

#[test]
fn nested_filter_and_range_on_index() {
    let table = hobbits();
    let params = QueryParams::builder()
        .condition(attribute("origin.place").equals_to("Shire").unwrap())
        .condition(attribute("race").equals_to("hobbit").unwrap())
        .condition(attribute("age").between(30, 60).unwrap())
        .build()
        .unwrap();
    let planned = plan(&params, table.topology());
    let AccessPath::Indexed { index, range, .. } = &planned.path else {
        panic!("expected indexed path, got {:?}", planned.path);
    };
    assert_eq!(index, "age-index");
    assert_eq!(range.as_ref().map(|r| r.attribute()), Some("age"));
    assert_eq!(planned.filters.len(), 1);

    let result = strategy(&table).execute(&table, "people", &params).unwrap();
    assert_eq!(ids(result.items()), ["sam", "frodo", "frodo"]);
}

#[test]
fn name_index_and_scan_fallback_filters() {
    let table = hobbits();
    let by_name = QueryParams::builder()
        .condition(attribute("name").equals_to("Legolas").unwrap())
        .build()
        .unwrap();
    let result = strategy(&table).execute(&table, "people", &by_name).unwrap();
    assert_eq!(ids(result.items()), ["legolas"]);

    let no_origin = QueryParams::builder()
        .condition(attribute("origin").not_exists().unwrap())
        .condition(attribute("age").lt(100).unwrap())
        .build()
        .unwrap();
    let planned = plan(&no_origin, table.topology());
    assert_eq!(planned.path, AccessPath::Scan);
    assert_eq!(planned.filters.len(), 2);
    let result = strategy(&table).execute(&table, "people", &no_origin).unwrap();
    assert_eq!(ids(result.items()), ["aragorn"]);
}

#[test]
fn cached_topology_builds_equal_strategies() {
    let table = hobbits();
    let cache = TopologyCache::new(4);
    let a = RetrievalStrategy::from_cache(&cache, &table, "people").unwrap();
    let b = RetrievalStrategy::from_cache(&cache, &table, "people").unwrap();
    assert_eq!(a, b);
    assert_eq!(a, strategy(&table));
    assert_eq!(cache.len(), 1);
}

#[test]
fn store_failures_propagate_untouched() {
    let table = hobbits();
    let params = QueryParams::default();
    let err = strategy(&table)
        .execute(&table, "nobody", &params)
        .unwrap_err();
    assert!(matches!(err, QueryError::Store(StoreError::NotFound(_))));
    assert!(matches!(
        RetrievalStrategy::from_provider(&table, "nobody"),
        Err(StoreError::NotFound(_))
    ));
}
