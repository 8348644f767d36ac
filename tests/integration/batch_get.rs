#![allow(missing_docs)]

use keyway::query::{BatchGetter, TableTopology, UnprocessedKeyPolicy, Value};
use keyway::store::memory::MemoryTable;
use keyway::store::{Item, PrimaryKey};
use keyway::{QueryError, StoreError};

fn key(n: i64) -> PrimaryKey {
    PrimaryKey::from([("id".to_string(), Value::Int(n))])
}

fn numbered(count: i64) -> MemoryTable {
    MemoryTable::new("numbers", TableTopology::new("id")).with_items((0..count).map(|n| {
        Item::from([
            ("id".to_string(), Value::Int(n)),
            ("square".to_string(), Value::Int(n * n)),
        ])
    }))
}

#[test]
fn large_requests_are_chunked_at_the_store_limit() {
    let table = numbered(250);
    let keys: Vec<_> = (0..250).map(key).collect();

    let items = BatchGetter::new("numbers").get(&table, &keys).unwrap();

    assert_eq!(table.batch_sizes(), [100, 100, 50]);
    assert_eq!(items.len(), 250);
    let ids: Vec<_> = items.iter().filter_map(|i| i["id"].as_int()).collect();
    assert_eq!(ids, (0..250).collect::<Vec<_>>());
}

#[test]
fn smaller_batch_limit_and_missing_keys() {
    let table = numbered(10);
    let keys: Vec<_> = (5..15).map(key).collect();

    let items = BatchGetter::new("numbers")
        .with_batch_limit(4)
        .get(&table, &keys)
        .unwrap();

    assert_eq!(table.batch_sizes(), [4, 4, 2]);
    assert_eq!(items.len(), 5);
    assert_eq!(items[0]["square"], Value::Int(25));
}

#[test]
fn unprocessed_keys_fail_after_every_chunk_by_default() {
    let table = numbered(150)
        .with_unprocessed_key(key(3))
        .with_unprocessed_key(key(120));
    let keys: Vec<_> = (0..150).map(key).collect();

    let err = BatchGetter::new("numbers").get(&table, &keys).unwrap_err();
    let QueryError::PartialBatch { items, unprocessed } = err else {
        panic!("expected partial batch, got {err:?}");
    };
    assert_eq!(table.batch_sizes(), [100, 50]);
    assert_eq!(items.len(), 148);
    assert_eq!(unprocessed, [key(3), key(120)]);
}

#[test]
fn drop_policy_returns_what_was_read() {
    let table = numbered(20).with_unprocessed_key(key(7));
    let keys: Vec<_> = (0..20).map(key).collect();

    let items = BatchGetter::new("numbers")
        .with_policy(UnprocessedKeyPolicy::Drop)
        .get(&table, &keys)
        .unwrap();

    assert_eq!(items.len(), 19);
    assert!(items.iter().all(|i| i["id"] != Value::Int(7)));
}

#[test]
fn store_errors_stop_at_the_first_chunk() {
    let table = numbered(5);
    let keys: Vec<_> = (0..150).map(key).collect();

    let err = BatchGetter::new("elsewhere").get(&table, &keys).unwrap_err();

    assert!(matches!(err, QueryError::Store(StoreError::NotFound(_))));
    assert_eq!(table.batch_sizes(), [100]);
}

#[test]
fn empty_key_list_makes_no_calls() {
    let table = numbered(5);
    let items = BatchGetter::new("numbers").get(&table, &[]).unwrap();
    assert!(items.is_empty());
    assert!(table.calls().is_empty());
}
