#![allow(missing_docs)]

use keyway::query::{attribute, ListingStrategy, PageKey, QueryParams};
use keyway::store::memory::MemoryBucket;
use keyway::{QueryError, StoreError};

fn photos() -> MemoryBucket {
    MemoryBucket::new("media")
        .with_object("docs/readme.md", 120)
        .with_object("photos/2023/beach.jpg", 2_048)
        .with_object("photos/2023/hike.jpg", 4_096)
        .with_object("photos/2024/city.jpg", 1_024)
        .with_object("photos/cover.jpg", 512)
        .with_object("photos/index.html", 64)
}

#[test]
fn prefix_listing_pages_with_continuation_tokens() {
    let bucket = photos();
    let strategy = ListingStrategy::new("media").with_prefix_field("key");
    let mut cursor = None;
    let mut keys = Vec::new();
    let mut pages = 0;
    loop {
        let params = QueryParams::builder()
            .condition(attribute("key").starts_with("photos/").unwrap())
            .max_page_size(2)
            .maybe_cursor(cursor.take())
            .build()
            .unwrap();
        let page = strategy.execute(&bucket, &params).unwrap();
        pages += 1;
        keys.extend(page.items().iter().map(|o| o.key.clone()));
        match page.next_key() {
            Some(next) => {
                assert!(page.is_truncated());
                assert!(next.as_token().is_some());
                cursor = Some(next.clone());
            }
            None => {
                assert!(!page.is_truncated());
                break;
            }
        }
    }
    assert_eq!(pages, 3);
    assert_eq!(
        keys,
        [
            "photos/2023/beach.jpg",
            "photos/2023/hike.jpg",
            "photos/2024/city.jpg",
            "photos/cover.jpg",
            "photos/index.html",
        ]
    );
}

#[test]
fn truncation_follows_the_store_flag() {
    let bucket = photos();
    let strategy = ListingStrategy::new("media");
    let params = QueryParams::builder().max_page_size(6).build().unwrap();
    let page = strategy.execute(&bucket, &params).unwrap();
    // A full page is not truncated when nothing follows it.
    assert_eq!(page.items().len(), 6);
    assert!(!page.is_truncated());
    assert!(page.next_key().is_none());
}

#[test]
fn other_conditions_do_not_narrow_the_listing() {
    let bucket = photos();
    let strategy = ListingStrategy::new("media").with_prefix_field("key");
    let params = QueryParams::builder()
        .condition(attribute("size").gt(1_000).unwrap())
        .build()
        .unwrap();
    let page = strategy.execute(&bucket, &params).unwrap();
    assert_eq!(page.items().len(), 6);
}

#[test]
fn delimiter_rolls_up_but_objects_are_returned() {
    let bucket = photos();
    let strategy = ListingStrategy::new("media")
        .with_prefix_field("key")
        .with_delimiter("/");
    let params = QueryParams::builder()
        .condition(attribute("key").starts_with("photos/").unwrap())
        .build()
        .unwrap();
    let page = strategy.execute(&bucket, &params).unwrap();
    let keys: Vec<_> = page.items().iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, ["photos/cover.jpg", "photos/index.html"]);
}

#[test]
fn encoded_cursor_survives_a_round_trip_through_text() {
    let bucket = photos();
    let strategy = ListingStrategy::new("media");
    let first = strategy
        .execute(&bucket, &QueryParams::builder().max_page_size(4).build().unwrap())
        .unwrap();
    let encoded = first.next_key().unwrap().encode().unwrap();

    let params = QueryParams::builder()
        .max_page_size(4)
        .cursor(PageKey::decode(&encoded).unwrap())
        .build()
        .unwrap();
    let second = strategy.execute(&bucket, &params).unwrap();
    assert_eq!(second.items().len(), 2);
    assert_eq!(second.items()[0].key, "photos/cover.jpg");
}

#[test]
fn missing_bucket_and_foreign_cursor_fail() {
    let bucket = photos();
    let err = ListingStrategy::new("nope")
        .execute(&bucket, &QueryParams::default())
        .unwrap_err();
    assert!(matches!(err, QueryError::Store(StoreError::NotFound(_))));

    let params = QueryParams::builder()
        .cursor(PageKey::from_keys([("id", "frodo")]))
        .build()
        .unwrap();
    let err = ListingStrategy::new("media")
        .execute(&bucket, &params)
        .unwrap_err();
    assert!(matches!(err, QueryError::InvalidParams(_)));
}
