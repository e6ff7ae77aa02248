use itemrepo_core::{field, DataStore, Direction, HasKey, MemoryBackend, Query, Value};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Reading {
    id: String,
    value: i64,
}

impl HasKey for Reading {
    type Key = String;

    fn key(&self) -> &String {
        &self.id
    }
}

fn reading(id: &str, value: i64) -> Reading {
    Reading {
        id: id.to_string(),
        value,
    }
}

fn store_with(values: &[i64]) -> DataStore<Reading> {
    let store = DataStore::new(MemoryBackend::new());
    for (n, value) in values.iter().enumerate() {
        store.store_item(&reading(&format!("r{n:03}"), *value)).unwrap();
    }
    store
}

fn values(items: &[Reading]) -> Vec<i64> {
    items.iter().map(|r| r.value).collect()
}

#[test]
fn filtered_ordered_pages_follow_the_reference_scenario() {
    let store = store_with(&[5, 20, 15, 30]);
    let query = store
        .query()
        .filter(field("value").gt(10))
        .order_by("value", Direction::Ascending);

    let first = query.get_page(1, 2).unwrap();
    assert_eq!(values(first.items()), vec![15, 20]);
    assert!(first.has_next_page());
    assert!(!first.has_previous_page());
    assert_eq!(first.total_count(), Some(3));
    assert_eq!(first.continuation_token(), None);

    let second = query
        .get_page_after(2, 2, first.continuation_token())
        .unwrap();
    assert_eq!(values(second.items()), vec![30]);
    assert!(!second.has_next_page());
    assert_eq!(second.first_index_on_page(), 2);
    assert_eq!(second.last_index_on_page(), Some(2));
}

#[test]
fn missing_keys_are_not_found_and_none_is_a_no_op() {
    let store = store_with(&[]);
    assert_eq!(store.get_item(&"missing-key".to_string()).unwrap(), None);

    store.store_item(None).unwrap();
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn upsert_is_idempotent_and_latest_value_wins() {
    let store = store_with(&[]);
    store.store_item(&reading("a", 1)).unwrap();
    store.store_item(&reading("a", 1)).unwrap();
    assert_eq!(store.count().unwrap(), 1);

    store.store_item(&reading("a", 9)).unwrap();
    assert_eq!(
        store.get_item(&"a".to_string()).unwrap(),
        Some(reading("a", 9))
    );
}

#[test]
fn bulk_operations_keep_request_order_and_skip_missing() {
    let store = store_with(&[]);
    let stored = store
        .store_items(&[reading("a", 1), reading("b", 2), reading("c", 3)])
        .unwrap();
    assert_eq!(stored, 3);

    let keys = ["c".to_string(), "zz".to_string(), String::new(), "a".to_string()];
    let found = store.get_items(&keys).unwrap();
    assert_eq!(values(&found), vec![3, 1]);

    assert_eq!(store.remove_items(&keys).unwrap(), 2);
    assert!(store.contains(&"b".to_string()).unwrap());
    assert_eq!(store.count().unwrap(), 1);
}

#[test]
fn terminal_operations_respect_the_window() {
    let store = store_with(&[4, 8, 15, 16, 23, 42]);
    let query = store.query().order_by("value", Direction::Descending);

    assert_eq!(query.count().unwrap(), 6);
    assert_eq!(query.skip(2).take(3).count().unwrap(), 3);
    assert_eq!(query.skip(5).take(3).count().unwrap(), 1);
    assert_eq!(query.first().unwrap().map(|r| r.value), Some(42));
    assert_eq!(query.max("value").unwrap(), Some(Value::Int(42)));
    assert_eq!(query.min("value").unwrap(), Some(Value::Int(4)));
    assert!(query.any().unwrap());
    assert!(!query.filter(field("value").gt(100)).any().unwrap());
}

#[test]
fn page_size_zero_and_negative_inputs_clamp() {
    let store = store_with(&[1, 2, 3]);
    let query = store.query();

    let empty = query.get_page(1, 0).unwrap();
    assert!(empty.is_empty());
    assert_eq!(empty.total_count(), Some(3));
    assert!(!empty.has_next_page());

    let clamped = query.get_page(-4, -1).unwrap();
    assert_eq!(clamped.page_number(), 1);
    assert_eq!(clamped.page_size(), 0);

    let beyond = query.get_page(10, 2).unwrap();
    assert!(beyond.is_empty());
    assert!(!beyond.has_next_page());
    assert_eq!(beyond.total_count(), Some(3));
}

#[test]
fn pages_iterator_walks_every_page_once() {
    let store = store_with(&[3, 1, 2, 5, 4]);
    let pages: Vec<_> = store
        .query()
        .order_by("value", Direction::Ascending)
        .pages(2)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(pages.len(), 3);
    let seen: Vec<i64> = pages.iter().flat_map(|page| values(page.items())).collect();
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert!(!pages[2].has_next_page());
}

fn query_over(values: &[i64]) -> Query<Reading> {
    store_with(values).query()
}

proptest! {
    #[test]
    fn direct_index_page_equals_skip_take(
        items in prop::collection::vec(-20_i64..20, 0..30),
        page_number in 1_i64..8,
        page_size in 1_i64..6,
        threshold in -20_i64..20,
    ) {
        let query = query_over(&items)
            .filter(field("value").ge(threshold))
            .order_by("value", Direction::Ascending)
            .then_by("id", Direction::Descending);

        let page = query.get_page(page_number, page_size).unwrap();
        let expected = query
            .skip((page_number - 1) * page_size)
            .take(page_size)
            .to_vec()
            .unwrap();
        prop_assert_eq!(page.items(), expected.as_slice());

        let total = query.count().unwrap();
        let is_last = (page_number * page_size) as u64 >= total;
        prop_assert_eq!(page.has_next_page(), !is_last);
    }
}
