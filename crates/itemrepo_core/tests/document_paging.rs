use itemrepo_core::{
    field, Backend, DataStore, Direction, DocumentCollection, HasKey, MemoryBackend, PageRequest,
    PagingTier, QueryError, StoreError,
};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    id: String,
    value: i64,
}

impl HasKey for Doc {
    type Key = String;

    fn key(&self) -> &String {
        &self.id
    }
}

fn docs(values: &[i64]) -> Vec<Doc> {
    values
        .iter()
        .enumerate()
        .map(|(n, value)| Doc {
            id: format!("d{n:03}"),
            value: *value,
        })
        .collect()
}

fn zero_to_nine() -> Vec<Doc> {
    docs(&(0..10).collect::<Vec<_>>())
}

fn store_over(collection: &Arc<DocumentCollection<Doc>>) -> DataStore<Doc> {
    let backend: Arc<dyn Backend<Doc>> = collection.clone();
    DataStore::from_shared(backend)
}

fn values(items: &[Doc]) -> Vec<i64> {
    items.iter().map(|d| d.value).collect()
}

#[test]
fn token_hand_off_follows_the_reference_scenario() {
    let collection = Arc::new(DocumentCollection::with_items(docs(&[5, 20, 15, 30])));
    let store = store_over(&collection);
    assert_eq!(store.capabilities().tier, PagingTier::CursorOnly);

    let query = store
        .query()
        .filter(field("value").gt(10))
        .order_by("value", Direction::Ascending);

    let first = query.get_page(1, 2).unwrap();
    assert_eq!(values(first.items()), vec![15, 20]);
    assert!(first.has_next_page());
    assert_eq!(first.total_count(), None);
    let token = first.continuation_token().unwrap().to_string();
    // One segment read plus the single-item lookahead.
    assert_eq!(collection.round_trips(), 2);

    let second = query.get_page_after(2, 2, Some(&token)).unwrap();
    assert_eq!(values(second.items()), vec![30]);
    assert!(!second.has_next_page());
    assert_eq!(second.continuation_token(), None);
    assert_eq!(collection.round_trips(), 3);
}

#[test]
fn jumping_without_a_token_catches_up_from_the_start() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let store = store_over(&collection);
    let query = store.query().order_by("value", Direction::Ascending);

    let third = query.get_page(3, 3).unwrap();
    assert_eq!(values(third.items()), vec![6, 7, 8]);
    assert!(third.has_next_page());
    // Two discarded rounds, one page read, one lookahead.
    assert_eq!(collection.round_trips(), 4);

    let fourth = query
        .get_page_after(4, 3, third.continuation_token())
        .unwrap();
    assert_eq!(values(fourth.items()), vec![9]);
    assert!(!fourth.has_next_page());
}

#[test]
fn stale_tokens_degrade_to_catch_up() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let store = store_over(&collection);
    let query = store.query().order_by("value", Direction::Ascending);
    let first = query.get_page(1, 3).unwrap();
    let token = first.continuation_token().unwrap();

    let skipped_ahead = query.get_page_after(3, 3, Some(token)).unwrap();
    assert_eq!(values(skipped_ahead.items()), vec![6, 7, 8]);

    let resized = query.get_page_after(2, 4, Some(token)).unwrap();
    assert_eq!(values(resized.items()), vec![4, 5, 6, 7]);
}

#[test]
fn tokens_from_another_chain_shape_are_rejected() {
    let collection = Arc::new(DocumentCollection::with_items(docs(&[1, 2, 3, 4])));
    let store = store_over(&collection);
    let ascending = store.query().order_by("value", Direction::Ascending);
    let descending = store.query().order_by("value", Direction::Descending);

    let first = ascending.get_page(1, 2).unwrap();
    let err = descending
        .get_page_after(2, 2, first.continuation_token())
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(QueryError::IncompatibleToken { .. })
    ));
}

#[test]
fn malformed_tokens_are_errors_not_empty_pages() {
    let collection = Arc::new(DocumentCollection::with_items(docs(&[1, 2, 3])));
    let store = store_over(&collection);
    let err = store
        .query()
        .get_page_after(2, 2, Some("%%% not a token %%%"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(QueryError::MalformedToken(_))
    ));
}

#[test]
fn residual_chains_still_reject_malformed_tokens() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let store = store_over(&collection);
    let residual = store
        .query()
        .order_by("value", Direction::Ascending)
        .take(4)
        .filter(field("value").ge(0));
    let err = residual
        .get_page_after(2, 2, Some("%%% garbage %%%"))
        .unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(QueryError::MalformedToken(_))
    ));
}

#[test]
fn direct_index_backends_reject_foreign_and_malformed_tokens() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let document_token = store_over(&collection)
        .query()
        .order_by("value", Direction::Ascending)
        .get_page(1, 2)
        .unwrap()
        .continuation_token()
        .unwrap()
        .to_string();

    let memory = DataStore::new(MemoryBackend::with_items(zero_to_nine()));
    let query = memory.query().order_by("value", Direction::Ascending);

    let err = query.get_page_after(2, 2, Some(&document_token)).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(QueryError::IncompatibleToken { .. })
    ));
    let err = query.get_page_after(2, 2, Some("%%% garbage %%%")).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Query(QueryError::MalformedToken(_))
    ));
    assert_eq!(values(query.get_page(2, 2).unwrap().items()), vec![2, 3]);
}

#[test]
fn stacked_huge_skips_saturate_instead_of_overflowing() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let store = store_over(&collection);

    let capped = store.query().skip(i64::MAX).skip(i64::MAX).take(5);
    let page = capped.get_page(1, 2).unwrap();
    assert!(page.is_empty());
    assert!(!page.has_next_page());

    let uncapped = store.query().skip(i64::MAX).skip(i64::MAX);
    let page = uncapped.get_page(3, 2).unwrap();
    assert!(page.is_empty());
    assert_eq!(page.continuation_token(), None);
}

#[test]
fn chain_window_caps_cursor_pages() {
    let collection = Arc::new(DocumentCollection::with_items(zero_to_nine()));
    let store = store_over(&collection);
    let pages: Vec<_> = store
        .query()
        .order_by("value", Direction::Ascending)
        .skip(2)
        .take(5)
        .pages(2)
        .collect::<Result<_, _>>()
        .unwrap();

    let seen: Vec<Vec<i64>> = pages.iter().map(|page| values(page.items())).collect();
    assert_eq!(seen, vec![vec![2, 3], vec![4, 5], vec![6]]);
    assert!(!pages[2].has_next_page());
    assert_eq!(pages[2].continuation_token(), None);
}

#[test]
fn totals_are_counted_on_request() {
    let collection = Arc::new(DocumentCollection::with_items(docs(&[1, 2, 3, 4, 5])));
    let store = store_over(&collection);
    let query = store.query().filter(field("value").ge(2));

    let page = query.page(&PageRequest::new(1, 2).with_total()).unwrap();
    assert_eq!(page.total_count(), Some(4));
    assert_eq!(page.page_count(), Some(2));
    assert!(page.has_next_page());
}

#[test]
fn beyond_the_end_is_an_empty_page() {
    let collection = Arc::new(DocumentCollection::with_items(docs(&[1, 2, 3])));
    let store = store_over(&collection);
    let page = store.query().get_page(5, 2).unwrap();
    assert!(page.is_empty());
    assert!(!page.has_next_page());
    assert_eq!(page.continuation_token(), None);
}

proptest! {
    #[test]
    fn sequential_hand_off_covers_every_match_once_in_order(
        items in prop::collection::vec(-10_i64..10, 0..40),
        page_size in 1_i64..7,
        max_batch in 1_usize..5,
        threshold in -10_i64..10,
    ) {
        let collection = Arc::new(
            DocumentCollection::with_items(docs(&items)).with_max_batch(max_batch),
        );
        let store = store_over(&collection);
        let pages: Vec<_> = store
            .query()
            .filter(field("value").ge(threshold))
            .order_by("value", Direction::Descending)
            .pages(page_size)
            .collect::<Result<_, _>>()
            .unwrap();

        let mut expected = docs(&items);
        expected.retain(|d| d.value >= threshold);
        expected.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.id.cmp(&b.id)));

        let seen: Vec<Doc> = pages.iter().flat_map(|page| page.items().to_vec()).collect();
        prop_assert_eq!(seen, expected.clone());

        let expected_pages = expected.len().div_ceil(page_size as usize).max(1);
        prop_assert_eq!(pages.len(), expected_pages);
        for (n, page) in pages.iter().enumerate() {
            let last = n + 1 == pages.len();
            prop_assert_eq!(page.has_next_page(), !last);
            prop_assert_eq!(page.continuation_token().is_some(), !last);
        }
    }
}
