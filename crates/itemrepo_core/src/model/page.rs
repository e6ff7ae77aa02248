//! Page result value objects.
//!
//! # Responsibility
//! - Describe one bounded slice of a logical result set plus its metadata.
//! - Own the stable serialized page shape shared with callers.
//!
//! # Invariants
//! - `page_number >= 1` and `items.len() <= page_size`, on construction and
//!   on deserialization.
//! - Values are immutable once built.
//! - Serialized shape is `{"PageNumber","PageSize","TotalCount","List"}`;
//!   cursor pages add `"ContinuationToken"`.

use crate::error::QueryError;
use serde::{Deserialize, Serialize, Serializer};
use std::ops::Deref;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "PageWire<T>")]
pub struct PageResult<T> {
    items: Vec<T>,
    page_number: u32,
    page_size: u32,
    total_count: Option<u64>,
    next_hint: Option<bool>,
}

#[derive(Serialize)]
struct PageWireRef<'a, T> {
    #[serde(rename = "PageNumber")]
    page_number: u32,
    #[serde(rename = "PageSize")]
    page_size: u32,
    #[serde(rename = "TotalCount")]
    total_count: Option<u64>,
    #[serde(rename = "List")]
    list: &'a [T],
}

#[derive(Deserialize)]
struct PageWire<T> {
    #[serde(rename = "PageNumber")]
    page_number: u32,
    #[serde(rename = "PageSize")]
    page_size: u32,
    #[serde(rename = "TotalCount", default)]
    total_count: Option<u64>,
    #[serde(rename = "List")]
    list: Vec<T>,
}

impl<T> TryFrom<PageWire<T>> for PageResult<T> {
    type Error = QueryError;

    fn try_from(wire: PageWire<T>) -> Result<Self, Self::Error> {
        Self::new(wire.list, wire.page_number, wire.page_size, wire.total_count)
    }
}

impl<T: Serialize> Serialize for PageResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PageWireRef {
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
            list: &self.items,
        }
        .serialize(serializer)
    }
}

impl<T> PageResult<T> {
    /// Builds a page, enforcing the page invariants.
    pub fn new(
        items: Vec<T>,
        page_number: u32,
        page_size: u32,
        total_count: Option<u64>,
    ) -> Result<Self, QueryError> {
        if page_number == 0 {
            return Err(QueryError::InvalidPageNumber);
        }
        if items.len() > page_size as usize {
            return Err(QueryError::PageOverflow {
                count: items.len(),
                page_size,
            });
        }

        Ok(Self {
            items,
            page_number,
            page_size,
            total_count,
            next_hint: None,
        })
    }

    /// Page without items.
    pub fn empty(page_number: u32, page_size: u32, total_count: Option<u64>) -> Self {
        Self {
            items: Vec::new(),
            page_number: page_number.max(1),
            page_size,
            total_count,
            next_hint: None,
        }
    }

    /// Pins `has_next_page` to a value the engine established exactly.
    pub(crate) fn with_has_next(mut self, has_next: bool) -> Self {
        self.next_hint = Some(has_next);
        self
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Total items in the logical result set, when the backend could say.
    pub fn total_count(&self) -> Option<u64> {
        self.total_count
    }

    /// Zero-based index of the first item slot on this page.
    pub fn first_index_on_page(&self) -> u64 {
        u64::from(self.page_number - 1) * u64::from(self.page_size)
    }

    /// Zero-based index of the last item on this page; `None` when empty.
    pub fn last_index_on_page(&self) -> Option<u64> {
        let count = self.items.len() as u64;
        (count > 0).then(|| self.first_index_on_page() + count - 1)
    }

    /// Number of pages in the result set, when the total is known.
    pub fn page_count(&self) -> Option<u64> {
        let total = self.total_count?;
        if self.page_size == 0 {
            return Some(0);
        }
        Some(total.div_ceil(u64::from(self.page_size)))
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_number > 1
    }

    /// Whether another page follows this one.
    ///
    /// Falls back to "a full page was returned" when the total is unknown.
    /// The engine's own answer is not serialized, so a deserialized page
    /// always derives it.
    pub fn has_next_page(&self) -> bool {
        if let Some(hint) = self.next_hint {
            return hint;
        }
        match self.total_count {
            Some(total) => self.first_index_on_page() + (self.items.len() as u64) < total,
            None => self.page_size > 0 && self.items.len() == self.page_size as usize,
        }
    }

    /// Converts items while keeping page metadata.
    pub fn map<U, F>(self, f: F) -> PageResult<U>
    where
        F: FnMut(T) -> U,
    {
        PageResult {
            items: self.items.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_count: self.total_count,
            next_hint: self.next_hint,
        }
    }
}

/// Page result carrying an opaque continuation token.
///
/// After a serde round trip `has_next_page` follows the total or full-page
/// rule; only the token tells whether a cursor backend had more items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorPage<T> {
    #[serde(flatten)]
    page: PageResult<T>,
    #[serde(rename = "ContinuationToken")]
    continuation_token: Option<String>,
}

impl<T> CursorPage<T> {
    pub fn new(page: PageResult<T>, continuation_token: Option<String>) -> Self {
        Self {
            page,
            continuation_token,
        }
    }

    /// Token resuming right after this page; `None` when exhausted or when
    /// the backend pages by offset.
    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    pub fn page(&self) -> &PageResult<T> {
        &self.page
    }

    pub fn into_page(self) -> PageResult<T> {
        self.page
    }

    pub fn into_parts(self) -> (PageResult<T>, Option<String>) {
        (self.page, self.continuation_token)
    }

    pub fn map<U, F>(self, f: F) -> CursorPage<U>
    where
        F: FnMut(T) -> U,
    {
        CursorPage {
            page: self.page.map(f),
            continuation_token: self.continuation_token,
        }
    }
}

impl<T> Deref for CursorPage<T> {
    type Target = PageResult<T>;

    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

#[cfg(test)]
mod tests {
    use super::{CursorPage, PageResult};
    use crate::error::QueryError;

    #[test]
    fn derived_indices_follow_page_number_and_size() {
        let page = PageResult::new(vec![1, 2, 3], 3, 5, None).unwrap();
        assert_eq!(page.first_index_on_page(), 10);
        assert_eq!(page.last_index_on_page(), Some(12));
        assert!(page.has_previous_page());

        let empty = PageResult::<i32>::empty(1, 5, Some(0));
        assert_eq!(empty.last_index_on_page(), None);
        assert!(!empty.has_previous_page());
    }

    #[test]
    fn has_next_uses_total_when_known() {
        let middle = PageResult::new(vec![1, 2], 1, 2, Some(3)).unwrap();
        assert!(middle.has_next_page());
        let last = PageResult::new(vec![3], 2, 2, Some(3)).unwrap();
        assert!(!last.has_next_page());
        let exact_end = PageResult::new(vec![3, 4], 2, 2, Some(4)).unwrap();
        assert!(!exact_end.has_next_page());
    }

    #[test]
    fn has_next_falls_back_to_full_page_rule() {
        let full = PageResult::new(vec![1, 2], 1, 2, None).unwrap();
        assert!(full.has_next_page());
        let partial = PageResult::new(vec![1], 1, 2, None).unwrap();
        assert!(!partial.has_next_page());
        let zero = PageResult::<i32>::empty(1, 0, None);
        assert!(!zero.has_next_page());
    }

    #[test]
    fn engine_hint_overrides_derivation() {
        let full = PageResult::new(vec![1, 2], 1, 2, None)
            .unwrap()
            .with_has_next(false);
        assert!(!full.has_next_page());
    }

    #[test]
    fn deserialized_pages_fall_back_to_full_page_rule() {
        let last = CursorPage::new(
            PageResult::new(vec![1, 2], 3, 2, None)
                .unwrap()
                .with_has_next(false),
            None,
        );
        assert!(!last.has_next_page());

        let json = serde_json::to_string(&last).unwrap();
        let restored: CursorPage<i32> = serde_json::from_str(&json).unwrap();
        assert!(restored.has_next_page());
        assert_eq!(restored.continuation_token(), None);
        assert_eq!(restored.items(), last.items());
    }

    #[test]
    fn constructor_rejects_invalid_pages() {
        assert_eq!(
            PageResult::new(vec![1, 2, 3], 1, 2, None).unwrap_err(),
            QueryError::PageOverflow {
                count: 3,
                page_size: 2
            }
        );
        assert_eq!(
            PageResult::<i32>::new(Vec::new(), 0, 2, None).unwrap_err(),
            QueryError::InvalidPageNumber
        );
    }

    #[test]
    fn page_count_rounds_up() {
        let page = PageResult::new(vec![1], 1, 2, Some(5)).unwrap();
        assert_eq!(page.page_count(), Some(3));
        let unknown = PageResult::new(vec![1], 1, 2, None).unwrap();
        assert_eq!(unknown.page_count(), None);
    }

    #[test]
    fn serialized_shape_is_stable() {
        let page = PageResult::new(vec!["a", "b"], 2, 2, Some(7)).unwrap();
        let json = serde_json::to_string(&page).unwrap();
        assert_eq!(
            json,
            r#"{"PageNumber":2,"PageSize":2,"TotalCount":7,"List":["a","b"]}"#
        );

        let cursor = CursorPage::new(
            PageResult::new(vec![1], 1, 1, None).unwrap(),
            Some("tok".to_string()),
        );
        let json = serde_json::to_string(&cursor).unwrap();
        assert_eq!(
            json,
            r#"{"PageNumber":1,"PageSize":1,"TotalCount":null,"List":[1],"ContinuationToken":"tok"}"#
        );
    }

    #[test]
    fn deserialization_enforces_invariants() {
        let overflow = r#"{"PageNumber":1,"PageSize":1,"TotalCount":null,"List":[1,2]}"#;
        assert!(serde_json::from_str::<PageResult<i32>>(overflow).is_err());

        let zero_page = r#"{"PageNumber":0,"PageSize":1,"TotalCount":null,"List":[]}"#;
        assert!(serde_json::from_str::<PageResult<i32>>(zero_page).is_err());
    }

    #[test]
    fn map_keeps_metadata_and_token() {
        let cursor = CursorPage::new(
            PageResult::new(vec![1, 2], 1, 2, None)
                .unwrap()
                .with_has_next(true),
            Some("next".to_string()),
        );
        let mapped = cursor.map(|value| value * 10);
        assert_eq!(mapped.items(), &[10, 20]);
        assert!(mapped.has_next_page());
        assert_eq!(mapped.continuation_token(), Some("next"));
    }
}
