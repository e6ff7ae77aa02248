//! In-process document collection with forward-only continuation.
//!
//! # Responsibility
//! - Model a document-database container: string document ids, filtered and
//!   ordered reads, and opaque continuation positions instead of offsets.
//! - Count round trips so callers can observe paging cost.
//!
//! # Invariants
//! - Result order is the stage order, ties broken by document id.
//! - A position encodes the sort tuple and id of the last returned document;
//!   resuming yields the documents strictly after it.
//! - A round never returns more than `max_batch` documents.

use crate::backend::{Backend, Capabilities, PagingTier, Segment};
use crate::error::{QueryError, StoreError, StoreResult};
use crate::model::item::{Item, ItemKey};
use crate::model::value::Value;
use crate::query::exec::{apply_stage, compare_sort_values, count_matching, filter_and_sort};
use crate::query::plan::Stage;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::trace;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::RwLock;

const BACKEND_NAME: &str = "document";
const DEFAULT_MAX_BATCH: usize = 1000;

#[derive(Debug, Serialize, Deserialize)]
struct Position {
    #[serde(rename = "a")]
    after: Vec<Value>,
    #[serde(rename = "k")]
    id: String,
}

impl Position {
    fn encode(&self) -> StoreResult<String> {
        Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(self)?))
    }

    fn decode(raw: &str, sort_len: usize) -> StoreResult<Self> {
        let malformed = || QueryError::MalformedToken("invalid document position".to_string());
        let bytes = URL_SAFE_NO_PAD.decode(raw).map_err(|_| malformed())?;
        let position: Self = serde_json::from_slice(&bytes).map_err(|_| malformed())?;
        if position.after.len() != sort_len {
            return Err(malformed().into());
        }
        Ok(position)
    }
}

/// Cursor-only backend keyed by document id.
pub struct DocumentCollection<T: Item> {
    documents: RwLock<BTreeMap<String, T>>,
    max_batch: usize,
    round_trips: AtomicU64,
}

impl<T: Item> DocumentCollection<T> {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(BTreeMap::new()),
            max_batch: DEFAULT_MAX_BATCH,
            round_trips: AtomicU64::new(0),
        }
    }

    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let collection = Self::new();
        if let Ok(mut documents) = collection.documents.write() {
            for item in items {
                documents.insert(item.key().to_storage(), item);
            }
        }
        collection
    }

    /// Caps how many documents a single round may return.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Number of read round trips served so far.
    pub fn round_trips(&self) -> u64 {
        self.round_trips.load(AtomicOrdering::Relaxed)
    }

    fn snapshot(&self) -> StoreResult<Vec<T>> {
        self.round_trips.fetch_add(1, AtomicOrdering::Relaxed);
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(documents.values().cloned().collect())
    }
}

impl<T: Item> Default for DocumentCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Item> Backend<T> for DocumentCollection<T> {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            tier: PagingTier::CursorOnly,
            cheap_count: false,
            predicate_pushdown: false,
        }
    }

    fn get(&self, key: &T::Key) -> StoreResult<Option<T>> {
        let documents = self
            .documents
            .read()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(documents.get(&key.to_storage()).cloned())
    }

    fn upsert(&self, item: &T) -> StoreResult<()> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        documents.insert(item.key().to_storage(), item.clone());
        Ok(())
    }

    fn delete(&self, key: &T::Key) -> StoreResult<bool> {
        let mut documents = self
            .documents
            .write()
            .map_err(|_| StoreError::poisoned(BACKEND_NAME))?;
        Ok(documents.remove(&key.to_storage()).is_some())
    }

    fn scan(&self, stage: &Stage<T>) -> StoreResult<Vec<T>> {
        apply_stage(self.snapshot()?, stage)
    }

    fn count(&self, stage: &Stage<T>) -> StoreResult<u64> {
        let snapshot = self.snapshot()?;
        count_matching(&snapshot, &stage.filters)
    }

    fn scan_segment(
        &self,
        stage: &Stage<T>,
        position: Option<&str>,
        max_items: usize,
    ) -> StoreResult<Segment<T>> {
        let sorted = filter_and_sort(self.snapshot()?, stage)?;
        let start = match position {
            Some(raw) => {
                let after = Position::decode(raw, stage.order.len())?;
                sorted.partition_point(|(tuple, item)| {
                    let ordering = compare_sort_values(&stage.order, tuple, &after.after)
                        .then_with(|| item.key().to_storage().cmp(&after.id));
                    ordering != Ordering::Greater
                })
            }
            None => 0,
        };

        let limit = max_items.min(self.max_batch);
        let end = start.saturating_add(limit).min(sorted.len());
        let next = if end < sorted.len() && end > start {
            let (tuple, item) = &sorted[end - 1];
            Some(
                Position {
                    after: tuple.clone(),
                    id: item.key().to_storage(),
                }
                .encode()?,
            )
        } else if end == start && end < sorted.len() {
            position.map(str::to_string)
        } else {
            None
        };

        trace!(
            "event=segment_read module=backend backend={BACKEND_NAME} start={start} returned={} more={}",
            end - start,
            next.is_some()
        );

        let items = sorted
            .into_iter()
            .skip(start)
            .take(end - start)
            .map(|(_, item)| item)
            .collect();
        Ok(Segment { items, next })
    }
}
