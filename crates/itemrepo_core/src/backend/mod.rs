//! Storage backend contract and bundled implementations.
//!
//! # Responsibility
//! - Define the primitives the query engine needs from a storage engine.
//! - Advertise per-backend paging capabilities so the engine can pick a
//!   strategy once per backend instead of once per call.
//!
//! # Invariants
//! - `scan` honors filters, order and window of the stage it receives.
//! - `count` counts filtered items and ignores the window.
//! - `scan_segment` positions are opaque to the engine and only valid for
//!   the stage they were produced for.
//! - Backend failures are returned unchanged; backends do not retry.

use crate::error::{StoreError, StoreResult};
use crate::model::item::Item;
use crate::query::plan::Stage;

pub mod document;
pub mod memory;
pub mod sqlite;

pub use document::DocumentCollection;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// How a backend can reach an arbitrary page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingTier {
    /// Skips to any offset natively.
    DirectIndex,
    /// Only resumes forward from an opaque position.
    CursorOnly,
}

/// Capabilities advertised by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub tier: PagingTier,
    /// `count` is cheap enough to run on every page request.
    pub cheap_count: bool,
    /// Translatable predicates and sort keys run inside the backend.
    pub predicate_pushdown: bool,
}

/// Items read by one continuation round plus the position after them.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment<T> {
    pub items: Vec<T>,
    /// `None` when the iteration is exhausted.
    pub next: Option<String>,
}

/// Storage primitives required by the store facade and the query engine.
pub trait Backend<T: Item>: Send + Sync {
    /// Stable backend name, used in logs and query fingerprints.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn get(&self, key: &T::Key) -> StoreResult<Option<T>>;

    /// Inserts or replaces the item stored under the item's key.
    fn upsert(&self, item: &T) -> StoreResult<()>;

    /// Removes by key; returns whether an item was removed.
    fn delete(&self, key: &T::Key) -> StoreResult<bool>;

    /// Iteration primitive.
    fn scan(&self, stage: &Stage<T>) -> StoreResult<Vec<T>>;

    /// Filtered count, window ignored.
    fn count(&self, stage: &Stage<T>) -> StoreResult<u64>;

    /// Continuation primitive: up to `max_items` items following `position`
    /// (`None` starts from the beginning). The stage window is ignored.
    fn scan_segment(
        &self,
        _stage: &Stage<T>,
        _position: Option<&str>,
        _max_items: usize,
    ) -> StoreResult<Segment<T>> {
        Err(StoreError::Unsupported {
            backend: self.name(),
            operation: "continuation scans",
        })
    }
}
