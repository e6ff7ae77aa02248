//! Storage-agnostic item repository with lazy queries and paging.
//! Backends plug in underneath; callers only see `DataStore` and `Query`.

pub mod backend;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod query;
pub mod service;

pub use backend::{
    Backend, Capabilities, DocumentCollection, MemoryBackend, PagingTier, Segment, SqliteBackend,
};
pub use cache::{ItemCache, TtlCache};
pub use config::{ConfigError, StoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use error::{QueryError, StoreError, StoreResult};
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::item::{new_key, ByKey, HasKey, Item, ItemKey};
pub use model::page::{CursorPage, PageResult};
pub use model::value::Value;
pub use query::{
    field, Direction, OrderedQuery, PageRequest, PagingOptions, Predicate, Projected, Query,
    SortKey, Stage,
};
pub use service::data_store::DataStore;

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
