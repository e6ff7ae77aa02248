//! Query surface and pagination.
//!
//! # Responsibility
//! - Expose the lazy chain (`Query`) callers compose against any backend.
//! - Plan chains into backend and in-process stages.
//! - Page results over direct-index and cursor-only backends.
//!
//! # See also
//! - `backend` for the primitives a chain runs on.

pub mod chain;
pub mod engine;
pub(crate) mod exec;
pub mod expr;
pub mod plan;
pub(crate) mod token;

pub use chain::{OrderedQuery, Pages, Projected, Query};
pub use engine::{execute_page, PageRequest, PagingOptions, DEFAULT_MAX_PAGE_SIZE};
pub use expr::{field, CompareOp, Direction, FieldRef, OrderSpec, Predicate, SortKey};
pub use plan::{QueryPlan, Stage, Window};
