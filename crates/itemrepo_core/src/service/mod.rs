//! Store-level services.
//!
//! # Responsibility
//! - Give callers one storage-agnostic entry point per item type.
//! - Keep caching and paging configuration out of backend code.

pub mod data_store;
