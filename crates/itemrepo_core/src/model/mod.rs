//! Data model shared by every backend.
//!
//! # Responsibility
//! - Define the identified-item contract all stored items satisfy.
//! - Define the scalar `Value` vocabulary used by predicates and sort keys.
//! - Define immutable page result value objects.
//!
//! # Invariants
//! - Item identity is the key alone.
//! - Page results never hold more items than their page size.

pub mod item;
pub mod page;
pub mod value;
