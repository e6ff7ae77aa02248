//! Identified-item contract.
//!
//! # Responsibility
//! - Describe what a type needs to be stored: a key and a serde shape.
//! - Provide key conversions for backends that persist keys as text.
//!
//! # Invariants
//! - Two items are the same item exactly when their keys are equal.
//! - `ItemKey::from_storage(k.to_storage())` returns `k`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Debug, Display};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Key type usable by every backend.
pub trait ItemKey: Clone + Ord + Hash + Debug + Display + Send + Sync + 'static {
    /// Returns whether this key is the "no key" value for its type.
    ///
    /// Blank keys are treated as "not found" on reads and no-ops on removes.
    fn is_blank(&self) -> bool {
        false
    }

    /// Text form used by backends that store keys as strings.
    fn to_storage(&self) -> String {
        self.to_string()
    }

    /// Parses the text form written by `to_storage`.
    fn from_storage(raw: &str) -> Option<Self>;
}

impl ItemKey for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }

    fn from_storage(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }
}

impl ItemKey for Uuid {
    fn is_blank(&self) -> bool {
        self.is_nil()
    }

    fn from_storage(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw).ok()
    }
}

impl ItemKey for u64 {
    fn from_storage(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl ItemKey for i64 {
    fn from_storage(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

/// Capability: the type carries a unique key.
pub trait HasKey {
    type Key: ItemKey;

    fn key(&self) -> &Self::Key;

    /// Key equality, the only identity relation the store relies on.
    fn same_key(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

/// Anything that can be stored and queried.
///
/// Fields are addressed by dotted path over the item's serde JSON shape, so
/// the serialized field names are the names predicates and sort keys use.
pub trait Item: HasKey + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Item for T where T: HasKey + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Wrapper comparing and hashing items by key only.
#[derive(Debug, Clone)]
pub struct ByKey<T>(pub T);

impl<T: HasKey> PartialEq for ByKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.same_key(&other.0)
    }
}

impl<T: HasKey> Eq for ByKey<T> {}

impl<T: HasKey> Hash for ByKey<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.key().hash(state);
    }
}

/// Generates a fresh random string key.
pub fn new_key() -> String {
    Uuid::new_v4().to_string()
}
