//! In-process evaluation of stages.
//!
//! Used by backends without a native query language and for residual stages.
//! Items are serialized to JSON at most once per evaluation pass.

use crate::error::{StoreError, StoreResult};
use crate::model::value::{read_path, Value};
use crate::query::expr::{CompareOp, Direction, OrderSpec, Predicate, SortKey};
use crate::query::plan::{Stage, Window};
use once_cell::unsync::OnceCell;
use serde::Serialize;
use std::cmp::Ordering;

/// Lazily serialized view over one item.
pub(crate) struct FieldReader<'a, T> {
    item: &'a T,
    document: OnceCell<serde_json::Value>,
}

impl<'a, T: Serialize> FieldReader<'a, T> {
    pub(crate) fn new(item: &'a T) -> Self {
        Self {
            item,
            document: OnceCell::new(),
        }
    }

    pub(crate) fn read(&self, path: &str) -> StoreResult<Value> {
        let document = self.document.get_or_try_init(|| {
            serde_json::to_value(self.item).map_err(|err| StoreError::FieldAccess {
                path: path.to_string(),
                message: err.to_string(),
            })
        })?;
        Ok(read_path(document, path))
    }
}

pub(crate) fn compare_matches(op: CompareOp, actual: &Value, expected: &Value) -> bool {
    if expected.is_null() || actual.is_null() {
        return match op {
            CompareOp::Eq => actual.is_null() && expected.is_null(),
            CompareOp::Ne => actual.is_null() != expected.is_null(),
            _ => false,
        };
    }
    let ordering = actual.total_cmp(expected);
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    }
}

pub(crate) fn eval_predicate<T: Serialize>(
    predicate: &Predicate<T>,
    reader: &FieldReader<'_, T>,
) -> StoreResult<bool> {
    match predicate {
        Predicate::Compare { field, op, value } => {
            Ok(compare_matches(*op, &reader.read(field)?, value))
        }
        Predicate::IsNull(field) => Ok(reader.read(field)?.is_null()),
        Predicate::And(parts) => {
            for part in parts {
                if !eval_predicate(part, reader)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Predicate::Or(parts) => {
            for part in parts {
                if eval_predicate(part, reader)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Predicate::Not(inner) => Ok(!eval_predicate(inner, reader)?),
        Predicate::Custom(f) => Ok(f(reader.item)),
    }
}

pub(crate) fn matches_all<T: Serialize>(
    filters: &[Predicate<T>],
    reader: &FieldReader<'_, T>,
) -> StoreResult<bool> {
    for filter in filters {
        if !eval_predicate(filter, reader)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn sort_value<T: Serialize>(
    key: &SortKey<T>,
    reader: &FieldReader<'_, T>,
) -> StoreResult<Value> {
    match key {
        SortKey::Field(path) => reader.read(path),
        SortKey::Computed(f) => Ok(f(reader.item)),
    }
}

/// Compares two precomputed sort tuples under the given directions.
pub(crate) fn compare_sort_values<T>(order: &[OrderSpec<T>], a: &[Value], b: &[Value]) -> Ordering {
    for ((spec, left), right) in order.iter().zip(a).zip(b) {
        let ordering = left.total_cmp(right);
        let ordering = match spec.direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Filters and sorts items, keeping each item's sort tuple.
///
/// The sort is stable, so input order breaks ties.
pub(crate) fn filter_and_sort<T: Serialize>(
    items: impl IntoIterator<Item = T>,
    stage: &Stage<T>,
) -> StoreResult<Vec<(Vec<Value>, T)>> {
    let mut kept = Vec::new();
    for item in items {
        let reader = FieldReader::new(&item);
        if !matches_all(&stage.filters, &reader)? {
            continue;
        }
        let mut tuple = Vec::with_capacity(stage.order.len());
        for spec in &stage.order {
            tuple.push(sort_value(&spec.key, &reader)?);
        }
        drop(reader);
        kept.push((tuple, item));
    }
    if !stage.order.is_empty() {
        kept.sort_by(|(a, _), (b, _)| compare_sort_values(&stage.order, a, b));
    }
    Ok(kept)
}

pub(crate) fn apply_window<T>(items: impl IntoIterator<Item = T>, window: Window) -> Vec<T> {
    let iter = items.into_iter().skip(window.skip);
    match window.take {
        Some(take) => iter.take(take).collect(),
        None => iter.collect(),
    }
}

/// Runs one full stage in-process.
pub(crate) fn apply_stage<T: Serialize>(
    items: impl IntoIterator<Item = T>,
    stage: &Stage<T>,
) -> StoreResult<Vec<T>> {
    let sorted = filter_and_sort(items, stage)?;
    Ok(apply_window(sorted.into_iter().map(|(_, item)| item), stage.window))
}

/// Runs residual stages one after another.
pub(crate) fn apply_stages<T: Serialize>(
    mut items: Vec<T>,
    stages: &[Stage<T>],
) -> StoreResult<Vec<T>> {
    for stage in stages {
        items = apply_stage(items, stage)?;
    }
    Ok(items)
}

/// Counts items matching a stage's filters, ignoring order and window.
pub(crate) fn count_matching<'a, T: Serialize + 'a>(
    items: impl IntoIterator<Item = &'a T>,
    filters: &[Predicate<T>],
) -> StoreResult<u64> {
    let mut count = 0;
    for item in items {
        if matches_all(filters, &FieldReader::new(item))? {
            count += 1;
        }
    }
    Ok(count)
}
