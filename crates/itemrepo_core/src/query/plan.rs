//! Flattened execution plans.
//!
//! # Responsibility
//! - Turn a linked chain of operations into ordered stages.
//! - Decide which stage a backend receives and which run in-process.
//! - Fingerprint the plan shape for continuation tokens.
//!
//! # Invariants
//! - A filter, order or window placed after a non-trivial window opens a new
//!   stage; within a stage the window applies last.
//! - `OrderBy` replaces the stage's sort keys; `ThenBy` appends.

use crate::query::expr::{OrderSpec, Predicate};
use std::fmt::Write as _;
use xxhash_rust::xxh3::xxh3_64;

/// Index window: skip then take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub skip: usize,
    pub take: Option<usize>,
}

impl Window {
    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.take.is_none()
    }

    /// Applies a further `skip(n)` on top of this window.
    pub fn then_skip(self, n: usize) -> Self {
        Self {
            skip: self.skip.saturating_add(n),
            take: self.take.map(|take| take.saturating_sub(n)),
        }
    }

    /// Applies a further `take(n)` on top of this window.
    pub fn then_take(self, n: usize) -> Self {
        Self {
            skip: self.skip,
            take: Some(self.take.map_or(n, |take| take.min(n))),
        }
    }

    /// Number of items this window keeps out of `available` candidates.
    pub fn clip_count(&self, available: u64) -> u64 {
        let after_skip = available.saturating_sub(self.skip as u64);
        match self.take {
            Some(take) => after_skip.min(take as u64),
            None => after_skip,
        }
    }
}

/// Filters, then order, then window.
#[derive(Debug)]
pub struct Stage<T> {
    pub filters: Vec<Predicate<T>>,
    pub order: Vec<OrderSpec<T>>,
    pub window: Window,
}

impl<T> Default for Stage<T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            order: Vec::new(),
            window: Window::default(),
        }
    }
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            order: self.order.clone(),
            window: self.window,
        }
    }
}

impl<T> Stage<T> {
    /// Same filters and order with a different window.
    pub fn with_window(&self, window: Window) -> Self {
        Self {
            filters: self.filters.clone(),
            order: self.order.clone(),
            window,
        }
    }

    /// Whether every filter and sort key has a native translation.
    pub fn is_translatable(&self) -> bool {
        self.filters.iter().all(Predicate::is_translatable)
            && self.order.iter().all(|spec| spec.key.is_translatable())
    }

    fn describe(&self, out: &mut String) {
        out.push_str("filter{");
        for filter in &self.filters {
            filter.describe(out);
        }
        out.push_str("}order{");
        for spec in &self.order {
            spec.describe(out);
        }
        let _ = write!(
            out,
            "}}window{{{},{:?}}}",
            self.window.skip, self.window.take
        );
    }
}

/// One operation in a chain, in the order the caller applied it.
#[derive(Debug)]
pub(crate) enum Op<T> {
    Filter(Predicate<T>),
    OrderBy(OrderSpec<T>),
    ThenBy(OrderSpec<T>),
    Skip(usize),
    Take(usize),
}

/// Executable form of a chain.
#[derive(Debug)]
pub struct QueryPlan<T> {
    /// Stage handed to the backend.
    pub source: Stage<T>,
    /// Stages evaluated in-process over the source stage's output.
    pub residual: Vec<Stage<T>>,
}

impl<T> QueryPlan<T> {
    pub(crate) fn from_ops<'a, I>(ops: I) -> Self
    where
        I: IntoIterator<Item = &'a Op<T>>,
        T: 'a,
    {
        let mut stages = vec![Stage::default()];

        for op in ops {
            let windowed = stages.last().is_some_and(|stage| !stage.window.is_unbounded());
            if windowed && matches!(op, Op::Filter(_) | Op::OrderBy(_) | Op::ThenBy(_)) {
                stages.push(Stage::default());
            }
            let Some(stage) = stages.last_mut() else {
                continue;
            };
            match op {
                Op::Filter(predicate) => stage.filters.push(predicate.clone()),
                Op::OrderBy(spec) => stage.order = vec![spec.clone()],
                Op::ThenBy(spec) => stage.order.push(spec.clone()),
                Op::Skip(n) => stage.window = stage.window.then_skip(*n),
                Op::Take(n) => stage.window = stage.window.then_take(*n),
            }
        }

        let source = stages.remove(0);
        Self {
            source,
            residual: stages,
        }
    }

    pub fn has_residual(&self) -> bool {
        !self.residual.is_empty()
    }

    /// Stable hash of the plan shape, scoped to one backend.
    pub fn fingerprint(&self, backend: &str) -> u64 {
        let mut out = String::from(backend);
        out.push('|');
        self.source.describe(&mut out);
        for stage in &self.residual {
            out.push('|');
            stage.describe(&mut out);
        }
        xxh3_64(out.as_bytes())
    }
}
