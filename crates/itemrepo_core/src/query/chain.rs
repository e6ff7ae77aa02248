//! Lazy, composable query chains.
//!
//! # Responsibility
//! - Record filter/order/window operations without executing them.
//! - Flatten a chain into a `QueryPlan` when a terminal operation runs.
//!
//! # Invariants
//! - Chains are immutable; every operation returns a new chain and the
//!   receiver can keep branching.
//! - `then_by` is only reachable after `order_by`.
//! - Projections map items after paging, so tokens stay valid for the
//!   underlying chain.

use crate::backend::Backend;
use crate::error::StoreResult;
use crate::model::item::Item;
use crate::model::page::CursorPage;
use crate::model::value::Value;
use crate::query::engine::{execute_page, PageRequest, PagingOptions};
use crate::query::exec::{apply_stages, sort_value, FieldReader};
use crate::query::expr::{field, Direction, OrderSpec, Predicate, SortKey};
use crate::query::plan::{Op, QueryPlan};
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

struct Node<T> {
    op: Op<T>,
    parent: Option<Arc<Node<T>>>,
}

/// Deferred query over one backend.
pub struct Query<T: Item> {
    backend: Arc<dyn Backend<T>>,
    options: PagingOptions,
    tail: Option<Arc<Node<T>>>,
}

impl<T: Item> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            options: self.options,
            tail: self.tail.clone(),
        }
    }
}

impl<T: Item> Debug for Query<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("backend", &self.backend.name())
            .field("fingerprint", &format_args!("{:016x}", self.fingerprint()))
            .finish()
    }
}

fn clamp_count(n: i64) -> usize {
    usize::try_from(n.max(0)).unwrap_or(usize::MAX)
}

impl<T: Item> Query<T> {
    /// Empty chain over `backend` with default paging options.
    pub fn new(backend: Arc<dyn Backend<T>>) -> Self {
        Self::with_options(backend, PagingOptions::default())
    }

    pub fn with_options(backend: Arc<dyn Backend<T>>, options: PagingOptions) -> Self {
        Self {
            backend,
            options,
            tail: None,
        }
    }

    fn push(&self, op: Op<T>) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            options: self.options,
            tail: Some(Arc::new(Node {
                op,
                parent: self.tail.clone(),
            })),
        }
    }

    pub fn filter(&self, predicate: Predicate<T>) -> Self {
        self.push(Op::Filter(predicate))
    }

    /// Filters with a closure; always evaluated in-process.
    pub fn filter_fn<F>(&self, f: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.filter(Predicate::custom(f))
    }

    /// Sets the primary sort, replacing any earlier one.
    pub fn order_by(&self, key: impl Into<SortKey<T>>, direction: Direction) -> OrderedQuery<T> {
        OrderedQuery {
            query: self.push(Op::OrderBy(OrderSpec {
                key: key.into(),
                direction,
            })),
        }
    }

    pub fn order_by_key<F>(&self, f: F, direction: Direction) -> OrderedQuery<T>
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.order_by(SortKey::computed(f), direction)
    }

    /// Skips `n` items; negative counts act as zero.
    pub fn skip(&self, n: i64) -> Self {
        self.push(Op::Skip(clamp_count(n)))
    }

    /// Keeps at most `n` items; negative counts act as zero.
    pub fn take(&self, n: i64) -> Self {
        self.push(Op::Take(clamp_count(n)))
    }

    pub fn select<U, F>(&self, f: F) -> Projected<T, U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        Projected {
            query: self.clone(),
            selector: Arc::new(f),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Flattens the chain, oldest operation first.
    pub fn plan(&self) -> QueryPlan<T> {
        let mut ops = Vec::new();
        let mut cursor = self.tail.as_deref();
        while let Some(node) = cursor {
            ops.push(&node.op);
            cursor = node.parent.as_deref();
        }
        QueryPlan::from_ops(ops.into_iter().rev())
    }

    /// Shape fingerprint embedded in continuation tokens.
    pub fn fingerprint(&self) -> u64 {
        self.plan().fingerprint(self.backend.name())
    }

    pub fn to_vec(&self) -> StoreResult<Vec<T>> {
        let plan = self.plan();
        let items = self.backend.scan(&plan.source)?;
        apply_stages(items, &plan.residual)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let plan = self.plan();
        if plan.has_residual() {
            return Ok(self.to_vec()?.len() as u64);
        }
        let matching = self.backend.count(&plan.source)?;
        Ok(plan.source.window.clip_count(matching))
    }

    pub fn any(&self) -> StoreResult<bool> {
        Ok(self.first()?.is_some())
    }

    /// First item of the chain, or `None` when it is empty.
    pub fn first(&self) -> StoreResult<Option<T>> {
        Ok(self.take(1).to_vec()?.into_iter().next())
    }

    /// Largest non-null value of `key`.
    pub fn max(&self, key: impl Into<SortKey<T>>) -> StoreResult<Option<Value>> {
        self.extreme(key.into(), Direction::Descending)
    }

    /// Smallest non-null value of `key`.
    pub fn min(&self, key: impl Into<SortKey<T>>) -> StoreResult<Option<Value>> {
        self.extreme(key.into(), Direction::Ascending)
    }

    fn extreme(&self, key: SortKey<T>, direction: Direction) -> StoreResult<Option<Value>> {
        let plan = self.plan();
        if let SortKey::Field(path) = &key {
            if !plan.has_residual() && plan.source.window.is_unbounded() {
                let best = self
                    .filter(field(path.as_str()).is_not_null())
                    .order_by(key.clone(), direction)
                    .first()?;
                return match best {
                    Some(item) => Ok(Some(FieldReader::new(&item).read(path)?)),
                    None => Ok(None),
                };
            }
        }

        let wanted = match direction {
            Direction::Ascending => Ordering::Less,
            Direction::Descending => Ordering::Greater,
        };
        let mut best: Option<Value> = None;
        for item in self.to_vec()? {
            let value = sort_value(&key, &FieldReader::new(&item))?;
            if value.is_null() {
                continue;
            }
            let replace = best
                .as_ref()
                .map_or(true, |current| value.total_cmp(current) == wanted);
            if replace {
                best = Some(value);
            }
        }
        Ok(best)
    }

    /// Page `page_number` (1-based) of `page_size` items.
    pub fn get_page(&self, page_number: i64, page_size: i64) -> StoreResult<CursorPage<T>> {
        self.page(&PageRequest::new(page_number, page_size))
    }

    /// Like `get_page`, resuming from the token of the previous page.
    pub fn get_page_after(
        &self,
        page_number: i64,
        page_size: i64,
        continuation: Option<&str>,
    ) -> StoreResult<CursorPage<T>> {
        let request = PageRequest::new(page_number, page_size);
        let request = match continuation {
            Some(token) => request.after(token),
            None => request,
        };
        self.page(&request)
    }

    pub fn page(&self, request: &PageRequest) -> StoreResult<CursorPage<T>> {
        execute_page(self.backend.as_ref(), &self.plan(), request, &self.options)
    }

    /// Walks every page in order, handing each token to the next request.
    pub fn pages(&self, page_size: i64) -> Pages<T> {
        Pages {
            query: self.clone(),
            page_size,
            next: Some(PageRequest::new(1, page_size)),
        }
    }
}

/// Query with a primary sort; adds `then_by`.
#[derive(Debug)]
pub struct OrderedQuery<T: Item> {
    query: Query<T>,
}

impl<T: Item> Clone for OrderedQuery<T> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
        }
    }
}

impl<T: Item> OrderedQuery<T> {
    /// Adds a tie-breaking sort key.
    pub fn then_by(&self, key: impl Into<SortKey<T>>, direction: Direction) -> OrderedQuery<T> {
        OrderedQuery {
            query: self.query.push(Op::ThenBy(OrderSpec {
                key: key.into(),
                direction,
            })),
        }
    }

    pub fn then_by_key<F>(&self, f: F, direction: Direction) -> OrderedQuery<T>
    where
        F: Fn(&T) -> Value + Send + Sync + 'static,
    {
        self.then_by(SortKey::computed(f), direction)
    }

    pub fn into_query(self) -> Query<T> {
        self.query
    }
}

impl<T: Item> Deref for OrderedQuery<T> {
    type Target = Query<T>;

    fn deref(&self) -> &Self::Target {
        &self.query
    }
}

impl<T: Item> From<OrderedQuery<T>> for Query<T> {
    fn from(value: OrderedQuery<T>) -> Self {
        value.query
    }
}

type Selector<T, U> = Arc<dyn Fn(T) -> U + Send + Sync>;

/// Chain whose results are mapped through a selector after execution.
pub struct Projected<T: Item, U> {
    query: Query<T>,
    selector: Selector<T, U>,
}

impl<T: Item, U> Clone for Projected<T, U> {
    fn clone(&self) -> Self {
        Self {
            query: self.query.clone(),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<T: Item, U: 'static> Projected<T, U> {
    /// Composes another projection on top of this one.
    pub fn select<V, F>(&self, f: F) -> Projected<T, V>
    where
        F: Fn(U) -> V + Send + Sync + 'static,
    {
        let inner = Arc::clone(&self.selector);
        Projected {
            query: self.query.clone(),
            selector: Arc::new(move |item| f(inner(item))),
        }
    }

    /// Chain the projection runs over.
    pub fn source(&self) -> &Query<T> {
        &self.query
    }

    pub fn count(&self) -> StoreResult<u64> {
        self.query.count()
    }

    pub fn any(&self) -> StoreResult<bool> {
        self.query.any()
    }

    pub fn first(&self) -> StoreResult<Option<U>> {
        Ok(self.query.first()?.map(|item| (self.selector)(item)))
    }

    pub fn to_vec(&self) -> StoreResult<Vec<U>> {
        let selector = &self.selector;
        Ok(self.query.to_vec()?.into_iter().map(|item| selector(item)).collect())
    }

    pub fn get_page(&self, page_number: i64, page_size: i64) -> StoreResult<CursorPage<U>> {
        self.page(&PageRequest::new(page_number, page_size))
    }

    pub fn get_page_after(
        &self,
        page_number: i64,
        page_size: i64,
        continuation: Option<&str>,
    ) -> StoreResult<CursorPage<U>> {
        let selector = &self.selector;
        Ok(self
            .query
            .get_page_after(page_number, page_size, continuation)?
            .map(|item| selector(item)))
    }

    pub fn page(&self, request: &PageRequest) -> StoreResult<CursorPage<U>> {
        let selector = &self.selector;
        Ok(self.query.page(request)?.map(|item| selector(item)))
    }

    pub fn pages(&self, page_size: i64) -> impl Iterator<Item = StoreResult<CursorPage<U>>> {
        let selector = Arc::clone(&self.selector);
        self.query
            .pages(page_size)
            .map(move |page| page.map(|page| page.map(|item| selector(item))))
    }
}

/// Iterator returned by `Query::pages`.
///
/// Stops after the last page or after the first error.
pub struct Pages<T: Item> {
    query: Query<T>,
    page_size: i64,
    next: Option<PageRequest>,
}

impl<T: Item> Iterator for Pages<T> {
    type Item = StoreResult<CursorPage<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        let request = self.next.take()?;
        let page = match self.query.page(&request) {
            Ok(page) => page,
            Err(err) => return Some(Err(err)),
        };
        if page.has_next_page() {
            let following = PageRequest::new(i64::from(page.page_number()) + 1, self.page_size);
            self.next = Some(match page.continuation_token() {
                Some(token) => following.after(token),
                None => following,
            });
        }
        Some(Ok(page))
    }
}
