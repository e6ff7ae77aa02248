//! Pagination engine.
//!
//! # Responsibility
//! - Normalize page requests and pick a paging strategy from backend
//!   capabilities.
//! - Issue and validate continuation tokens for cursor-only backends.
//!
//! # Invariants
//! - Direct-index pages cost one windowed scan (plus a count when totals are
//!   cheap) regardless of the page number.
//! - Cursor pages resumed from a token cost one continuation round, plus at
//!   most one single-item lookahead.
//! - Supplied tokens are decoded and shape-checked on every strategy;
//!   undecodable tokens and shape mismatches are errors everywhere.
//! - Token page/size mismatches degrade to a catch-up read.
//! - Offset-based pages never carry a token; valid supplied tokens are
//!   ignored there.
//!
//! # See also
//! - `query::token` for the token format.

use crate::backend::{Backend, PagingTier};
use crate::error::{QueryError, StoreResult};
use crate::model::item::Item;
use crate::model::page::{CursorPage, PageResult};
use crate::query::exec::apply_stages;
use crate::query::plan::{QueryPlan, Window};
use crate::query::token::CursorToken;
use log::{debug, info, warn};

pub const DEFAULT_MAX_PAGE_SIZE: u32 = 1000;

/// Engine knobs, usually derived from `StoreConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingOptions {
    /// Upper clamp for requested page sizes.
    pub max_page_size: u32,
    /// Count matches on every cursor page even when counting is expensive.
    pub count_on_cursor_pages: bool,
}

impl Default for PagingOptions {
    fn default() -> Self {
        Self {
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            count_on_cursor_pages: false,
        }
    }
}

/// Caller-facing page request. Out-of-range numbers are clamped, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageRequest {
    pub page_number: i64,
    pub page_size: i64,
    pub continuation: Option<String>,
    pub include_total: bool,
}

impl PageRequest {
    pub fn new(page_number: i64, page_size: i64) -> Self {
        Self {
            page_number,
            page_size,
            continuation: None,
            include_total: false,
        }
    }

    /// Resumes from a token returned with the previous page.
    pub fn after(mut self, token: impl Into<String>) -> Self {
        self.continuation = Some(token.into());
        self
    }

    /// Asks for `total_count` even on backends where counting costs a scan.
    pub fn with_total(mut self) -> Self {
        self.include_total = true;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Normalized {
    page_number: u32,
    page_size: u32,
}

impl Normalized {
    fn from_request(request: &PageRequest, options: &PagingOptions) -> Self {
        let page_number = u32::try_from(request.page_number.max(1)).unwrap_or(u32::MAX);
        let page_size = u32::try_from(request.page_size.max(0))
            .unwrap_or(u32::MAX)
            .min(options.max_page_size);
        Self {
            page_number,
            page_size,
        }
    }

    /// Items before this page, relative to the chain window.
    fn offset(&self) -> u64 {
        u64::from(self.page_number - 1) * u64::from(self.page_size)
    }
}

fn to_index(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

/// Runs one page request against a backend.
///
/// # Errors
/// - `QueryError::MalformedToken` / `IncompatibleToken` for bad tokens, on
///   every backend tier.
/// - Backend and field-evaluation failures, unchanged.
pub fn execute_page<T: Item>(
    backend: &dyn Backend<T>,
    plan: &QueryPlan<T>,
    request: &PageRequest,
    options: &PagingOptions,
) -> StoreResult<CursorPage<T>> {
    let normalized = Normalized::from_request(request, options);
    let capabilities = backend.capabilities();
    let shape = plan.fingerprint(backend.name());
    let token = request
        .continuation
        .as_deref()
        .map(|raw| decode_for_shape(raw, shape))
        .transpose()?;

    let offset_paged = plan.has_residual()
        || normalized.page_size == 0
        || capabilities.tier == PagingTier::DirectIndex;
    if offset_paged && token.is_some() {
        debug!(
            "event=token_ignored module=engine backend={} reason=offset_paging",
            backend.name()
        );
    }

    if plan.has_residual() {
        return materialized_page(backend, plan, normalized);
    }

    if normalized.page_size == 0 {
        let total = if capabilities.cheap_count || request.include_total {
            Some(plan.source.window.clip_count(backend.count(&plan.source)?))
        } else {
            None
        };
        debug!(
            "event=page_execute module=engine strategy=empty backend={} page={} size=0",
            backend.name(),
            normalized.page_number
        );
        let page = PageResult::empty(normalized.page_number, 0, total).with_has_next(false);
        return Ok(CursorPage::new(page, None));
    }

    match capabilities.tier {
        PagingTier::DirectIndex => {
            let with_total = capabilities.cheap_count || request.include_total;
            direct_index_page(backend, plan, normalized, with_total)
        }
        PagingTier::CursorOnly => {
            let with_total = capabilities.cheap_count
                || request.include_total
                || options.count_on_cursor_pages;
            cursor_page(backend, plan, shape, normalized, token, with_total)
        }
    }
}

/// Decodes a caller token and checks it belongs to the chain being paged.
fn decode_for_shape(raw: &str, shape: u64) -> StoreResult<CursorToken> {
    let token = CursorToken::decode(raw)?;
    if token.shape != shape {
        return Err(QueryError::IncompatibleToken {
            expected: shape,
            found: token.shape,
        }
        .into());
    }
    Ok(token)
}

/// Residual stages force the whole pushed stage through memory.
fn materialized_page<T: Item>(
    backend: &dyn Backend<T>,
    plan: &QueryPlan<T>,
    normalized: Normalized,
) -> StoreResult<CursorPage<T>> {
    let all = apply_stages(backend.scan(&plan.source)?, &plan.residual)?;
    let total = all.len() as u64;
    let items: Vec<T> = all
        .into_iter()
        .skip(to_index(normalized.offset()))
        .take(normalized.page_size as usize)
        .collect();

    debug!(
        "event=page_execute module=engine strategy=materialized backend={} page={} size={} returned={} total={total}",
        backend.name(),
        normalized.page_number,
        normalized.page_size,
        items.len()
    );
    let page = PageResult::new(
        items,
        normalized.page_number,
        normalized.page_size,
        Some(total),
    )?;
    Ok(CursorPage::new(page, None))
}

fn direct_index_page<T: Item>(
    backend: &dyn Backend<T>,
    plan: &QueryPlan<T>,
    normalized: Normalized,
    with_total: bool,
) -> StoreResult<CursorPage<T>> {
    let size = normalized.page_size as usize;
    let page_window = plan.source.window.then_skip(to_index(normalized.offset()));
    // Without a total, read one extra item to settle `has_next_page`.
    let read_window = page_window.then_take(if with_total { size } else { size + 1 });

    let mut items = if read_window.take == Some(0) {
        Vec::new()
    } else {
        backend.scan(&plan.source.with_window(read_window))?
    };
    let mut round_trips = 1;

    let total = if with_total {
        round_trips += 1;
        Some(plan.source.window.clip_count(backend.count(&plan.source)?))
    } else {
        None
    };
    let extra_found = items.len() > size;
    items.truncate(size);

    debug!(
        "event=page_execute module=engine strategy=direct_index backend={} page={} size={} returned={} round_trips={round_trips}",
        backend.name(),
        normalized.page_number,
        normalized.page_size,
        items.len()
    );

    let page = PageResult::new(items, normalized.page_number, normalized.page_size, total)?;
    let page = match total {
        Some(_) => page,
        None => page.with_has_next(extra_found),
    };
    Ok(CursorPage::new(page, None))
}

fn cursor_page<T: Item>(
    backend: &dyn Backend<T>,
    plan: &QueryPlan<T>,
    shape: u64,
    normalized: Normalized,
    token: Option<CursorToken>,
    with_total: bool,
) -> StoreResult<CursorPage<T>> {
    let stage = &plan.source;
    let size = u64::from(normalized.page_size);
    let window: Window = stage.window;

    // Absolute positions in the filtered, ordered stream.
    let page_start = (window.skip as u64).saturating_add(normalized.offset());
    let window_end = window
        .take
        .map(|take| (window.skip as u64).saturating_add(take as u64));
    let wanted = match window_end {
        Some(end) => size.min(end.saturating_sub(page_start)),
        None => size,
    };

    let mut position: Option<String> = None;
    let mut resumed = false;
    if let Some(token) = token {
        if token.resumes(normalized.page_number, normalized.page_size) {
            position = Some(token.position);
            resumed = true;
        } else {
            warn!(
                "event=token_fallback module=engine backend={} token_page={} token_size={} page={} size={}",
                backend.name(),
                token.page,
                token.page_size,
                normalized.page_number,
                normalized.page_size
            );
        }
    }

    let mut round_trips = 0_u32;
    let mut more = true;

    if wanted > 0 && !resumed && page_start > 0 {
        let mut remaining = page_start;
        let mut discarded = 0_u64;
        while remaining > 0 {
            let batch = to_index(remaining.min(size));
            let segment = backend.scan_segment(stage, position.as_deref(), batch)?;
            round_trips += 1;
            let read = segment.items.len() as u64;
            remaining = remaining.saturating_sub(read);
            discarded += read;
            match segment.next {
                Some(next) if read > 0 => position = Some(next),
                _ => {
                    more = false;
                    break;
                }
            }
        }
        info!(
            "event=cursor_catch_up module=engine backend={} page={} discarded={discarded} round_trips={round_trips}",
            backend.name(),
            normalized.page_number
        );
    }

    let mut items: Vec<T> = Vec::with_capacity(to_index(wanted));
    while more && (items.len() as u64) < wanted {
        let missing = to_index(wanted) - items.len();
        let segment = backend.scan_segment(stage, position.as_deref(), missing)?;
        round_trips += 1;
        let read = segment.items.len();
        items.extend(segment.items);
        match segment.next {
            Some(next) if read > 0 => position = Some(next),
            _ => more = false,
        }
    }
    // A backend may hand out slightly more than asked for.
    items.truncate(to_index(wanted));

    let total = if with_total {
        round_trips += 1;
        Some(window.clip_count(backend.count(stage)?))
    } else {
        None
    };

    let returned = items.len() as u64;
    let window_exhausted = window_end.is_some_and(|end| page_start.saturating_add(returned) >= end);
    let has_next = if window_exhausted || !more || returned < size || wanted == 0 {
        false
    } else if let Some(total) = total {
        normalized.offset().saturating_add(returned) < total
    } else {
        let lookahead = backend.scan_segment(stage, position.as_deref(), 1)?;
        round_trips += 1;
        !lookahead.items.is_empty()
    };

    debug!(
        "event=page_execute module=engine strategy=cursor backend={} page={} size={} returned={returned} resumed={resumed} round_trips={round_trips}",
        backend.name(),
        normalized.page_number,
        normalized.page_size
    );

    let token = match (&position, has_next) {
        (Some(position), true) => Some(
            CursorToken::new(
                normalized.page_number,
                normalized.page_size,
                shape,
                position.clone(),
            )
            .encode(),
        ),
        _ => None,
    };
    let page = PageResult::new(items, normalized.page_number, normalized.page_size, total)?
        .with_has_next(has_next);
    Ok(CursorPage::new(page, token))
}

#[cfg(test)]
mod tests {
    use super::{execute_page, Normalized, PageRequest, PagingOptions};
    use crate::backend::MemoryBackend;
    use crate::error::{QueryError, StoreError};
    use crate::model::item::HasKey;
    use crate::query::chain::Query;
    use crate::query::expr::{field, Direction};
    use crate::query::token::CursorToken;
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Row {
        id: u64,
        value: i64,
    }

    impl HasKey for Row {
        type Key = u64;

        fn key(&self) -> &u64 {
            &self.id
        }
    }

    fn rows() -> Query<Row> {
        let backend = MemoryBackend::with_items((1..=6).map(|id| Row {
            id,
            value: id as i64 * 10,
        }));
        Query::new(Arc::new(backend))
    }

    #[test]
    fn requests_are_clamped_into_range() {
        let options = PagingOptions {
            max_page_size: 50,
            count_on_cursor_pages: false,
        };
        let normalized = Normalized::from_request(&PageRequest::new(-3, 500), &options);
        assert_eq!(normalized.page_number, 1);
        assert_eq!(normalized.page_size, 50);

        let normalized = Normalized::from_request(&PageRequest::new(4, -1), &options);
        assert_eq!(normalized.page_number, 4);
        assert_eq!(normalized.page_size, 0);
        assert_eq!(normalized.offset(), 0);

        let normalized = Normalized::from_request(&PageRequest::new(3, 20), &options);
        assert_eq!(normalized.offset(), 40);
    }

    #[test]
    fn builder_sets_token_and_total() {
        let request = PageRequest::new(2, 10).after("abc").with_total();
        assert_eq!(request.continuation.as_deref(), Some("abc"));
        assert!(request.include_total);
    }

    #[test]
    fn offset_tiers_still_validate_tokens() {
        let query = rows().order_by("value", Direction::Ascending).into_query();
        let plan = query.plan();
        let backend = MemoryBackend::<Row>::new();
        let options = PagingOptions::default();

        let garbage = PageRequest::new(2, 2).after("%%% garbage %%%");
        let err = execute_page(&backend, &plan, &garbage, &options).unwrap_err();
        assert!(matches!(err, StoreError::Query(QueryError::MalformedToken(_))));

        let foreign = CursorToken::new(1, 2, plan.fingerprint("document"), "p".to_string());
        let request = PageRequest::new(2, 2).after(foreign.encode());
        let err = execute_page(&backend, &plan, &request, &options).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Query(QueryError::IncompatibleToken { .. })
        ));

        let zero_size = PageRequest::new(1, 0).after("%%%");
        assert!(execute_page(&backend, &plan, &zero_size, &options).is_err());
    }

    #[test]
    fn valid_tokens_are_ignored_by_offset_paging() {
        let query = rows().order_by("value", Direction::Ascending).into_query();
        let own = CursorToken::new(1, 2, query.fingerprint(), "ignored".to_string());

        let page = query.get_page_after(2, 2, Some(&own.encode())).unwrap();
        let values: Vec<i64> = page.items().iter().map(|row| row.value).collect();
        assert_eq!(values, vec![30, 40]);
        assert_eq!(page.continuation_token(), None);
    }

    #[test]
    fn residual_chains_reject_malformed_tokens() {
        let query = rows()
            .order_by("value", Direction::Ascending)
            .take(4)
            .filter(field("value").ge(0));
        assert!(query.plan().has_residual());

        let err = query.get_page_after(2, 2, Some("%%% garbage %%%")).unwrap_err();
        assert!(matches!(err, StoreError::Query(QueryError::MalformedToken(_))));
    }
}
