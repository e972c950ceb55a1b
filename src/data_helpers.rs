//! Generic list helpers shared by the order, redemption, and menu screens.
//!
//! Filtering is a case-insensitive substring match over denormalized text
//! fields, status/category filters use an `"all"` sentinel to bypass, and
//! pagination is 1-based with out-of-range pages clamped to the nearest
//! valid page.

use serde::Serialize;
use serde_json::Value;

use crate::db::{self, DbState};

/// Page size for order and redemption lists when `local_settings` carries
/// no override.
pub(crate) const DEFAULT_PAGE_SIZE: usize = 5;

/// Sentinel filter value that bypasses status/category filtering.
pub(crate) const FILTER_ALL: &str = "all";

/// Effective page size for list endpoints, taken from
/// `local_settings(ui/page_size)` with [`DEFAULT_PAGE_SIZE`] as fallback.
/// Zero or negative overrides are ignored.
pub(crate) fn configured_page_size(db: &DbState) -> usize {
    let Ok(conn) = db.conn.lock() else {
        return DEFAULT_PAGE_SIZE;
    };
    let size = db::get_setting_i64(&conn, "ui", "page_size", DEFAULT_PAGE_SIZE as i64);
    if size > 0 {
        size as usize
    } else {
        DEFAULT_PAGE_SIZE
    }
}

/// Case-insensitive substring match against one or more text fields.
///
/// An empty or whitespace-only query matches everything.
pub(crate) fn text_matches(fields: &[&str], query: &str) -> bool {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return true;
    }
    fields
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Exact enum-style match with the `"all"` sentinel bypassing the filter.
pub(crate) fn facet_matches(value: &str, filter: &str) -> bool {
    let filter = filter.trim();
    if filter.is_empty() || filter.eq_ignore_ascii_case(FILTER_ALL) {
        return true;
    }
    value.eq_ignore_ascii_case(filter)
}

/// Sort JSON rows newest-first by an RFC 3339 string field.
///
/// RFC 3339 timestamps compare correctly as strings. The sort is stable,
/// so rows with identical timestamps keep their insertion order.
pub(crate) fn sort_newest_first(rows: &mut [Value], field: &str) {
    rows.sort_by(|a, b| {
        let ta = a.get(field).and_then(Value::as_str).unwrap_or("");
        let tb = b.get(field).and_then(Value::as_str).unwrap_or("");
        tb.cmp(ta)
    });
}

/// One page of a list plus the navigation metadata the frontend needs to
/// render its pager without ever hitting an empty crash state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PagedResult<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
    pub has_prev: bool,
    pub has_next: bool,
}

/// Slice one 1-based page out of `items`.
///
/// `total_pages = ceil(L / page_size)`; a requested page below 1 or above
/// the last page is clamped to the nearest valid page. An empty list yields
/// page 1 of 0 with both pager controls disabled.
pub(crate) fn paginate<T>(items: Vec<T>, requested_page: i64, page_size: usize) -> PagedResult<T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);

    let last_page = total_pages.max(1);
    let page = if requested_page < 1 {
        1
    } else {
        (requested_page as usize).min(last_page)
    };

    let start = (page - 1) * page_size;
    let page_items: Vec<T> = items
        .into_iter()
        .skip(start)
        .take(page_size)
        .collect();

    PagedResult {
        has_prev: page > 1,
        has_next: page < total_pages,
        items: page_items,
        page,
        page_size,
        total_items,
        total_pages,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
