//! Result Shaping
//!
//! Turns a raw engine page into what the caller is told: the visible items, the
//! `total`, and whether another page is worth requesting.
//!
//! `has_more` is decided on the raw engine page, before any narrowing, so dropping
//! items here can never hide a page that still holds data. A wasted empty page is
//! acceptable; a silently truncated walk is not.

use super::types::MediaItem;

/// Whether another page may hold records the caller has not seen.
///
/// True when the engine filled the page and its total exceeds this page. The
/// caller-supplied page number is not consulted; it is not tied to the continuation
/// key. An exhausted walk may therefore end with one empty page.
pub fn has_more(fetched: usize, limit: usize, engine_total: u64) -> bool {
    limit > 0 && fetched == limit && engine_total > fetched as u64
}

/// Drops items whose media type does not match the filter.
pub fn narrow(items: Vec<MediaItem>, type_filter: Option<&str>) -> Vec<MediaItem> {
    let Some(filter) = type_filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return items;
    };

    items
        .into_iter()
        .filter(|item| {
            item.db
                .as_deref()
                .is_some_and(|db| db.trim().eq_ignore_ascii_case(filter))
        })
        .collect()
}

/// The `total` reported after narrowing.
///
/// - nothing dropped: the engine's total;
/// - small result set (first page, everything fit in it): the exact retained count;
/// - otherwise: the engine total scaled by this page's retention ratio, rounded up,
///   never below what this page retained and never above the engine total.
pub fn narrowed_total(
    engine_total: u64,
    fetched: usize,
    retained: usize,
    limit: usize,
    page: u32,
) -> u64 {
    if retained >= fetched || fetched == 0 {
        return engine_total;
    }

    let small = page <= 1 && engine_total <= limit as u64 && fetched as u64 >= engine_total;
    if small {
        return retained as u64;
    }

    let fetched = fetched as u64;
    let retained = retained as u64;
    let estimate = engine_total.saturating_mul(retained).div_ceil(fetched);
    estimate.clamp(retained, engine_total.max(retained))
}
