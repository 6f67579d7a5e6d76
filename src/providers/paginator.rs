use std::future::Future;

use crate::error::{Error, Result};

/// Hard stop so a misbehaving server can never keep a fetch looping.
pub const MAX_PAGES: u32 = 200;

/// One page of a numbered listing.
pub struct Page<T> {
    pub items: Vec<T>,
    /// `Some` when the server says explicitly whether another page exists
    /// (e.g. a `Link: rel="next"` header).
    pub has_next: Option<bool>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            has_next: None,
        }
    }

    pub fn with_next(items: Vec<T>, has_next: bool) -> Self {
        Self {
            items,
            has_next: Some(has_next),
        }
    }
}

/// Fetches numbered pages starting at 1 until the listing is exhausted.
///
/// The listing ends on an explicit `has_next == Some(false)`, an empty page,
/// or a page shorter than `per_page`.
pub async fn fetch_all_pages<T, F, Fut>(per_page: usize, fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    fetch_pages_up_to(per_page, MAX_PAGES, fetch_page).await
}

/// `fetch_all_pages` with a caller-chosen page cap, for listings that are
/// legitimately long (e.g. a year of activity events).
pub async fn fetch_pages_up_to<T, F, Fut>(
    per_page: usize,
    max_pages: u32,
    mut fetch_page: F,
) -> Result<Vec<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut all_items = Vec::new();

    for page in 1..=max_pages {
        let Page { items, has_next } = fetch_page(page).await?;
        let items_count = items.len();
        all_items.extend(items);

        let exhausted = match has_next {
            Some(has_next) => !has_next || items_count == 0,
            None => items_count < per_page,
        };
        if exhausted {
            return Ok(all_items);
        }
        tracing::debug!("Fetched page {} ({} items so far)", page, all_items.len());
    }

    Err(Error::ResponseMalformed(format!(
        "listing did not end after {} pages",
        max_pages
    )))
}

/// One page of a cursor-based listing.
pub struct CursorPage<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// Follows opaque cursors until the server returns none.
pub async fn fetch_all_cursors<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<CursorPage<T>>>,
{
    let mut all_items = Vec::new();
    let mut cursor = None;

    for _ in 0..MAX_PAGES {
        let CursorPage { items, next_cursor } = fetch_page(cursor.take()).await?;
        all_items.extend(items);

        match next_cursor {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => return Ok(all_items),
        }
    }

    Err(Error::ResponseMalformed(format!(
        "cursor listing did not end after {} pages",
        MAX_PAGES
    )))
}

/// Whether a `Link` header advertises a next page.
pub fn link_has_next(link: Option<&str>) -> bool {
    link.map(|v| v.contains("rel=\"next\"")).unwrap_or(false)
}
