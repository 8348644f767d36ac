//! One page of retrieved items.

use crate::query::cursor::PageKey;

/// Items of one page, the cursor for the next page, and the truncation hint.
///
/// `truncated` is a heuristic: for key-value retrievals it is `true` exactly
/// when the page came back full (`items.len() == max_page_size`). A full page
/// does not prove more data exists, and a short page can still carry a
/// `next_key` when the store stopped early; callers should keep paging while
/// `next_key` is present.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult<T> {
    items: Vec<T>,
    next_key: Option<PageKey>,
    truncated: bool,
}

impl<T> QueryResult<T> {
    /// Assembles a result with an explicit truncation flag.
    pub fn new(items: Vec<T>, next_key: Option<PageKey>, truncated: bool) -> Self {
        Self {
            items,
            next_key,
            truncated,
        }
    }

    /// Assembles a result applying the full-page truncation heuristic.
    pub fn from_page(items: Vec<T>, next_key: Option<PageKey>, max_page_size: usize) -> Self {
        let truncated = items.len() == max_page_size;
        Self::new(items, next_key, truncated)
    }

    /// Items in store order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consumes the result, returning its items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// Cursor for the next page, absent when the store reported none.
    pub fn next_key(&self) -> Option<&PageKey> {
        self.next_key.as_ref()
    }

    /// Truncation hint (see type docs).
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Transforms every item, keeping cursor and truncation untouched.
    pub fn map<U, F>(self, f: F) -> QueryResult<U>
    where
        F: FnMut(T) -> U,
    {
        QueryResult {
            items: self.items.into_iter().map(f).collect(),
            next_key: self.next_key,
            truncated: self.truncated,
        }
    }
}
