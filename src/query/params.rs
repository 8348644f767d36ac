//! Store-agnostic query description: conditions, page size, cursor, direction.

use crate::error::{QueryError, Result};
use crate::query::condition::Condition;
use crate::query::cursor::PageKey;

/// Page size applied when the caller does not set one.
pub const DEFAULT_MAX_PAGE_SIZE: usize = 100;

/// Traversal direction over the sort key.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    /// Forward over the sort key.
    #[default]
    Ascending,
    /// Backward over the sort key.
    Descending,
}

impl SortOrder {
    /// Whether the store should traverse its index forward.
    pub fn is_forward(self) -> bool {
        matches!(self, SortOrder::Ascending)
    }
}

/// Immutable query parameters.
///
/// Conditions are unique by attribute and kept in insertion order; the order
/// is what makes access-path selection deterministic.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParams {
    conditions: Vec<Condition>,
    max_page_size: usize,
    cursor: Option<PageKey>,
    sort_order: SortOrder,
}

impl QueryParams {
    /// Starts a builder with defaults (page size 100, ascending, no cursor).
    pub fn builder() -> QueryParamsBuilder {
        QueryParamsBuilder::default()
    }

    /// Conditions in insertion order.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Looks up the condition attached to `attribute`.
    pub fn condition(&self, attribute: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.attribute() == attribute)
    }

    /// Position of the condition for `attribute` in insertion order.
    pub fn position(&self, attribute: &str) -> Option<usize> {
        self.conditions.iter().position(|c| c.attribute() == attribute)
    }

    /// Upper bound on the number of items requested per page.
    pub fn max_page_size(&self) -> usize {
        self.max_page_size
    }

    /// Cursor to resume from, if any.
    pub fn cursor(&self) -> Option<&PageKey> {
        self.cursor.as_ref()
    }

    /// Requested traversal direction.
    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            cursor: None,
            sort_order: SortOrder::Ascending,
        }
    }
}

/// Accumulates conditions and paging options. Not meant to be shared across threads
/// while being mutated; [`QueryParamsBuilder::build`] yields an immutable value.
#[derive(Clone, Debug, Default)]
pub struct QueryParamsBuilder {
    params: QueryParams,
}

impl QueryParamsBuilder {
    /// Adds a condition; a later condition on the same attribute replaces the
    /// earlier one in place.
    pub fn condition(mut self, condition: Condition) -> Self {
        match self.params.position(condition.attribute()) {
            Some(idx) => self.params.conditions[idx] = condition,
            None => self.params.conditions.push(condition),
        }
        self
    }

    /// Adds several conditions in order.
    pub fn conditions<I>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = Condition>,
    {
        conditions.into_iter().fold(self, Self::condition)
    }

    /// Sets the page-size bound.
    pub fn max_page_size(mut self, size: usize) -> Self {
        self.params.max_page_size = size;
        self
    }

    /// Sets the cursor to resume from.
    pub fn cursor(mut self, cursor: PageKey) -> Self {
        self.params.cursor = Some(cursor);
        self
    }

    /// Sets or clears the cursor.
    pub fn maybe_cursor(mut self, cursor: Option<PageKey>) -> Self {
        self.params.cursor = cursor;
        self
    }

    /// Sets the traversal direction.
    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.params.sort_order = order;
        self
    }

    /// Validates and freezes the parameters.
    pub fn build(self) -> Result<QueryParams> {
        if self.params.max_page_size == 0 {
            return Err(QueryError::InvalidParams("max page size must be greater than 0"));
        }
        Ok(self.params)
    }
}
