//! Listing strategy for object stores.
//!
//! Object stores only support prefix listings, so the only condition that
//! narrows the read is the one on the configured prefix field. Cursors are
//! opaque continuation tokens and `truncated` is the flag the store reports.

use tracing::debug;

use crate::error::{QueryError, Result};
use crate::query::cursor::{PageKey, NEXT_TOKEN};
use crate::query::params::QueryParams;
use crate::query::result::QueryResult;
use crate::store::{ListRequest, ObjectLister, ObjectSummary};

/// Maps [`QueryParams`] onto a prefix listing of one bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingStrategy {
    bucket: String,
    prefix_field: Option<String>,
    delimiter: Option<String>,
}

impl ListingStrategy {
    /// Lists `bucket` without a prefix field or delimiter.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix_field: None,
            delimiter: None,
        }
    }

    /// Uses the condition on `field` as the key prefix.
    pub fn with_prefix_field(mut self, field: impl Into<String>) -> Self {
        self.prefix_field = Some(field.into());
        self
    }

    /// Rolls keys up to `delimiter`.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    /// Bucket being listed.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Builds the listing request for `params`.
    pub fn request(&self, params: &QueryParams) -> Result<ListRequest> {
        let continuation_token = match params.cursor() {
            None => None,
            Some(PageKey::Token(token)) => Some(token.clone()),
            Some(PageKey::Keys(keys)) => match keys.get(NEXT_TOKEN).and_then(|v| v.as_str()) {
                Some(token) => Some(token.to_string()),
                None => {
                    return Err(QueryError::InvalidParams(
                        "listing cursors must carry a continuation token",
                    ))
                }
            },
        };
        let prefix = self
            .prefix_field
            .as_deref()
            .and_then(|field| params.condition(field))
            .and_then(|cond| cond.value())
            .map(|value| value.to_plain_string());
        Ok(ListRequest {
            bucket: self.bucket.clone(),
            prefix,
            delimiter: self.delimiter.clone(),
            max_keys: params.max_page_size(),
            continuation_token,
        })
    }

    /// Lists one page of objects.
    pub fn execute<L>(&self, lister: &L, params: &QueryParams) -> Result<QueryResult<ObjectSummary>>
    where
        L: ObjectLister + ?Sized,
    {
        let request = self.request(params)?;
        debug!(
            bucket = %self.bucket,
            prefix = request.prefix.as_deref(),
            resumed = request.continuation_token.is_some(),
            "keyway.listing.request"
        );
        let page = lister.list(&request)?;
        Ok(QueryResult::new(
            page.objects,
            page.next_continuation_token.map(PageKey::Token),
            page.is_truncated,
        ))
    }
}
