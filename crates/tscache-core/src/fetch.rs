//! Fetch callback contract.
//!
//! This module defines the [`Fetcher`] trait implemented by upstream data
//! sources (exchanges, news, social feeds). Any async closure of the right
//! shape is a fetcher too.

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::future::Future;

use crate::{
    error::Result,
    types::{CacheKey, DateRange, Parameters},
};

/// Retrieves raw rows for a key and date range from an upstream source.
///
/// Every returned row must carry a timestamp field (see
/// [`frame::TIMESTAMP_COLUMNS`](crate::frame::TIMESTAMP_COLUMNS)). Timeouts
/// and retries are the fetcher's responsibility; the cache calls each fetcher
/// at most once per gap and never retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches rows for `key` within `range` (inclusive).
    ///
    /// An empty frame means "no data"; it is not cached.
    async fn fetch(
        &self,
        key: &CacheKey,
        range: DateRange,
        parameters: &Parameters,
    ) -> Result<DataFrame>;
}

#[async_trait]
impl<F, Fut> Fetcher for F
where
    F: Fn(CacheKey, DateRange, Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<DataFrame>> + Send + 'static,
{
    async fn fetch(
        &self,
        key: &CacheKey,
        range: DateRange,
        parameters: &Parameters,
    ) -> Result<DataFrame> {
        (self)(key.clone(), range, parameters.clone()).await
    }
}
