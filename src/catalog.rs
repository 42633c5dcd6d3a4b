use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::{
    error::AppResult,
    models::{MovieFilter, MovieRecord},
};

/// Remote source of movie candidates.
///
/// Implementations are fail-soft: a partially failed fetch returns whatever
/// was retrieved. An `Err` means nothing usable could be fetched at all.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Candidates matching `filter`, at most `count` of them.
    async fn fetch_by_filter(&self, filter: &MovieFilter, count: usize)
    -> AppResult<Vec<MovieRecord>>;

    /// An unconstrained random sample of at most `count` candidates.
    async fn fetch_random(&self, count: usize) -> AppResult<Vec<MovieRecord>>;

    /// Genre id to display name.
    async fn fetch_genres(&self) -> AppResult<BTreeMap<i32, String>>;

    /// First page of a plain title search, in catalog relevance order.
    async fn search_title(&self, title: &str) -> AppResult<Vec<MovieRecord>>;
}
