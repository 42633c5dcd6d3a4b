//! Test doubles shared by the unit tests.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use axum::Router;
use sea_orm::DbErr;
use tokio::sync::watch;

use crate::{
    catalog::Catalog,
    db,
    error::{AppError, AppResult},
    import::RatingSource,
    models::{ExternalRating, MovieFilter, MovieRecord, RatingEntry, UserRating, WatchedMovie},
    store::{MovieStore, SqliteStore},
};

/// Serves `router` on an ephemeral local port and returns its base url.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub async fn memory_store() -> SqliteStore {
    let db = db::connect_and_migrate("sqlite::memory:").await.unwrap();
    SqliteStore::open(db).await.unwrap()
}

pub fn rating(value: i32) -> UserRating {
    UserRating::new(value).unwrap()
}

pub fn sample_movie(id: i64, title: &str, year: Option<i32>) -> MovieRecord {
    let mut movie = MovieRecord::new(id, title).with_genres(["Drama"]);
    movie.year = year;
    movie
}

/// Serves a fixed list; title filters match case-insensitively.
pub struct StubCatalog {
    movies: Vec<MovieRecord>,
    failing: AtomicBool,
}

impl StubCatalog {
    pub fn new(movies: Vec<MovieRecord>) -> Self {
        Self { movies, failing: AtomicBool::new(false) }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> AppResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Fetch("catalog unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for StubCatalog {
    async fn fetch_by_filter(&self, filter: &MovieFilter, count: usize) -> AppResult<Vec<MovieRecord>> {
        self.check()?;
        let needle = filter.title.to_lowercase();
        Ok(self
            .movies
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&needle))
            .filter(|m| filter.accepts_year(m.year))
            .take(count)
            .cloned()
            .collect())
    }

    async fn fetch_random(&self, count: usize) -> AppResult<Vec<MovieRecord>> {
        self.check()?;
        Ok(self.movies.iter().take(count).cloned().collect())
    }

    async fn fetch_genres(&self) -> AppResult<BTreeMap<i32, String>> {
        self.check()?;
        Ok(BTreeMap::from([(18, "Drama".to_string()), (28, "Action".to_string())]))
    }

    async fn search_title(&self, title: &str) -> AppResult<Vec<MovieRecord>> {
        self.check()?;
        let needle = title.to_lowercase();
        Ok(self.movies.iter().filter(|m| m.title.to_lowercase() == needle).cloned().collect())
    }
}

/// A store whose every write and read fails.
pub struct FailingStore {
    watched: watch::Sender<Vec<WatchedMovie>>,
}

impl Default for FailingStore {
    fn default() -> Self {
        Self { watched: watch::channel(Vec::new()).0 }
    }
}

fn unavailable<T>() -> AppResult<T> {
    Err(AppError::Persistence(DbErr::Custom("disk full".to_string())))
}

#[async_trait]
impl MovieStore for FailingStore {
    async fn upsert_movie(&self, _movie: &MovieRecord) -> AppResult<()> {
        unavailable()
    }

    async fn upsert_movies(&self, _movies: &[MovieRecord]) -> AppResult<()> {
        unavailable()
    }

    async fn get_movie(&self, _id: i64) -> AppResult<Option<MovieRecord>> {
        unavailable()
    }

    async fn get_movies(&self, _ids: &[i64]) -> AppResult<Vec<MovieRecord>> {
        unavailable()
    }

    async fn delete_movie(&self, _id: i64) -> AppResult<()> {
        unavailable()
    }

    async fn insert_rating(&self, _entry: &RatingEntry) -> AppResult<i32> {
        unavailable()
    }

    async fn update_rating(&self, _entry: &RatingEntry) -> AppResult<()> {
        unavailable()
    }

    async fn delete_rating(&self, _id: i32) -> AppResult<()> {
        unavailable()
    }

    async fn get_ratings_for_movie(&self, _movie_id: i64) -> AppResult<Vec<RatingEntry>> {
        unavailable()
    }

    async fn save_imported(&self, _items: &[(MovieRecord, RatingEntry)]) -> AppResult<usize> {
        unavailable()
    }

    async fn watched_movies(&self) -> AppResult<Vec<WatchedMovie>> {
        unavailable()
    }

    fn observe_watched_movies(&self) -> watch::Receiver<Vec<WatchedMovie>> {
        self.watched.subscribe()
    }
}

pub struct StubRatingSource {
    ratings: Option<Vec<ExternalRating>>,
}

impl StubRatingSource {
    pub fn new(ratings: Vec<ExternalRating>) -> Self {
        Self { ratings: Some(ratings) }
    }

    pub fn failing() -> Self {
        Self { ratings: None }
    }
}

#[async_trait]
impl RatingSource for StubRatingSource {
    fn name(&self) -> &str {
        "stub"
    }

    async fn fetch_ratings(&self, _username: &str) -> AppResult<Vec<ExternalRating>> {
        self.ratings.clone().ok_or_else(|| AppError::Import("source unreachable".to_string()))
    }
}

/// Crashes mid-import.
pub struct PanickingRatingSource;

#[async_trait]
impl RatingSource for PanickingRatingSource {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn fetch_ratings(&self, _username: &str) -> AppResult<Vec<ExternalRating>> {
        panic!("rating source crashed")
    }
}
