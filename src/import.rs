use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    error::{AppError, AppResult},
    models::{ExternalRating, ImportResult, MovieRecord, RatingEntry, RatingOrigin},
    scraper::parse_title_and_year,
    store::MovieStore,
};

/// External service holding a user's previously rated films.
#[async_trait]
pub trait RatingSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_ratings(&self, username: &str) -> AppResult<Vec<ExternalRating>>;
}

/// Progress of the import flow as seen by clients.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ImportState {
    #[default]
    Idle,
    Running { current: usize, total: usize },
    Finished { result: ImportResult },
    Failed { message: String },
}

impl ImportState {
    pub fn is_running(&self) -> bool {
        matches!(self, ImportState::Running { .. })
    }
}

impl From<ImportResult> for ImportState {
    fn from(result: ImportResult) -> Self {
        if result.success {
            ImportState::Finished { result }
        } else {
            ImportState::Failed { message: result.message }
        }
    }
}

/// Matched ratings saved per store transaction.
const SAVE_CHUNK: usize = 50;

pub struct ImportService {
    source: Arc<dyn RatingSource>,
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn MovieStore>,
}

impl ImportService {
    pub fn new(
        source: Arc<dyn RatingSource>,
        catalog: Arc<dyn Catalog>,
        store: Arc<dyn MovieStore>,
    ) -> Self {
        Self { source, catalog, store }
    }

    /// Imports every rating the source has for `username`.
    ///
    /// Never fails outright: source errors and empty results come back as an
    /// unsuccessful [`ImportResult`]. `on_progress(current, total)` is called
    /// before each item with a 1-based `current`.
    pub async fn import<F>(&self, username: &str, mut on_progress: F) -> ImportResult
    where
        F: FnMut(usize, usize) + Send,
    {
        let username = username.trim();
        if username.is_empty() {
            return ImportResult::failure("username is required");
        }

        let ratings = match self.fetch(username).await {
            Ok(ratings) => ratings,
            Err(err) => {
                warn!(username = %username, source = self.source.name(), error = %err, "import fetch failed");
                return ImportResult::failure(err.to_string());
            },
        };

        let total = ratings.len();
        let mut imported_count = 0;
        let mut skipped_count = 0;
        let mut pending = Vec::with_capacity(SAVE_CHUNK);

        for (idx, rating) in ratings.iter().enumerate() {
            on_progress(idx + 1, total);

            match self.match_rating(rating).await {
                Ok(Some(matched)) => pending.push(matched),
                Ok(None) => {
                    debug!(title = %rating.title, "no catalog match");
                    skipped_count += 1;
                },
                Err(err) => {
                    warn!(title = %rating.title, error = %err, "failed to match rating");
                    skipped_count += 1;
                },
            }

            if pending.len() >= SAVE_CHUNK {
                let (saved, failed) = self.save(&mut pending).await;
                imported_count += saved;
                skipped_count += failed;
            }
        }

        let (saved, failed) = self.save(&mut pending).await;
        imported_count += saved;
        skipped_count += failed;

        info!(username = %username, imported = imported_count, skipped = skipped_count, "import finished");

        ImportResult {
            success: true,
            imported_count,
            skipped_count,
            message: format!("Imported {imported_count} films from {}", self.source.name()),
        }
    }

    async fn fetch(&self, username: &str) -> AppResult<Vec<ExternalRating>> {
        let ratings = self.source.fetch_ratings(username).await?;
        if ratings.is_empty() {
            return Err(AppError::Import(format!("no rated films found for user: {username}")));
        }
        debug!(username = %username, count = ratings.len(), "fetched external ratings");
        Ok(ratings)
    }

    async fn match_rating(&self, rating: &ExternalRating) -> AppResult<Option<(MovieRecord, RatingEntry)>> {
        let (title, year) = parse_title_and_year(&rating.title);

        let results = self.catalog.search_title(title).await?;
        Ok(best_match(results, year).map(|matched| {
            let entry = RatingEntry::now(matched.id, rating.rating, RatingOrigin::Letterboxd);
            (matched.watched(rating.rating), entry)
        }))
    }

    /// Drains `pending` into the store; returns `(saved, failed)`.
    async fn save(&self, pending: &mut Vec<(MovieRecord, RatingEntry)>) -> (usize, usize) {
        if pending.is_empty() {
            return (0, 0);
        }

        let batch = std::mem::take(pending);
        match self.store.save_imported(&batch).await {
            Ok(saved) => (saved, batch.len() - saved),
            Err(err) => {
                warn!(count = batch.len(), error = %err, "failed to save import batch");
                (0, batch.len())
            },
        }
    }
}

/// First result whose year agrees with `year`; an unknown year on either
/// side counts as agreement. Falls back to the first result.
fn best_match(results: Vec<MovieRecord>, year: Option<i32>) -> Option<MovieRecord> {
    let pos = results
        .iter()
        .position(|m| match (year, m.year) {
            (Some(wanted), Some(found)) => wanted == found,
            _ => true,
        })
        .unwrap_or(0);
    results.into_iter().nth(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::MovieStatus,
        testing::{FailingStore, StubCatalog, StubRatingSource, memory_store, rating, sample_movie},
    };

    fn external(title: &str, value: i32) -> ExternalRating {
        ExternalRating { title: title.to_string(), rating: rating(value) }
    }

    async fn service(
        source: StubRatingSource,
        catalog: StubCatalog,
    ) -> (ImportService, Arc<crate::store::SqliteStore>) {
        let store = Arc::new(memory_store().await);
        let service = ImportService::new(Arc::new(source), Arc::new(catalog), store.clone());
        (service, store)
    }

    #[tokio::test]
    async fn test_import_counts_matched_and_skipped() {
        let source = StubRatingSource::new(vec![
            external("The Matrix (1999)", 9),
            external("Nonexistent Film (2031)", 4),
        ]);
        let catalog = StubCatalog::new(vec![sample_movie(603, "The Matrix", Some(1999))]);
        let (service, store) = service(source, catalog).await;

        let mut progress = Vec::new();
        let result = service.import("cinephile", |current, total| progress.push((current, total))).await;

        assert!(result.success);
        assert_eq!(result.imported_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(progress, vec![(1, 2), (2, 2)]);

        let stored = store.get_movie(603).await.unwrap().unwrap();
        assert_eq!(stored.status, MovieStatus::WatchedRated);
        assert_eq!(stored.user_rating, Some(rating(9)));
        let ratings = store.get_ratings_for_movie(603).await.unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[0].source, RatingOrigin::Letterboxd);
    }

    #[tokio::test]
    async fn test_existing_movie_gets_single_letterboxd_rating() {
        let source = StubRatingSource::new(vec![external("Whiplash (2014)", 10)]);
        let catalog = StubCatalog::new(vec![sample_movie(244786, "Whiplash", Some(2014))]);
        let (service, store) = service(source, catalog).await;

        let local = sample_movie(244786, "Whiplash", Some(2014)).watched(rating(8));
        store.upsert_movie(&local).await.unwrap();
        store.insert_rating(&RatingEntry::now(244786, rating(8), RatingOrigin::Local)).await.unwrap();

        let first = service.import("cinephile", |_, _| {}).await;
        let second = service.import("cinephile", |_, _| {}).await;

        assert_eq!(first.imported_count, 1);
        assert_eq!(second.imported_count, 1);
        let ratings = store.get_ratings_for_movie(244786).await.unwrap();
        assert_eq!(ratings.len(), 2);
        assert_eq!(ratings.iter().filter(|r| r.source == RatingOrigin::Letterboxd).count(), 1);
        // the stored record itself is left alone
        assert_eq!(store.get_movie(244786).await.unwrap(), Some(local));
    }

    #[tokio::test]
    async fn test_import_marks_unswiped_deck_movie_watched() {
        let source = StubRatingSource::new(vec![external("Whiplash (2014)", 10)]);
        let catalog = StubCatalog::new(vec![sample_movie(244786, "Whiplash", Some(2014))]);
        let (service, store) = service(source, catalog).await;
        store.upsert_movie(&sample_movie(244786, "Whiplash", Some(2014))).await.unwrap();

        let result = service.import("cinephile", |_, _| {}).await;

        assert_eq!(result.imported_count, 1);
        let stored = store.get_movie(244786).await.unwrap().unwrap();
        assert_eq!(stored.status, MovieStatus::WatchedRated);
        assert_eq!(stored.user_rating, Some(rating(10)));
    }

    #[tokio::test]
    async fn test_large_import_saves_every_chunk() {
        let count = SAVE_CHUNK * 2 + 3;
        let movies: Vec<MovieRecord> =
            (1..=count as i64).map(|id| sample_movie(id, &format!("Film {id}"), Some(2000))).collect();
        let ratings = (1..=count).map(|id| external(&format!("Film {id} (2000)"), 7)).collect();
        let (service, store) = service(StubRatingSource::new(ratings), StubCatalog::new(movies)).await;

        let result = service.import("cinephile", |_, _| {}).await;

        assert_eq!(result.imported_count, count);
        assert_eq!(result.skipped_count, 0);
        assert_eq!(store.watched_movies().await.unwrap().len(), count);
        assert_eq!(store.observe_watched_movies().borrow().len(), count);
    }

    #[tokio::test]
    async fn test_store_failure_counts_matches_as_skipped() {
        let source = StubRatingSource::new(vec![external("The Matrix (1999)", 9)]);
        let catalog = StubCatalog::new(vec![sample_movie(603, "The Matrix", Some(1999))]);
        let service = ImportService::new(
            Arc::new(source),
            Arc::new(catalog),
            Arc::new(FailingStore::default()),
        );

        let result = service.import("cinephile", |_, _| {}).await;

        assert!(result.success);
        assert_eq!(result.imported_count, 0);
        assert_eq!(result.skipped_count, 1);
    }

    #[tokio::test]
    async fn test_empty_source_is_failure() {
        let (service, _store) = service(StubRatingSource::new(vec![]), StubCatalog::new(vec![])).await;

        let result = service.import("nobody", |_, _| {}).await;

        assert!(!result.success);
        assert_eq!(result.imported_count, 0);
        assert!(result.message.contains("nobody"));
    }

    #[tokio::test]
    async fn test_source_error_is_failure() {
        let (service, _store) = service(StubRatingSource::failing(), StubCatalog::new(vec![])).await;

        let result = service.import("cinephile", |_, _| {}).await;

        assert!(!result.success);
        assert!(matches!(ImportState::from(result), ImportState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_blank_username_is_rejected() {
        let (service, _store) = service(StubRatingSource::new(vec![]), StubCatalog::new(vec![])).await;
        let result = service.import("   ", |_, _| {}).await;
        assert_eq!(result, ImportResult::failure("username is required"));
    }

    #[test]
    fn test_best_match_prefers_same_year() {
        let results = vec![
            sample_movie(1, "Dune", Some(2021)),
            sample_movie(2, "Dune", Some(1984)),
        ];
        assert_eq!(best_match(results.clone(), Some(1984)).map(|m| m.id), Some(2));
        assert_eq!(best_match(results.clone(), None).map(|m| m.id), Some(1));
        assert_eq!(best_match(results, Some(2000)).map(|m| m.id), Some(1));
        assert_eq!(best_match(vec![], Some(2000)), None);
    }

    #[test]
    fn test_best_match_unknown_result_year_counts_as_match() {
        let results = vec![sample_movie(1, "Dune", Some(2021)), sample_movie(2, "Dune", None)];
        assert_eq!(best_match(results, Some(1984)).map(|m| m.id), Some(2));
    }
}
