use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait, sea_query::OnConflict,
};
use tokio::sync::{Mutex, watch};
use tracing::{debug, warn};

use crate::{
    entities::{movie, rating},
    error::{AppError, AppResult},
    models::{MovieRecord, MovieStatus, RatingEntry, RatingOrigin, UserRating, WatchedMovie},
};

/// Durable storage for movies and the ratings attached to them.
#[async_trait]
pub trait MovieStore: Send + Sync {
    /// Insert or replace keyed by `id`. Existing ratings are kept.
    async fn upsert_movie(&self, movie: &MovieRecord) -> AppResult<()>;

    async fn upsert_movies(&self, movies: &[MovieRecord]) -> AppResult<()>;

    async fn get_movie(&self, id: i64) -> AppResult<Option<MovieRecord>>;

    async fn get_movies(&self, ids: &[i64]) -> AppResult<Vec<MovieRecord>>;

    /// Removes the movie together with all of its ratings.
    async fn delete_movie(&self, id: i64) -> AppResult<()>;

    /// Returns the id assigned to the new entry.
    async fn insert_rating(&self, entry: &RatingEntry) -> AppResult<i32>;

    async fn update_rating(&self, entry: &RatingEntry) -> AppResult<()>;

    async fn delete_rating(&self, id: i32) -> AppResult<()>;

    /// Newest first.
    async fn get_ratings_for_movie(&self, movie_id: i64) -> AppResult<Vec<RatingEntry>>;

    /// Saves imported `(movie, rating)` pairs in one transaction and returns
    /// how many were applied. A pair that fails is rolled back on its own and
    /// left out of the count. A movie that already carries a rating from the
    /// same source gets no second one, and a stored movie still waiting to be
    /// swiped is marked watched with the imported rating.
    async fn save_imported(&self, items: &[(MovieRecord, RatingEntry)]) -> AppResult<usize>;

    /// Movies with at least one rating, ordered by their latest rating, newest first.
    async fn watched_movies(&self) -> AppResult<Vec<WatchedMovie>>;

    /// Live view of [`MovieStore::watched_movies`], pushed after every write.
    fn observe_watched_movies(&self) -> watch::Receiver<Vec<WatchedMovie>>;
}

pub struct SqliteStore {
    db: DatabaseConnection,
    watched: watch::Sender<Vec<WatchedMovie>>,
    // Held across reload and send so an older snapshot never replaces a newer one.
    publish_lock: Mutex<()>,
}

impl SqliteStore {
    pub async fn open(db: DatabaseConnection) -> AppResult<Self> {
        let initial = load_watched(&db).await?;
        debug!(watched = initial.len(), "opened movie store");
        let (watched, _) = watch::channel(initial);
        Ok(Self { db, watched, publish_lock: Mutex::new(()) })
    }

    async fn publish_watched(&self) {
        let _guard = self.publish_lock.lock().await;
        match load_watched(&self.db).await {
            Ok(list) => {
                self.watched.send_replace(list);
            },
            Err(err) => warn!(error = %err, "failed to refresh watched movies"),
        }
    }
}

#[async_trait]
impl MovieStore for SqliteStore {
    async fn upsert_movie(&self, movie: &MovieRecord) -> AppResult<()> {
        upsert_one(&self.db, movie).await?;
        self.publish_watched().await;
        Ok(())
    }

    async fn upsert_movies(&self, movies: &[MovieRecord]) -> AppResult<()> {
        if movies.is_empty() {
            return Ok(());
        }

        let models = movies.iter().map(to_active_model).collect::<AppResult<Vec<_>>>()?;
        movie::Entity::insert_many(models).on_conflict(upsert_conflict()).exec(&self.db).await?;

        debug!(count = movies.len(), "upserted movies");
        self.publish_watched().await;
        Ok(())
    }

    async fn get_movie(&self, id: i64) -> AppResult<Option<MovieRecord>> {
        movie::Entity::find_by_id(id).one(&self.db).await?.map(to_record).transpose()
    }

    async fn get_movies(&self, ids: &[i64]) -> AppResult<Vec<MovieRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        movie::Entity::find()
            .filter(movie::Column::Id.is_in(ids.iter().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_record)
            .collect()
    }

    async fn delete_movie(&self, id: i64) -> AppResult<()> {
        let txn = self.db.begin().await?;

        rating::Entity::delete_many().filter(rating::Column::MovieId.eq(id)).exec(&txn).await?;
        movie::Entity::delete_by_id(id).exec(&txn).await?;

        txn.commit().await?;

        self.publish_watched().await;
        Ok(())
    }

    async fn insert_rating(&self, entry: &RatingEntry) -> AppResult<i32> {
        let id = insert_rating_row(&self.db, entry).await?;
        debug!(movie_id = entry.movie_id, rating_id = id, source = entry.source.as_code(), "inserted rating");

        self.publish_watched().await;
        Ok(id)
    }

    async fn update_rating(&self, entry: &RatingEntry) -> AppResult<()> {
        let Some(id) = entry.id else {
            return Err(AppError::InvalidInput("rating entry has no id".to_string()));
        };

        rating::ActiveModel {
            id: Set(id),
            movie_id: Set(entry.movie_id),
            user_rating: Set(entry.user_rating.into()),
            source: Set(entry.source.as_code().to_string()),
            rated_at: Set(entry.rated_at.as_millisecond()),
        }
        .update(&self.db)
        .await?;

        self.publish_watched().await;
        Ok(())
    }

    async fn delete_rating(&self, id: i32) -> AppResult<()> {
        rating::Entity::delete_by_id(id).exec(&self.db).await?;
        self.publish_watched().await;
        Ok(())
    }

    async fn get_ratings_for_movie(&self, movie_id: i64) -> AppResult<Vec<RatingEntry>> {
        rating::Entity::find()
            .filter(rating::Column::MovieId.eq(movie_id))
            .order_by_desc(rating::Column::RatedAt)
            .order_by_desc(rating::Column::Id)
            .all(&self.db)
            .await?
            .into_iter()
            .map(to_entry)
            .collect()
    }

    async fn save_imported(&self, items: &[(MovieRecord, RatingEntry)]) -> AppResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let txn = self.db.begin().await?;
        let mut saved = 0;

        for (movie, entry) in items {
            let item = txn.begin().await?;
            match save_imported_one(&item, movie, entry).await {
                Ok(()) => {
                    item.commit().await?;
                    saved += 1;
                },
                Err(err) => {
                    warn!(movie_id = movie.id, error = %err, "failed to save imported rating");
                    item.rollback().await?;
                },
            }
        }

        txn.commit().await?;
        debug!(count = items.len(), saved = saved, "saved import batch");

        self.publish_watched().await;
        Ok(saved)
    }

    async fn watched_movies(&self) -> AppResult<Vec<WatchedMovie>> {
        load_watched(&self.db).await
    }

    fn observe_watched_movies(&self) -> watch::Receiver<Vec<WatchedMovie>> {
        self.watched.subscribe()
    }
}

async fn load_watched(db: &DatabaseConnection) -> AppResult<Vec<WatchedMovie>> {
    let ratings = rating::Entity::find()
        .order_by_desc(rating::Column::RatedAt)
        .order_by_desc(rating::Column::Id)
        .all(db)
        .await?;

    let mut seen = HashSet::new();
    let latest: Vec<rating::Model> =
        ratings.into_iter().filter(|r| seen.insert(r.movie_id)).collect();

    let mut movies: HashMap<i64, movie::Model> = movie::Entity::find()
        .filter(movie::Column::Id.is_in(latest.iter().map(|r| r.movie_id)))
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.id, m))
        .collect();

    let mut out = Vec::with_capacity(latest.len());
    for row in latest {
        let Some(model) = movies.remove(&row.movie_id) else {
            continue;
        };
        let entry = to_entry(row)?;
        let mut movie = to_record(model)?;
        movie.user_rating = Some(entry.user_rating);
        out.push(WatchedMovie { movie, latest_rating: entry.user_rating, rated_at: entry.rated_at });
    }

    Ok(out)
}

async fn upsert_one<C: ConnectionTrait>(conn: &C, movie: &MovieRecord) -> AppResult<()> {
    movie::Entity::insert(to_active_model(movie)?).on_conflict(upsert_conflict()).exec(conn).await?;
    Ok(())
}

async fn insert_rating_row<C: ConnectionTrait>(conn: &C, entry: &RatingEntry) -> AppResult<i32> {
    let model = rating::ActiveModel {
        id: Default::default(),
        movie_id: Set(entry.movie_id),
        user_rating: Set(entry.user_rating.into()),
        source: Set(entry.source.as_code().to_string()),
        rated_at: Set(entry.rated_at.as_millisecond()),
    };
    Ok(rating::Entity::insert(model).exec(conn).await?.last_insert_id)
}

async fn save_imported_one<C: ConnectionTrait>(
    conn: &C,
    movie: &MovieRecord,
    entry: &RatingEntry,
) -> AppResult<()> {
    let Some(existing) = movie::Entity::find_by_id(movie.id).one(conn).await? else {
        upsert_one(conn, movie).await?;
        insert_rating_row(conn, entry).await?;
        return Ok(());
    };

    let already_rated = rating::Entity::find()
        .filter(rating::Column::MovieId.eq(movie.id))
        .filter(rating::Column::Source.eq(entry.source.as_code()))
        .one(conn)
        .await?
        .is_some();
    if already_rated {
        debug!(movie_id = movie.id, source = entry.source.as_code(), "rating already present");
        return Ok(());
    }

    let stored = to_record(existing)?;
    if stored.status.is_swipeable() {
        upsert_one(conn, &stored.watched(entry.user_rating)).await?;
    }
    insert_rating_row(conn, entry).await?;
    Ok(())
}

fn upsert_conflict() -> OnConflict {
    OnConflict::column(movie::Column::Id)
        .update_columns([
            movie::Column::Title,
            movie::Column::Overview,
            movie::Column::Year,
            movie::Column::Genres,
            movie::Column::ExternalRating,
            movie::Column::PosterUrl,
            movie::Column::Status,
            movie::Column::UserRating,
            movie::Column::UpdatedAt,
        ])
        .to_owned()
}

fn to_active_model(movie: &MovieRecord) -> AppResult<movie::ActiveModel> {
    let genres = serde_json::to_string(&movie.genres).map_err(corrupt)?;
    Ok(movie::ActiveModel {
        id: Set(movie.id),
        title: Set(movie.title.clone()),
        overview: Set(movie.overview.clone()),
        year: Set(movie.year),
        genres: Set(genres),
        external_rating: Set(movie.external_rating),
        poster_url: Set(movie.poster_url.clone()),
        status: Set(movie.status.as_code().to_string()),
        user_rating: Set(movie.user_rating.map(i32::from)),
        updated_at: Set(jiff::Timestamp::now().as_millisecond()),
    })
}

fn to_record(model: movie::Model) -> AppResult<MovieRecord> {
    let genres: Vec<String> = serde_json::from_str(&model.genres).map_err(corrupt)?;
    let status = MovieStatus::from_code(&model.status)
        .ok_or_else(|| corrupt(format!("unknown movie status {:?}", model.status)))?;
    let user_rating = model
        .user_rating
        .map(|r| UserRating::new(r).ok_or_else(|| corrupt(format!("rating {r} out of range"))))
        .transpose()?;

    Ok(MovieRecord {
        id: model.id,
        title: model.title,
        overview: model.overview,
        year: model.year,
        genres,
        external_rating: model.external_rating,
        status,
        user_rating,
        poster_url: model.poster_url,
    })
}

fn to_entry(model: rating::Model) -> AppResult<RatingEntry> {
    let user_rating = UserRating::new(model.user_rating)
        .ok_or_else(|| corrupt(format!("rating {} out of range", model.user_rating)))?;
    let source = RatingOrigin::from_code(&model.source)
        .ok_or_else(|| corrupt(format!("unknown rating source {:?}", model.source)))?;
    let rated_at = jiff::Timestamp::from_millisecond(model.rated_at).map_err(corrupt)?;

    Ok(RatingEntry { id: Some(model.id), movie_id: model.movie_id, user_rating, source, rated_at })
}

fn corrupt(err: impl ToString) -> AppError {
    AppError::Persistence(DbErr::Custom(err.to_string()))
}
