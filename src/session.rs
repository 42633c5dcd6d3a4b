//! Swipe deck and per-session like/dislike bookkeeping.
//!
//! Liked and disliked ids live only as long as the [`SwipeSession`]; they are
//! never persisted and start empty again after a restart.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use rand::{SeedableRng, rngs::StdRng, seq::IndexedRandom};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    catalog::Catalog,
    error::AppResult,
    models::{MovieFilter, MovieRecord, MovieStatus, RatingEntry, RatingOrigin, UserRating},
    store::MovieStore,
};

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum DeckState {
    Loading,
    /// No candidate left in the current deck.
    Empty,
    Ready(MovieRecord),
    /// The last deck load failed; retrying is allowed.
    Error(String),
}

impl DeckState {
    pub fn current(&self) -> Option<&MovieRecord> {
        match self {
            DeckState::Ready(movie) => Some(movie),
            DeckState::Loading | DeckState::Empty | DeckState::Error(_) => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct SessionStats {
    pub liked: usize,
    pub disliked: usize,
    pub decided: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct SessionOptions {
    pub deck_size: usize,
    /// Also store `Blacklisted` when the user blacklists a movie.
    pub persist_blacklist: bool,
    /// Fixed seed for candidate selection; OS entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { deck_size: 50, persist_blacklist: false, seed: None }
    }
}

pub struct SwipeSession {
    catalog: Arc<dyn Catalog>,
    store: Arc<dyn MovieStore>,
    options: SessionOptions,
    rng: StdRng,
    deck: Vec<MovieRecord>,
    liked: HashSet<i64>,
    disliked: HashSet<i64>,
    history: Vec<MovieRecord>,
    last_filter: Option<MovieFilter>,
    state: watch::Sender<DeckState>,
}

impl SwipeSession {
    pub fn new(catalog: Arc<dyn Catalog>, store: Arc<dyn MovieStore>, options: SessionOptions) -> Self {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let (state, _) = watch::channel(DeckState::Loading);

        Self {
            catalog,
            store,
            options,
            rng,
            deck: Vec::new(),
            liked: HashSet::new(),
            disliked: HashSet::new(),
            history: Vec::new(),
            last_filter: None,
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DeckState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DeckState {
        self.state.borrow().clone()
    }

    pub fn deck(&self) -> &[MovieRecord] {
        &self.deck
    }

    pub fn liked_ids(&self) -> &HashSet<i64> {
        &self.liked
    }

    pub fn disliked_ids(&self) -> &HashSet<i64> {
        &self.disliked
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            liked: self.liked.len(),
            disliked: self.disliked.len(),
            decided: self.history.len(),
        }
    }

    /// Replaces the deck with a fresh fetch and picks a new current movie.
    ///
    /// Fetched records are stored keyed by id once stored decisions have
    /// been applied to them. Session decisions and history carry over. On
    /// failure the previous deck is kept and the state becomes
    /// [`DeckState::Error`].
    pub async fn load_deck(&mut self, filter: Option<MovieFilter>) {
        self.state.send_replace(DeckState::Loading);

        let filter = filter.filter(|f| !f.is_empty());
        let fetched = match &filter {
            Some(filter) => self.catalog.fetch_by_filter(filter, self.options.deck_size).await,
            None => self.catalog.fetch_random(self.options.deck_size).await,
        };
        self.last_filter = filter;

        match fetched {
            Ok(mut movies) => {
                self.hydrate(&mut movies).await;
                if let Err(err) = self.store.upsert_movies(&movies).await {
                    warn!(count = movies.len(), error = %err, "failed to store fetched deck");
                }
                info!(count = movies.len(), filtered = self.last_filter.is_some(), "deck loaded");
                self.deck = movies;
                self.select_next();
            },
            Err(err) => {
                warn!(error = %err, "deck load failed");
                self.state.send_replace(DeckState::Error(err.to_string()));
            },
        }
    }

    pub async fn apply_filter(&mut self, filter: MovieFilter) {
        self.load_deck(Some(filter)).await;
    }

    /// Reloads with whatever filter the last load used.
    pub async fn retry(&mut self) {
        let filter = self.last_filter.clone();
        self.load_deck(filter).await;
    }

    /// Picks a random undecided, swipeable movie from the deck.
    pub fn select_next(&mut self) {
        let candidates: Vec<&MovieRecord> = self
            .deck
            .iter()
            .filter(|m| m.status.is_swipeable())
            .filter(|m| !self.liked.contains(&m.id) && !self.disliked.contains(&m.id))
            .collect();

        let next = match candidates.choose(&mut self.rng) {
            Some(movie) => DeckState::Ready((*movie).clone()),
            None => DeckState::Empty,
        };
        debug!(candidates = candidates.len(), "selected next candidate");
        self.state.send_replace(next);
    }

    pub fn swipe_right(&mut self) {
        let Some(movie) = self.take_current("swipe right") else {
            return;
        };
        self.liked.insert(movie.id);
        self.history.push(movie);
        self.select_next();
    }

    pub fn swipe_left(&mut self) {
        let Some(movie) = self.take_current("swipe left") else {
            return;
        };
        self.disliked.insert(movie.id);
        self.history.push(movie);
        self.select_next();
    }

    pub async fn blacklist(&mut self) {
        let Some(movie) = self.take_current("blacklist") else {
            return;
        };

        if self.options.persist_blacklist {
            let record = movie.clone().with_status(MovieStatus::Blacklisted);
            if let Err(err) = self.store.upsert_movie(&record).await {
                warn!(movie_id = movie.id, error = %err, "failed to persist blacklist");
            }
        }

        self.disliked.insert(movie.id);
        self.history.push(movie);
        self.select_next();
    }

    /// Records the current movie as watched with `rating` (1–10).
    ///
    /// An out-of-range rating is rejected before anything changes. Storage
    /// failures are logged and do not stop the deck from advancing.
    pub async fn mark_watched(&mut self, rating: i32) -> AppResult<()> {
        let rating = UserRating::try_from(rating)?;
        let Some(movie) = self.take_current("mark watched") else {
            return Ok(());
        };

        self.liked.insert(movie.id);
        self.history.push(movie.clone());

        if let Err(err) = self.persist_watched(movie.clone(), rating).await {
            warn!(movie_id = movie.id, error = %err, "failed to persist watched movie");
        } else {
            info!(movie_id = movie.id, title = %movie.title, rating = %rating, "movie marked watched");
        }

        self.select_next();
        Ok(())
    }

    /// Puts the most recently decided movie back as current.
    ///
    /// Only session memory is rolled back; stored ratings stay.
    pub fn undo_last_action(&mut self) -> Option<MovieRecord> {
        let movie = self.history.pop()?;
        self.liked.remove(&movie.id);
        self.disliked.remove(&movie.id);
        self.state.send_replace(DeckState::Ready(movie.clone()));
        Some(movie)
    }

    fn take_current(&self, action: &str) -> Option<MovieRecord> {
        let current = self.state.borrow().current().cloned();
        if current.is_none() {
            debug!(action = action, "no current movie, ignoring");
        }
        current
    }

    async fn persist_watched(&self, movie: MovieRecord, rating: UserRating) -> AppResult<()> {
        let id = movie.id;
        self.store.upsert_movie(&movie.watched(rating)).await?;
        self.store.insert_rating(&RatingEntry::now(id, rating, RatingOrigin::Local)).await?;
        Ok(())
    }

    /// Applies stored decisions to freshly fetched records. Best-effort.
    ///
    /// A movie rated elsewhere becomes `WatchedRated` with its latest rating.
    async fn hydrate(&self, movies: &mut [MovieRecord]) {
        let ids: Vec<i64> = movies.iter().map(|m| m.id).collect();
        let stored: HashMap<i64, MovieRecord> = match self.store.get_movies(&ids).await {
            Ok(stored) => stored.into_iter().map(|m| (m.id, m)).collect(),
            Err(err) => {
                warn!(error = %err, "could not read stored statuses for deck");
                HashMap::new()
            },
        };
        let rated: HashMap<i64, UserRating> = self
            .store
            .observe_watched_movies()
            .borrow()
            .iter()
            .map(|w| (w.movie.id, w.latest_rating))
            .collect();

        for movie in movies.iter_mut() {
            if let Some(known) = stored.get(&movie.id) {
                movie.status = known.status;
                movie.user_rating = known.user_rating;
            }
            if movie.status.is_swipeable() {
                if let Some(&latest) = rated.get(&movie.id) {
                    movie.status = MovieStatus::WatchedRated;
                    movie.user_rating = Some(latest);
                }
            }
        }
    }
}
