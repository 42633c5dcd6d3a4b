use std::{
    collections::{BTreeMap, HashSet},
    num::NonZeroU32,
    sync::Arc,
};

use async_trait::async_trait;
use futures::future::join_all;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use rand::{Rng, seq::SliceRandom};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{
    catalog::Catalog,
    error::AppResult,
    models::{MovieFilter, MovieRecord},
};

const PAGE_SIZE: usize = 20;
const MAX_RANDOM_PAGE: u32 = 500;

pub struct TmdbClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    image_base_url: String,
    language: String,
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    genres: RwLock<Option<BTreeMap<i32, String>>>,
}

impl TmdbClient {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        base_url: String,
        image_base_url: String,
        language: String,
        rps: u32,
    ) -> Self {
        if api_key.trim().is_empty() {
            tracing::warn!("Using mock TMDB catalog - no TMDB_API_KEY provided");
        }

        let rps = NonZeroU32::new(rps.max(1)).unwrap_or(NonZeroU32::MIN);
        let limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));
        Self {
            client,
            api_key,
            base_url,
            image_base_url,
            language,
            limiter,
            genres: RwLock::new(None),
        }
    }

    fn is_mock(&self) -> bool {
        self.api_key.trim().is_empty()
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), path);
        let req = self.client.get(url).query(&[("language", self.language.as_str())]);
        // v4 read access tokens are JWTs; v3 keys go in the query string.
        if self.api_key.starts_with("eyJ") {
            req.bearer_auth(&self.api_key)
        } else {
            req.query(&[("api_key", self.api_key.as_str())])
        }
    }

    async fn get_page(&self, req: reqwest::RequestBuilder) -> AppResult<Vec<TmdbMovie>> {
        self.limiter.until_ready().await;
        let resp: MovieListResponse = req.send().await?.error_for_status()?.json().await?;
        Ok(resp.results)
    }

    /// Fetches all pages concurrently. Failed pages are logged and skipped;
    /// only a fetch where every page failed is an error.
    async fn fetch_pages(&self, requests: Vec<reqwest::RequestBuilder>) -> AppResult<Vec<MovieRecord>> {
        let total = requests.len();
        let results = join_all(requests.into_iter().map(|req| self.get_page(req))).await;
        let genres = self.genre_map().await;

        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut failed = 0;
        let mut last_err = None;

        for result in results {
            match result {
                Ok(movies) => {
                    for movie in movies {
                        let Some(record) = to_record(movie, &genres, &self.image_base_url) else {
                            continue;
                        };
                        if seen.insert(record.id) {
                            out.push(record);
                        }
                    }
                },
                Err(err) => {
                    warn!(error = %err, "catalog page fetch failed");
                    failed += 1;
                    last_err = Some(err);
                },
            }
        }

        if failed == total {
            if let Some(err) = last_err {
                return Err(err);
            }
        }

        debug!(pages = total, failed = failed, movies = out.len(), "fetched catalog pages");
        Ok(out)
    }

    async fn genre_map(&self) -> BTreeMap<i32, String> {
        self.fetch_genres().await.unwrap_or_else(|err| {
            warn!(error = %err, "failed to load genres, continuing without names");
            BTreeMap::new()
        })
    }

    async fn search_pages(&self, title: &str, pages: usize) -> AppResult<Vec<MovieRecord>> {
        let requests = (1..=pages)
            .map(|page| self.request("search/movie").query(&[("query", title)]).query(&[("page", page)]))
            .collect();
        self.fetch_pages(requests).await
    }

    async fn discover_pages(&self, filter: &MovieFilter, pages: usize) -> AppResult<Vec<MovieRecord>> {
        let genres =
            filter.genre_ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");

        let requests = (1..=pages)
            .map(|page| {
                let mut req = self
                    .request("discover/movie")
                    .query(&[("sort_by", "popularity.desc")])
                    .query(&[("page", page)]);
                if !genres.is_empty() {
                    req = req.query(&[("with_genres", genres.as_str())]);
                }
                if let Some(from) = filter.year_from {
                    req = req.query(&[("primary_release_date.gte", format!("{from}-01-01"))]);
                }
                if let Some(to) = filter.year_to {
                    req = req.query(&[("primary_release_date.lte", format!("{to}-12-31"))]);
                }
                req
            })
            .collect();
        self.fetch_pages(requests).await
    }
}

#[async_trait]
impl Catalog for TmdbClient {
    async fn fetch_by_filter(
        &self,
        filter: &MovieFilter,
        count: usize,
    ) -> AppResult<Vec<MovieRecord>> {
        if self.is_mock() {
            let mut movies = mock::filter(filter);
            movies.truncate(count);
            return Ok(movies);
        }

        let pages = count / PAGE_SIZE + 1;
        let title = filter.title.trim();

        let movies = if !title.is_empty() {
            debug!(title = %title, pages = pages, "searching catalog by title");
            self.search_pages(title, pages).await?
        } else if !filter.genre_ids.is_empty() || filter.has_year_range() {
            debug!(genres = ?filter.genre_ids, year_from = ?filter.year_from, year_to = ?filter.year_to, "discovering catalog");
            self.discover_pages(filter, pages).await?
        } else {
            return self.fetch_random(count).await;
        };

        Ok(movies.into_iter().filter(|m| filter.accepts_year(m.year)).take(count).collect())
    }

    async fn fetch_random(&self, count: usize) -> AppResult<Vec<MovieRecord>> {
        let mut movies = if self.is_mock() {
            mock::movies()
        } else {
            let pages = count / PAGE_SIZE + 1;
            let requests = {
                let mut rng = rand::rng();
                (0..pages)
                    .map(|_| {
                        let page = rng.random_range(1..=MAX_RANDOM_PAGE);
                        let path =
                            if rng.random_bool(0.5) { "movie/popular" } else { "movie/top_rated" };
                        self.request(path).query(&[("page", page)])
                    })
                    .collect()
            };
            self.fetch_pages(requests).await?
        };

        movies.shuffle(&mut rand::rng());
        movies.truncate(count);
        Ok(movies)
    }

    async fn fetch_genres(&self) -> AppResult<BTreeMap<i32, String>> {
        if let Some(genres) = self.genres.read().await.as_ref() {
            return Ok(genres.clone());
        }

        let genres = if self.is_mock() {
            mock::genres()
        } else {
            self.limiter.until_ready().await;
            let resp: GenreListResponse = self
                .request("genre/movie/list")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            resp.genres.into_iter().map(|g| (g.id, g.name)).collect()
        };

        debug!(count = genres.len(), "loaded genre map");
        *self.genres.write().await = Some(genres.clone());
        Ok(genres)
    }

    async fn search_title(&self, title: &str) -> AppResult<Vec<MovieRecord>> {
        if self.is_mock() {
            return Ok(mock::filter(&MovieFilter { title: title.to_string(), ..Default::default() }));
        }

        let results = self
            .get_page(self.request("search/movie").query(&[("query", title)]).query(&[("page", 1)]))
            .await?;
        let genres = self.genre_map().await;
        Ok(results
            .into_iter()
            .filter_map(|m| to_record(m, &genres, &self.image_base_url))
            .collect())
    }
}

fn to_record(
    movie: TmdbMovie,
    genres: &BTreeMap<i32, String>,
    image_base_url: &str,
) -> Option<MovieRecord> {
    let title = movie.title.filter(|t| !t.trim().is_empty())?;

    let mut record = MovieRecord::new(movie.id, title);
    record.overview = movie.overview.unwrap_or_default();
    record.year = movie.release_date.as_deref().and_then(parse_release_year);
    record.genres = movie
        .genre_ids
        .unwrap_or_default()
        .iter()
        .filter_map(|id| genres.get(id).cloned())
        .collect();
    record.external_rating = movie.vote_average;
    record.poster_url = movie
        .poster_path
        .filter(|p| !p.is_empty())
        .map(|path| format!("{}{}", image_base_url.trim_end_matches('/'), path));
    Some(record)
}

pub(crate) fn parse_release_year(date: &str) -> Option<i32> {
    date.get(..4).and_then(|y| y.parse().ok())
}

#[derive(Debug, Deserialize)]
struct MovieListResponse {
    results: Vec<TmdbMovie>,
}

#[derive(Debug, Deserialize)]
struct TmdbMovie {
    id: i64,
    title: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    vote_average: Option<f64>,
    genre_ids: Option<Vec<i32>>,
    poster_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenreListResponse {
    genres: Vec<TmdbGenre>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    id: i32,
    name: String,
}

/// Fixed catalog served when no API key is configured.
mod mock {
    use std::collections::BTreeMap;

    use crate::models::{MovieFilter, MovieRecord};

    const GENRES: [(i32, &str); 11] = [
        (12, "Adventure"),
        (14, "Fantasy"),
        (16, "Animation"),
        (18, "Drama"),
        (28, "Action"),
        (36, "History"),
        (80, "Crime"),
        (878, "Science Fiction"),
        (10402, "Music"),
        (10749, "Romance"),
        (35, "Comedy"),
    ];

    pub fn genres() -> BTreeMap<i32, String> {
        GENRES.iter().map(|(id, name)| (*id, name.to_string())).collect()
    }

    pub fn movies() -> Vec<MovieRecord> {
        let film = |id: i64, title: &str, year: i32, genres: &[&str], rating: f64, overview: &str| {
            let mut record = MovieRecord::new(id, title).with_year(year).with_genres(genres.iter().copied());
            record.external_rating = Some(rating);
            record.overview = overview.to_string();
            record
        };

        vec![
            film(27205, "Inception", 2010, &["Science Fiction", "Action"], 8.4, "A thief who steals corporate secrets through dream-sharing technology."),
            film(155, "The Dark Knight", 2008, &["Action", "Crime"], 8.5, "Batman faces the Joker in Gotham City."),
            film(313369, "La La Land", 2016, &["Romance", "Drama", "Music"], 7.9, "A jazz pianist and an aspiring actress fall in love in Los Angeles."),
            film(129, "Spirited Away", 2001, &["Animation", "Fantasy"], 8.5, "A young girl enters a world of spirits and gods."),
            film(157336, "Interstellar", 2014, &["Science Fiction", "Drama", "Adventure"], 8.4, "Explorers travel through a wormhole in space to ensure humanity's survival."),
            film(550, "Fight Club", 1999, &["Drama"], 8.4, "An insomniac office worker and a soap maker form an underground fight club."),
            film(244786, "Whiplash", 2014, &["Drama", "Music"], 8.4, "A young drummer enrolls at a cut-throat music conservatory."),
            film(603, "The Matrix", 1999, &["Science Fiction", "Action"], 8.2, "A hacker learns about the true nature of reality and his role in the war against its controllers."),
            film(680, "Pulp Fiction", 1994, &["Crime", "Drama"], 8.5, "The lives of two mob hitmen, a boxer and others intertwine."),
            film(37799, "The Social Network", 2010, &["Drama", "History"], 7.4, "The story of the founders of Facebook."),
        ]
    }

    pub fn filter(filter: &MovieFilter) -> Vec<MovieRecord> {
        let genres = genres();
        let wanted: Vec<&str> =
            filter.genre_ids.iter().filter_map(|id| genres.get(id).map(String::as_str)).collect();
        let needle = filter.title.trim().to_lowercase();

        movies()
            .into_iter()
            .filter(|m| needle.is_empty() || m.title.to_lowercase().contains(&needle))
            .filter(|m| wanted.is_empty() || m.genres.iter().any(|g| wanted.contains(&g.as_str())))
            .filter(|m| filter.accepts_year(m.year))
            .collect()
    }
}
