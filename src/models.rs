use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovieStatus {
    #[default]
    New,
    WatchedRated,
    Blacklisted,
}

impl MovieStatus {
    pub fn as_code(self) -> &'static str {
        match self {
            MovieStatus::New => "NEW",
            MovieStatus::WatchedRated => "WATCHED_RATED",
            MovieStatus::Blacklisted => "BLACKLISTED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NEW" => Some(MovieStatus::New),
            "WATCHED_RATED" => Some(MovieStatus::WatchedRated),
            "BLACKLISTED" => Some(MovieStatus::Blacklisted),
            _ => None,
        }
    }

    /// Whether a movie in this status may still be offered in the deck.
    pub fn is_swipeable(self) -> bool {
        self == MovieStatus::New
    }
}

/// A user score between 1 and 10 inclusive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct UserRating(u8);

impl UserRating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: i32) -> Option<Self> {
        (i32::from(Self::MIN)..=i32::from(Self::MAX))
            .contains(&value)
            .then(|| Self(value as u8))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i32> for UserRating {
    type Error = AppError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "rating must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            ))
        })
    }
}

impl From<UserRating> for i32 {
    fn from(rating: UserRating) -> Self {
        i32::from(rating.0)
    }
}

impl fmt::Display for UserRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovieRecord {
    pub id: i64,
    pub title: String,
    pub overview: String,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub external_rating: Option<f64>,
    #[serde(default)]
    pub status: MovieStatus,
    pub user_rating: Option<UserRating>,
    pub poster_url: Option<String>,
}

impl MovieRecord {
    /// A fresh, unrated record as it comes out of the catalog.
    pub fn new(id: i64, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            overview: String::new(),
            year: None,
            genres: Vec::new(),
            external_rating: None,
            status: MovieStatus::New,
            user_rating: None,
            poster_url: None,
        }
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: MovieStatus) -> Self {
        self.status = status;
        self
    }

    /// Marks the record watched with the given rating.
    pub fn watched(mut self, rating: UserRating) -> Self {
        self.status = MovieStatus::WatchedRated;
        self.user_rating = Some(rating);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingOrigin {
    Local,
    Letterboxd,
}

impl RatingOrigin {
    pub fn as_code(self) -> &'static str {
        match self {
            RatingOrigin::Local => "local",
            RatingOrigin::Letterboxd => "letterboxd",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "local" => Some(RatingOrigin::Local),
            "letterboxd" => Some(RatingOrigin::Letterboxd),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RatingEntry {
    pub id: Option<i32>,
    pub movie_id: i64,
    pub user_rating: UserRating,
    pub source: RatingOrigin,
    pub rated_at: jiff::Timestamp,
}

impl RatingEntry {
    pub fn now(movie_id: i64, user_rating: UserRating, source: RatingOrigin) -> Self {
        Self { id: None, movie_id, user_rating, source, rated_at: jiff::Timestamp::now() }
    }
}

/// Row of the "my films" list: a movie and its most recent rating.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WatchedMovie {
    pub movie: MovieRecord,
    pub latest_rating: UserRating,
    pub rated_at: jiff::Timestamp,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieFilter {
    pub title: String,
    pub genre_ids: Vec<i32>,
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
}

impl MovieFilter {
    pub fn is_empty(&self) -> bool {
        self.title.is_empty()
            && self.genre_ids.is_empty()
            && self.year_from.is_none()
            && self.year_to.is_none()
    }

    pub fn has_year_range(&self) -> bool {
        self.year_from.is_some() || self.year_to.is_some()
    }

    /// Year-range check; movies without a known year always pass.
    pub fn accepts_year(&self, year: Option<i32>) -> bool {
        let Some(year) = year else {
            return true;
        };
        self.year_from.is_none_or(|from| year >= from) && self.year_to.is_none_or(|to| year <= to)
    }
}

/// A rating pulled from an external service, before catalog matching.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternalRating {
    /// Display title, usually in the `Title (YYYY)` form.
    pub title: String,
    pub rating: UserRating,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ImportResult {
    pub success: bool,
    pub imported_count: usize,
    pub skipped_count: usize,
    pub message: String,
}

impl ImportResult {
    pub fn failure(message: impl Into<String>) -> Self {
        Self { success: false, imported_count: 0, skipped_count: 0, message: message.into() }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct WatchedRequest {
    pub rating: i32,
}
