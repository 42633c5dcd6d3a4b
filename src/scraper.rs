use std::{sync::LazyLock, time::Duration};

use async_trait::async_trait;
use rand::Rng;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use wreq::header::REFERER;

use crate::{
    error::AppResult,
    import::RatingSource,
    models::{ExternalRating, UserRating},
};

static GRID_ITEM: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li.griditem").expect("valid selector"));
static POSTER: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.react-component[data-item-name]").expect("valid selector")
});
static RATING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("span.rating").expect("valid selector"));
static NEXT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.next").expect("valid selector"));

const LETTERBOXD_URL: &str = "https://letterboxd.com";

/// Reads a member's rated films from their public Letterboxd profile.
pub struct LetterboxdScraper {
    client: wreq::Client,
    base_url: String,
    delay_ms: u64,
    max_pages: u32,
}

impl LetterboxdScraper {
    pub fn new(client: wreq::Client, delay_ms: u64, max_pages: u32) -> Self {
        Self { client, base_url: LETTERBOXD_URL.to_string(), delay_ms, max_pages: max_pages.max(1) }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl RatingSource for LetterboxdScraper {
    fn name(&self) -> &str {
        "letterboxd"
    }

    async fn fetch_ratings(&self, username: &str) -> AppResult<Vec<ExternalRating>> {
        fetch_ratings(&self.client, &self.base_url, username, self.delay_ms, self.max_pages).await
    }
}

pub async fn fetch_ratings(
    client: &wreq::Client,
    base_url: &str,
    username: &str,
    delay_ms: u64,
    max_pages: u32,
) -> AppResult<Vec<ExternalRating>> {
    debug!(username = %username, "fetching rated films");

    let base = base_url.trim_end_matches('/');
    let referer = format!("{base}/");
    let user = urlencoding::encode(username);
    let mut out = Vec::new();
    let mut page = 1;

    loop {
        let url = if page == 1 {
            format!("{base}/{user}/films/ratings/")
        } else {
            format!("{base}/{user}/films/ratings/page/{page}/")
        };

        debug!(page = page, "fetching ratings page");
        let html = client
            .get(&url)
            .header(REFERER, referer.as_str())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let (ratings, has_next) = parse_ratings_page(&html);
        debug!(page = page, films_found = ratings.len(), "parsed ratings page");

        if ratings.is_empty() {
            break;
        }
        out.extend(ratings);

        if !has_next || page >= max_pages {
            break;
        }

        page += 1;
        let delay = delay_ms + jitter_ms(150);
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    debug!(username = %username, total_films = out.len(), "completed ratings fetch");
    Ok(out)
}

/// Rated films on one page, and whether a further page is linked.
fn parse_ratings_page(html: &str) -> (Vec<ExternalRating>, bool) {
    let doc = Html::parse_document(html);

    let ratings = doc
        .select(&GRID_ITEM)
        .filter_map(|item| {
            let title = item.select(&POSTER).next()?.value().attr("data-item-name")?;
            let rating = item.select(&RATING).next().and_then(rating_from_classes)?;
            Some(ExternalRating { title: title.trim().to_string(), rating })
        })
        .collect();

    let has_next = doc.select(&NEXT_PAGE).next().is_some();
    (ratings, has_next)
}

/// `rated-N` counts half stars, so N maps straight onto the 1–10 scale.
fn rating_from_classes(span: ElementRef<'_>) -> Option<UserRating> {
    span.value()
        .classes()
        .find_map(|class| class.strip_prefix("rated-"))
        .and_then(|n| n.parse().ok())
        .and_then(UserRating::new)
}

fn jitter_ms(max: u64) -> u64 {
    rand::rng().random_range(0..=max)
}

/// `"Title (YYYY)"` with exactly four digits inside the final parentheses.
fn split_trailing_year(title: &str) -> Option<(&str, i32)> {
    let (head, tail) = title.strip_suffix(')')?.rsplit_once('(')?;
    if tail.len() != 4 || !tail.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((head.trim_end(), tail.parse().ok()?))
}

/// Splits `"Inside Out 2 (2024)"` into `("Inside Out 2", Some(2024))`.
pub fn parse_title_and_year(title_with_year: &str) -> (&str, Option<i32>) {
    let trimmed = title_with_year.trim();
    match split_trailing_year(trimmed) {
        Some((title, year)) if !title.is_empty() => (title, Some(year)),
        _ => (trimmed, None),
    }
}
