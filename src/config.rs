use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    /// Empty means the built-in mock catalog is served.
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub tmdb_image_base_url: String,
    pub tmdb_language: String,
    pub tmdb_rps: u32,
    pub database_url: String,
    pub deck_size: usize,
    pub letterboxd_delay_ms: u64,
    pub letterboxd_max_pages: u32,
    pub persist_blacklist: bool,
    pub rng_seed: Option<u64>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let host = var_or("HOST", "0.0.0.0");
        let port: u16 = parse_var("PORT")?.unwrap_or(3000);

        Ok(Self {
            addr: format!("{host}:{port}").parse().context("HOST/PORT")?,
            tmdb_api_key: var_or("TMDB_API_KEY", ""),
            tmdb_base_url: var_or("TMDB_BASE_URL", "https://api.themoviedb.org/3"),
            tmdb_image_base_url: var_or("TMDB_IMAGE_BASE_URL", "https://image.tmdb.org/t/p/w500"),
            tmdb_language: var_or("TMDB_LANGUAGE", "en-US"),
            tmdb_rps: lenient_var("TMDB_RPS", 4),
            database_url: var_or("DATABASE_URL", "sqlite://filmswipe.db?mode=rwc"),
            deck_size: lenient_var("DECK_SIZE", 50).max(1),
            letterboxd_delay_ms: lenient_var("LETTERBOXD_DELAY_MS", 250),
            letterboxd_max_pages: lenient_var("LETTERBOXD_MAX_PAGES", 50).max(1),
            persist_blacklist: std::env::var("PERSIST_BLACKLIST").is_ok_and(|s| is_truthy(&s)),
            rng_seed: parse_var("RNG_SEED")?,
        })
    }
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Unset is `None`; a set but malformed value is an error.
fn parse_var<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => Ok(Some(raw.trim().parse().with_context(|| key.to_string())?)),
        Err(_) => Ok(None),
    }
}

/// Tuning knobs fall back to their default when unset or malformed.
fn lenient_var<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
