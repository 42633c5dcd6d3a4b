use std::{sync::Arc, time::Duration};

use filmswipe::{
    AppState,
    catalog::Catalog,
    config::Config,
    db,
    import::{ImportService, ImportState},
    routes,
    scraper::LetterboxdScraper,
    session::{SessionOptions, SwipeSession},
    store::{MovieStore, SqliteStore},
    tmdb::TmdbClient,
};
use tokio::sync::{Mutex, watch};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,filmswipe=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let http = reqwest::Client::builder()
        .user_agent("filmswipe/0.1")
        .timeout(Duration::from_secs(30))
        .build()?;

    // Scraping a long ratings history is slow; give it more room than the API client.
    let scraper_http = wreq::Client::builder()
        .cookie_store(true)
        .timeout(Duration::from_secs(120))
        .build()?;

    let db = db::connect_and_migrate(&config.database_url).await?;
    let store: Arc<dyn MovieStore> = Arc::new(SqliteStore::open(db).await?);

    let catalog: Arc<dyn Catalog> = Arc::new(TmdbClient::new(
        http,
        config.tmdb_api_key.clone(),
        config.tmdb_base_url.clone(),
        config.tmdb_image_base_url.clone(),
        config.tmdb_language.clone(),
        config.tmdb_rps,
    ));

    let scraper = LetterboxdScraper::new(
        scraper_http,
        config.letterboxd_delay_ms,
        config.letterboxd_max_pages,
    );
    let importer = Arc::new(ImportService::new(Arc::new(scraper), catalog.clone(), store.clone()));

    let mut session = SwipeSession::new(
        catalog.clone(),
        store.clone(),
        SessionOptions {
            deck_size: config.deck_size,
            persist_blacklist: config.persist_blacklist,
            seed: config.rng_seed,
        },
    );
    session.load_deck(None).await;

    let state = Arc::new(AppState {
        session: Mutex::new(session),
        catalog,
        store,
        importer,
        import_state: Arc::new(watch::channel(ImportState::Idle).0),
    });

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
