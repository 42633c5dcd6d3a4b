use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::{
    AppState,
    error::{AppError, AppResult},
    import::ImportState,
    models::{ImportRequest, MovieFilter, MovieRecord, WatchedMovie, WatchedRequest},
    session::{DeckState, SessionStats},
    stats::{ProfileStats, profile_stats},
};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/deck", get(deck))
        .route("/deck/movies", get(deck_movies))
        .route("/deck/load", post(load_deck))
        .route("/deck/retry", post(retry))
        .route("/deck/filter", post(apply_filter))
        .route("/swipe/right", post(swipe_right))
        .route("/swipe/left", post(swipe_left))
        .route("/swipe/blacklist", post(blacklist))
        .route("/swipe/watched", post(mark_watched))
        .route("/swipe/undo", post(undo))
        .route("/session/stats", get(session_stats))
        .route("/genres", get(genres))
        .route("/my-films", get(my_films))
        .route("/profile", get(profile))
        .route("/import", get(import_status).post(start_import).delete(reset_import))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

async fn deck(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    Json(state.session.lock().await.state())
}

async fn deck_movies(State(state): State<Arc<AppState>>) -> Json<Vec<MovieRecord>> {
    Json(state.session.lock().await.deck().to_vec())
}

async fn load_deck(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.load_deck(None).await;
    Json(session.state())
}

async fn retry(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.retry().await;
    Json(session.state())
}

async fn apply_filter(
    State(state): State<Arc<AppState>>,
    Json(filter): Json<MovieFilter>,
) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.apply_filter(filter).await;
    Json(session.state())
}

async fn swipe_right(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.swipe_right();
    Json(session.state())
}

async fn swipe_left(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.swipe_left();
    Json(session.state())
}

async fn blacklist(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.blacklist().await;
    Json(session.state())
}

async fn mark_watched(
    State(state): State<Arc<AppState>>,
    Json(req): Json<WatchedRequest>,
) -> AppResult<Json<DeckState>> {
    let mut session = state.session.lock().await;
    session.mark_watched(req.rating).await?;
    Ok(Json(session.state()))
}

async fn undo(State(state): State<Arc<AppState>>) -> Json<DeckState> {
    let mut session = state.session.lock().await;
    session.undo_last_action();
    Json(session.state())
}

async fn session_stats(State(state): State<Arc<AppState>>) -> Json<SessionStats> {
    Json(state.session.lock().await.stats())
}

async fn genres(State(state): State<Arc<AppState>>) -> AppResult<Json<BTreeMap<i32, String>>> {
    Ok(Json(state.catalog.fetch_genres().await?))
}

async fn my_films(State(state): State<Arc<AppState>>) -> Json<Vec<WatchedMovie>> {
    let watched = state.store.observe_watched_movies().borrow().clone();
    Json(watched)
}

async fn profile(State(state): State<Arc<AppState>>) -> Json<ProfileStats> {
    let watched = state.store.observe_watched_movies().borrow().clone();
    Json(profile_stats(&watched))
}

async fn import_status(State(state): State<Arc<AppState>>) -> Json<ImportState> {
    Json(state.import_state.borrow().clone())
}

async fn start_import(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImportRequest>,
) -> AppResult<(StatusCode, Json<ImportState>)> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err(AppError::InvalidInput("username is required".to_string()));
    }

    let started = state.import_state.send_if_modified(|current| {
        if current.is_running() {
            return false;
        }
        *current = ImportState::Running { current: 0, total: 0 };
        true
    });
    if !started {
        return Err(AppError::InvalidInput("an import is already running".to_string()));
    }

    info!(username = %username, "starting import");
    let importer = state.importer.clone();
    let progress = state.import_state.clone();
    tokio::spawn(async move {
        let reporter = progress.clone();
        let job = tokio::spawn(async move {
            importer
                .import(&username, |current, total| {
                    reporter.send_replace(ImportState::Running { current, total });
                })
                .await
        });

        let finished = match job.await {
            Ok(result) => ImportState::from(result),
            Err(err) => {
                warn!(error = %err, "import task did not complete");
                ImportState::Failed { message: "import was interrupted".to_string() }
            },
        };
        progress.send_replace(finished);
    });

    Ok((StatusCode::ACCEPTED, Json(state.import_state.borrow().clone())))
}

async fn reset_import(State(state): State<Arc<AppState>>) -> AppResult<Json<ImportState>> {
    if state.import_state.borrow().is_running() {
        return Err(AppError::InvalidInput("an import is still running".to_string()));
    }
    state.import_state.send_replace(ImportState::Idle);
    Ok(Json(ImportState::Idle))
}
