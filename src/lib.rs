pub mod catalog;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod import;
pub mod models;
pub mod routes;
pub mod scraper;
pub mod session;
pub mod stats;
pub mod store;
pub mod tmdb;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use tokio::sync::{Mutex, watch};

use crate::{
    catalog::Catalog,
    import::{ImportService, ImportState},
    session::SwipeSession,
    store::MovieStore,
};

pub struct AppState {
    pub session: Mutex<SwipeSession>,
    pub catalog: Arc<dyn Catalog>,
    pub store: Arc<dyn MovieStore>,
    pub importer: Arc<ImportService>,
    pub import_state: Arc<watch::Sender<ImportState>>,
}
