pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod loan;
pub mod session;
pub mod ui;
pub mod validation;

pub use db::DbPool;

use axum::{middleware, Router};
use config::Config;
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::api::rate_limit::RateLimiter;
use crate::backend::{SqliteAuthProvider, SqliteStore};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub auth: Arc<SqliteAuthProvider>,
    pub store: Arc<SqliteStore>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Self {
        let auth = Arc::new(SqliteAuthProvider::new(
            db.clone(),
            chrono::Duration::hours(config.auth.session_ttl_hours),
            config.admin_email(),
        ));
        let store = Arc::new(SqliteStore::new(db.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
        Self {
            config,
            db,
            auth,
            store,
            rate_limiter,
        }
    }
}

/// Pages, JSON endpoints and static assets behind the shared layers
pub fn app(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .merge(api::create_router())
        .merge(ui::create_router())
        .nest_service("/static", static_files)
        .layer(middleware::from_fn(ui::extract::ensure_client_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
