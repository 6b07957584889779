//! HTTP transport: the thin adapter that turns axum requests into calls
//! into `omadm_core`, and serves the auxiliary package/diagnostic endpoints
//! the core treats as external collaborators (§6).

mod api;
mod diagnostics;
mod dm;
mod packages;

use axum::routing::{get, post};
use axum::Router;
use omadm_core::catalog::Catalog;
use omadm_core::session::SessionStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::config::Config;

/// Shared application state handed to every handler.
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub catalog: Catalog,
}

/// Build the shared state and router together so the caller can hold on to
/// the state (e.g. to spawn the session-expiry sweep alongside the server).
pub fn build(config: Config, catalog: Catalog) -> (Router, Arc<AppState>) {
    let timeout = Duration::from_secs(config.session_timeout_secs);
    let management_path = config.management_path.clone();
    let state = Arc::new(AppState {
        sessions: SessionStore::new(timeout),
        catalog,
        config,
    });

    let router = Router::new()
        .route(&management_path, post(dm::handle))
        .route("/packages/manifest.json", get(packages::manifest))
        .route("/packages/:filename", get(packages::download))
        .route("/packages/scan", post(packages::scan))
        .route("/api/updates/check", get(api::check))
        .route("/api/updates/urls", get(api::urls))
        .route("/api/updates/session-files", get(api::session_files))
        .route("/sessions", get(diagnostics::sessions))
        .route("/status", get(diagnostics::status))
        .route("/", get(diagnostics::root))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (router, state)
}
