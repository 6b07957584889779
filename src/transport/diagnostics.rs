//! Server info and control-surface endpoints (§6).

use axum::extract::State;
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use super::AppState;

pub async fn root(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "name": "webOS Update Server",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "server_id": state.config.server_id,
        "packages": state.catalog.len().await,
    }))
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "sessions": state.sessions.len().await,
        "packages": state.catalog.len().await,
    }))
}

pub async fn sessions(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.sessions.snapshot().await;
    Json(json!({
        "sessions": snapshot.iter().map(|s| json!({
            "session_id": s.session_id,
            "device_id": s.device_id,
            "state": format!("{:?}", s.state),
            "authenticated": s.authenticated,
            "device_info": {
                "model": s.model,
                "manufacturer": s.manufacturer,
                "build": s.current_build,
                "firmware": s.firmware_version,
            },
            "msg_id": s.msg_id,
        })).collect::<Vec<_>>(),
    }))
}
