//! The direct JSON update-check API: lets WiFi-only tooling (and the
//! on-device `UpdateDaemon`) ask about updates without speaking SyncML.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use omadm_core::catalog::applies;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BuildQuery {
    #[serde(default)]
    build: String,
    #[serde(default)]
    swv: String,
}

fn package_url(base_url: &str, filename: &str) -> String {
    if base_url.is_empty() {
        format!("/packages/{filename}")
    } else {
        format!("{}/packages/{}", base_url.trim_end_matches('/'), filename)
    }
}

/// `GET /api/updates/check?build=...` — every package still applicable to
/// the given build, bypassing the OMA DM session entirely.
pub async fn check(State(state): State<Arc<AppState>>, Query(q): Query<BuildQuery>) -> Response {
    let device_build = if !q.build.is_empty() { q.build } else { q.swv };
    if device_build.is_empty() {
        return Json(json!({
            "status": "error",
            "message": "Missing build or swv parameter",
            "updateAvailable": false,
        }))
        .into_response();
    }

    let packages = state.catalog.list().await;
    let base_url = &state.config.server_url;
    let applicable: Vec<_> = packages
        .iter()
        .filter(|pkg| applies(pkg, &device_build))
        .map(|pkg| {
            json!({
                "name": pkg.name,
                "version": pkg.version,
                "filename": pkg.filename,
                "url": package_url(base_url, &pkg.filename),
                "size": pkg.size,
                "md5": pkg.md5,
                "description": pkg.description,
                "targetBuild": pkg.target_build,
            })
        })
        .collect();

    if applicable.is_empty() {
        return Json(json!({
            "status": "ok",
            "updateAvailable": false,
            "currentBuild": device_build,
        }))
        .into_response();
    }

    Json(json!({
        "status": "ok",
        "updateAvailable": true,
        "currentBuild": device_build,
        "packageCount": applicable.len(),
        "packages": applicable,
    }))
    .into_response()
}

/// `GET /api/updates/urls?build=...` — the single newest applicable
/// package's URL, one per line, in the format `UpdateDaemon` expects to
/// find at `/var/lib/software/SessionFiles/urls`.
pub async fn urls(State(state): State<Arc<AppState>>, Query(q): Query<BuildQuery>) -> String {
    if q.build.is_empty() {
        return String::new();
    }
    match state.catalog.check_update_available(&q.build, None, None).await {
        Some(pkg) => format!("{}\n", package_url(&state.config.server_url, &pkg.filename)),
        None => String::new(),
    }
}

/// `GET /api/updates/session-files?build=...` — everything `UpdateDaemon`
/// needs from a single request instead of polling `urls` and the manifest
/// separately.
pub async fn session_files(State(state): State<Arc<AppState>>, Query(q): Query<BuildQuery>) -> Response {
    if q.build.is_empty() {
        return Json(json!({"status": "error", "message": "Missing build parameter"})).into_response();
    }

    let pkg = match state.catalog.check_update_available(&q.build, None, None).await {
        Some(pkg) => pkg,
        None => return Json(json!({"status": "ok", "updateAvailable": false})).into_response(),
    };

    let pkg_url = package_url(&state.config.server_url, &pkg.filename);
    Json(json!({
        "status": "ok",
        "updateAvailable": true,
        "files": {
            "urls": pkg_url,
            "update_list": format!("/var/lib/update/{}", pkg.filename),
            "package": {
                "name": pkg.name,
                "version": pkg.version,
                "size": pkg.size,
                "md5": pkg.md5,
            }
        }
    }))
    .into_response()
}
