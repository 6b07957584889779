//! The OMA DM SyncML endpoint: the one entry point devices actually talk to.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use log::{error, info};
use omadm_core::syncml::builder;
use std::sync::Arc;

use super::AppState;

pub async fn handle(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let hmac_header = headers
        .get("x-syncml-hmac")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    info!("OMA DM request, Content-Type: {content_type}, size: {} bytes", body.len());

    let dispatch_config = state.config.dispatch_config();
    let outcome = match omadm_core::dispatch::handle_message(
        &dispatch_config,
        &state.sessions,
        &state.catalog,
        &body,
        &content_type,
        hmac_header.as_deref(),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("error processing OMA DM request: {e}");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let wants_wbxml = content_type.contains("wbxml");
    let (response_body, response_content_type) = if wants_wbxml {
        (builder::to_wbxml(&outcome.response), "application/vnd.syncml.dm+wbxml")
    } else {
        match builder::to_xml(&outcome.response) {
            Ok(bytes) => (bytes, "application/vnd.syncml.dm+xml"),
            Err(e) => {
                error!("error serializing OMA DM response: {e}");
                return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
            }
        }
    };

    info!("OMA DM response: {} bytes", response_body.len());

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, response_content_type)
        .body(Body::from(response_body.clone()))
        .expect("a fixed set of headers is always valid");

    if outcome.should_sign {
        let value = omadm_core::dispatch::response_hmac_header(&dispatch_config, &outcome.response_nonce, &response_body);
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                response.headers_mut().insert("x-syncml-hmac", value);
            }
            Err(e) => error!("could not encode x-syncml-hmac response header: {e}"),
        }
    }

    response
}
