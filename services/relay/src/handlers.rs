//! Axum Handlers for the Relay
//!
//! `POST /rtc-connect` takes the caller's SDP offer as the raw request body,
//! forwards it to the upstream realtime service and returns the SDP answer
//! unchanged.

use axum::{
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Json, Response},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::state::AppState;

/// Media type of an SDP body in both directions.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: String,
}

#[derive(Debug)]
pub enum RelayError {
    BadRequest(String),
    /// The upstream service could not be reached or refused the offer.
    Upstream(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            RelayError::Upstream(message) => {
                error!("Upstream failure: {}", message);
                (StatusCode::BAD_GATEWAY, Json(ErrorResponse { message })).into_response()
            }
        }
    }
}

/// Exchange an SDP offer for an answer from the upstream realtime service.
#[instrument(skip_all, fields(offer_bytes = offer.len()))]
pub async fn rtc_connect(
    State(state): State<Arc<AppState>>,
    offer: String,
) -> Result<impl IntoResponse, RelayError> {
    if offer.trim().is_empty() {
        warn!("Rejecting empty offer");
        return Err(RelayError::BadRequest(
            "Request body must contain an SDP offer".to_string(),
        ));
    }

    let config = &state.config;
    let response = state
        .http
        .post(&config.upstream_url)
        .query(&[("model", config.realtime_model.as_str())])
        .bearer_auth(config.openai_api_key.expose_secret())
        .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
        .body(offer)
        .send()
        .await
        .map_err(|e| RelayError::Upstream(format!("Upstream unreachable: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), detail = %detail, "Upstream rejected offer");
        return Err(RelayError::Upstream(format!(
            "Upstream returned {}",
            status
        )));
    }

    let answer = response
        .text()
        .await
        .map_err(|e| RelayError::Upstream(format!("Failed to read upstream answer: {}", e)))?;
    info!(model = %config.realtime_model, answer_bytes = answer.len(), "Relayed session answer");

    Ok(([(CONTENT_TYPE, SDP_CONTENT_TYPE)], answer))
}

/// Liveness probe.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        model: state.config.realtime_model.clone(),
    })
}
