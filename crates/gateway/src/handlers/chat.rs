//! Chat handler

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use inocua_common::{
    errors::{AppError, Result},
    ChatResponse,
};

/// Chat request
#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
}

/// Answer one user message.
///
/// Every engine outcome is a 200 except `unavailable`, which maps to 503 so
/// clients and load balancers can tell a provider outage from a decline.
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Result<Response> {
    let request = ChatRequest {
        message: request.message.trim().to_string(),
    };

    if request.message.is_empty() {
        return Err(AppError::MissingField {
            field: "message".to_string(),
        });
    }

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let response = state.arbitrator.respond(&request.message).await;

    let status = match &response {
        ChatResponse::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    Ok((status, Json(response)).into_response())
}
