use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use studymate_core::calls::{CallRecord, TokenPreview};
use studymate_core::push::preview;

use super::response::{ApiError, api_error};
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterTokenRequest {
    pub expo_push_token: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub device_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterTokenResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub token_preview: String,
    pub total_tokens: usize,
}

pub async fn register_token(
    State(state): State<AppState>,
    Json(request): Json<RegisterTokenRequest>,
) -> Result<Json<RegisterTokenResponse>, ApiError> {
    if request.expo_push_token.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "expo_push_token must not be empty",
        ));
    }
    let total_tokens = state.calls.tokens().register(
        &request.expo_push_token,
        request.user_id,
        request.device_name,
    );
    Ok(Json(RegisterTokenResponse {
        status: "success",
        message: "Push token registered successfully",
        token_preview: preview(&request.expo_push_token),
        total_tokens,
    }))
}

#[derive(Debug, Serialize)]
pub struct RegisteredTokens {
    pub tokens: Vec<TokenPreview>,
    pub total_tokens: usize,
}

pub async fn registered_tokens(State(state): State<AppState>) -> Json<RegisteredTokens> {
    let tokens = state.calls.tokens().previews();
    Json(RegisteredTokens {
        total_tokens: tokens.len(),
        tokens,
    })
}

#[derive(Debug, Deserialize)]
pub struct InitiateCallRequest {
    pub room_name: String,
    pub caller_name: String,
    #[serde(default)]
    pub target_user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitiateCallResponse {
    pub status: &'static str,
    pub message: String,
    pub call_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications_sent: Option<usize>,
}

/// Record a call and push an invitation to every matching device.
pub async fn initiate_call(
    State(state): State<AppState>,
    Json(request): Json<InitiateCallRequest>,
) -> Json<InitiateCallResponse> {
    let outcome = state
        .calls
        .initiate(
            &request.room_name,
            &request.caller_name,
            request.target_user_id.as_deref(),
        )
        .await;

    if outcome.targets == 0 {
        return Json(InitiateCallResponse {
            status: "warning",
            message: "No devices available to receive the call".to_string(),
            call_id: outcome.call.call_id,
            room_name: None,
            caller_name: None,
            notifications_sent: None,
        });
    }

    Json(InitiateCallResponse {
        status: "success",
        message: format!(
            "Call initiated and sent to {} device(s)",
            outcome.notifications_sent
        ),
        call_id: outcome.call.call_id,
        room_name: Some(outcome.call.room_name),
        caller_name: Some(outcome.call.caller_name),
        notifications_sent: Some(outcome.notifications_sent),
    })
}

#[derive(Debug, Serialize)]
pub struct ActiveCalls {
    pub active_calls: Vec<CallRecord>,
    pub total_calls: usize,
}

pub async fn active_calls(State(state): State<AppState>) -> Json<ActiveCalls> {
    let active_calls = state.calls.active();
    Json(ActiveCalls {
        total_calls: active_calls.len(),
        active_calls,
    })
}
