use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use studymate_core::avatar::AVATAR_DISPLAY_NAME;
use studymate_core::config::LANG_EN;
use studymate_core::credentials::{CredentialError, random_identity};
use tracing::{error, info};

use super::response::{ApiError, ApiResponse};
use super::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub ok: bool,
    pub service: &'static str,
    pub livekit_url: String,
}

pub async fn health(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        ok: true,
        service: "studymate",
        livekit_url: state.issuer.url().to_string(),
    })
}

fn credential_error(err: CredentialError) -> ApiError {
    let status = match err {
        CredentialError::EmptyField(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error!(error = %err, "Failed to issue room token");
    (status, Json(ApiResponse::from(err)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenQuery {
    #[serde(default)]
    pub room_name: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub room_name: String,
    pub identity: String,
    pub name: String,
    pub livekit_url: String,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

pub async fn issue_token(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<TokenResponse>, ApiError> {
    let room_name = non_blank(query.room_name).unwrap_or_else(|| "demo".to_string());
    let identity = non_blank(query.identity).unwrap_or_else(|| random_identity("user", 6));
    let name = non_blank(query.name).unwrap_or_else(|| identity.clone());

    let issued = state
        .issuer
        .issue(&identity, Some(&name), &room_name)
        .map_err(credential_error)?;

    Ok(Json(TokenResponse {
        token: issued.token,
        room_name: issued.room,
        identity: issued.identity,
        name,
        livekit_url: issued.url,
    }))
}

fn default_true() -> bool {
    true
}

fn default_language() -> String {
    LANG_EN.to_string()
}

#[derive(Debug, Deserialize)]
pub struct JoinRoomRequest {
    pub room_name: String,
    pub participant_name: String,
    #[serde(default = "default_true")]
    pub mic_enabled: bool,
    #[serde(default = "default_true")]
    pub camera_enabled: bool,
    #[serde(default)]
    pub invite_avatar: bool,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct JoinRoomResponse {
    pub token: String,
    pub room_name: String,
    pub identity: String,
    pub livekit_url: String,
    pub participant_name: String,
    pub mic_enabled: bool,
    pub camera_enabled: bool,
    pub avatar_invited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// Issue a join token and, when asked, start the room's agent in the
/// background. The response never waits for the agent.
pub async fn join_room(
    State(state): State<AppState>,
    Json(request): Json<JoinRoomRequest>,
) -> Result<Json<JoinRoomResponse>, ApiError> {
    let identity = random_identity(&request.participant_name, 8);
    let issued = state
        .issuer
        .issue(&identity, Some(&request.participant_name), &request.room_name)
        .map_err(credential_error)?;

    let (avatar_name, avatar_status) = if request.invite_avatar {
        info!(
            room = %request.room_name,
            language = %request.language,
            user = %request.participant_name,
            "Starting agent for joined room"
        );
        state.spawn_ensure_agent(
            request.room_name.clone(),
            request.language.clone(),
            Some(request.participant_name.clone()),
        );
        (
            Some(AVATAR_DISPLAY_NAME.to_string()),
            Some("Starting...".to_string()),
        )
    } else {
        (None, None)
    };

    Ok(Json(JoinRoomResponse {
        token: issued.token,
        room_name: issued.room,
        identity: issued.identity,
        livekit_url: issued.url,
        participant_name: request.participant_name,
        mic_enabled: request.mic_enabled,
        camera_enabled: request.camera_enabled,
        avatar_invited: request.invite_avatar,
        avatar_name,
        avatar_status,
        device_id: request.device_id,
    }))
}

#[derive(Debug, Serialize)]
pub struct RoomInfo {
    pub room_name: String,
    pub livekit_url: String,
    pub status: &'static str,
    pub avatar_running: bool,
}

pub async fn room_info(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> Json<RoomInfo> {
    let avatar_running = state.supervisor.is_running(&room_name);
    Json(RoomInfo {
        room_name,
        livekit_url: state.issuer.url().to_string(),
        status: "available",
        avatar_running,
    })
}
