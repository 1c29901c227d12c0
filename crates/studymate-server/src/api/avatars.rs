use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studymate_core::avatar::AVATAR_DISPLAY_NAME;
use studymate_core::config::LANG_EN;
use tracing::{error, info};

use super::response::{ApiError, ApiResponse, api_error};
use super::state::AppState;

fn default_avatar_name() -> String {
    AVATAR_DISPLAY_NAME.to_string()
}

fn default_language() -> String {
    LANG_EN.to_string()
}

#[derive(Debug, Deserialize)]
pub struct InviteAvatarRequest {
    pub room_name: String,
    #[serde(default = "default_avatar_name")]
    pub avatar_name: String,
    #[serde(default = "default_language")]
    pub language: String,
}

#[derive(Debug, Serialize)]
pub struct InvitedAvatar {
    pub room_name: String,
    pub avatar_name: String,
}

/// Start the room's agent and wait until its warm-up verdict is in.
pub async fn invite_avatar(
    State(state): State<AppState>,
    Json(request): Json<InviteAvatarRequest>,
) -> Result<Json<ApiResponse<InvitedAvatar>>, ApiError> {
    if !state.avatar_enabled() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            concat!(
                "Tavus credentials not configured. ",
                "Please set TAVUS_API_KEY, TAVUS_REPLICA_ID, and TAVUS_PERSONA_ID"
            ),
        ));
    }

    if !state
        .ensure_agent(&request.room_name, &request.language, None)
        .await
    {
        error!(room = %request.room_name, "Avatar agent failed to start");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to start avatar agent",
        ));
    }

    let message = format!(
        "Avatar '{}' invited to room '{}'",
        request.avatar_name, request.room_name
    );
    Ok(Json(ApiResponse::ok_with_message(
        InvitedAvatar {
            room_name: request.room_name,
            avatar_name: request.avatar_name,
        },
        message,
    )))
}

pub async fn cleanup_avatar(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> Json<ApiResponse<()>> {
    if state.supervisor.terminate(&room_name).await {
        info!(room = %room_name, "Avatar process cleaned up on request");
        Json(ApiResponse::message(format!(
            "Cleaned up avatar process for room: {room_name}"
        )))
    } else {
        Json(ApiResponse::message(format!(
            "No avatar process found for room: {room_name}"
        )))
    }
}

#[derive(Debug, Serialize)]
pub struct ActiveAvatar {
    pub pid: Option<u32>,
    pub is_running: bool,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ActiveAvatars {
    pub active_avatars: BTreeMap<String, ActiveAvatar>,
    pub total_count: usize,
}

pub async fn active_avatars(State(state): State<AppState>) -> Json<ActiveAvatars> {
    let active_avatars: BTreeMap<String, ActiveAvatar> = state
        .supervisor
        .snapshot()
        .into_iter()
        .map(|(room, status)| {
            (
                room,
                ActiveAvatar {
                    pid: status.pid,
                    is_running: status.running,
                    exit_code: status.exit_code,
                    language: status.language,
                    started_at: status.started_at,
                },
            )
        })
        .collect();
    Json(ActiveAvatars {
        total_count: active_avatars.len(),
        active_avatars,
    })
}

#[derive(Debug, Serialize)]
pub struct AvatarConfigReport {
    pub tavus_api_key: String,
    pub tavus_replica_id: String,
    pub tavus_persona_id: String,
    pub api_key_preview: Option<String>,
}

fn set_or_missing(present: bool) -> String {
    let label = if present { "Set" } else { "Missing" };
    label.to_string()
}

/// Last four characters, the rest hidden.
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
    format!("...{tail}")
}

pub async fn avatar_config(State(state): State<AppState>) -> Json<AvatarConfigReport> {
    let avatar = state.avatar.as_ref();
    Json(AvatarConfigReport {
        tavus_api_key: set_or_missing(avatar.is_some()),
        tavus_replica_id: set_or_missing(avatar.is_some()),
        tavus_persona_id: set_or_missing(avatar.is_some()),
        api_key_preview: avatar.map(|config| mask(&config.api_key)),
    })
}
