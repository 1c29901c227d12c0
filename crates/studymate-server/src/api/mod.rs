pub mod avatars;
pub mod calls;
pub mod memory;
pub mod response;
pub mod rooms;
pub mod state;
#[cfg(test)]
pub mod test_support;

use axum::{
    Router,
    routing::{get, post},
};

use avatars::*;
use calls::*;
use memory::*;
use rooms::*;
use state::AppState;

/// Every route of the façade, without transport layers.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        // Rooms and credentials
        .route("/token", get(issue_token))
        .route("/join-room", post(join_room))
        .route("/room-info/{room_name}", get(room_info))
        // Agent processes
        .route("/invite-avatar", post(invite_avatar))
        .route("/cleanup-avatar/{room_name}", post(cleanup_avatar))
        .route("/active-avatars", get(active_avatars))
        .route("/avatar-config", get(avatar_config))
        // Calls and push notifications
        .route("/register-token", post(register_token))
        .route("/registered-tokens", get(registered_tokens))
        .route("/initiate-call", post(initiate_call))
        .route("/active-calls", get(active_calls))
        // Memory-backed endpoints
        .route("/api/users", get(list_users))
        .route("/api/conversation-starters", post(starters))
        .with_state(state)
}
