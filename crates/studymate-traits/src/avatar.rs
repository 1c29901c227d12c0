//! Avatar rendering sub-session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::room::Room;

/// A running avatar session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarHandle {
    /// Identity the avatar joins the room with.
    pub participant_identity: String,
    /// Provider-side session id.
    pub session_id: String,
}

#[async_trait]
pub trait AvatarService: Send + Sync {
    /// Attach an avatar to `room`.
    async fn start(&self, room: &dyn Room) -> Result<AvatarHandle>;

    async fn stop(&self, handle: &AvatarHandle) -> Result<()>;
}
