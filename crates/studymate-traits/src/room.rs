//! Real-time media room abstractions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Snapshot of one remote participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub microphone_enabled: bool,
    #[serde(default)]
    pub camera_enabled: bool,
}

impl ParticipantInfo {
    pub fn track_enabled(&self, kind: TrackKind) -> bool {
        match kind {
            TrackKind::Audio => self.microphone_enabled,
            TrackKind::Video => self.camera_enabled,
        }
    }
}

/// Participant and track lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    ParticipantConnected(ParticipantInfo),
    ParticipantDisconnected(ParticipantInfo),
    TrackPublished { identity: String, kind: TrackKind },
    TrackUnpublished { identity: String, kind: TrackKind },
    /// The room itself is gone or the connection was lost.
    Disconnected { reason: String },
}

/// A connected room.
#[async_trait]
pub trait Room: Send + Sync {
    fn name(&self) -> &str;

    /// Current remote participants.
    async fn participants(&self) -> Result<Vec<ParticipantInfo>>;

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent>;

    async fn disconnect(&self);
}

#[async_trait]
pub trait RoomConnector: Send + Sync {
    async fn connect(&self, room_name: &str) -> Result<Arc<dyn Room>>;
}
