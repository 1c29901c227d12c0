use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use studymate_traits::{ParticipantInfo, Room, RoomEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::avatar::is_avatar_identity;

/// Why the session is winding down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Departure {
    /// The last human participant left.
    ParticipantLeft(String),
    RoomClosed(String),
}

/// Log every remote participant at `interval` until aborted.
pub fn spawn_participant_logger(room: Arc<dyn Room>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            match room.participants().await {
                Ok(participants) => {
                    info!(room = %room.name(), count = participants.len(), "Room participants");
                    for p in &participants {
                        info!(
                            identity = %p.identity,
                            name = %p.name,
                            mic = p.microphone_enabled,
                            cam = p.camera_enabled,
                            "  participant"
                        );
                    }
                }
                Err(err) => warn!(room = %room.name(), error = %err, "Failed to list participants"),
            }
        }
    })
}

/// Tracks which humans are present and reports when the last one leaves.
pub(crate) struct DepartureWatcher {
    avatar_identity: Option<String>,
    present: HashSet<String>,
}

impl DepartureWatcher {
    pub(crate) fn new(avatar_identity: Option<String>, initial: &[ParticipantInfo]) -> Self {
        let mut watcher = Self {
            avatar_identity,
            present: HashSet::new(),
        };
        for participant in initial {
            if watcher.is_human(&participant.identity) {
                watcher.present.insert(participant.identity.clone());
            }
        }
        watcher
    }

    fn is_human(&self, identity: &str) -> bool {
        self.avatar_identity.as_deref() != Some(identity) && !is_avatar_identity(identity)
    }

    /// Log the event; return a departure when the session should end.
    pub(crate) fn observe(&mut self, event: &RoomEvent) -> Option<Departure> {
        match event {
            RoomEvent::ParticipantConnected(p) => {
                info!(identity = %p.identity, "Participant connected");
                if self.is_human(&p.identity) {
                    self.present.insert(p.identity.clone());
                }
                None
            }
            RoomEvent::ParticipantDisconnected(p) => {
                info!(identity = %p.identity, "Participant disconnected");
                if self.present.remove(&p.identity) && self.present.is_empty() {
                    return Some(Departure::ParticipantLeft(p.identity.clone()));
                }
                None
            }
            RoomEvent::TrackPublished { identity, kind } => {
                info!(identity = %identity, kind = ?kind, "Track published");
                None
            }
            RoomEvent::TrackUnpublished { identity, kind } => {
                debug!(identity = %identity, kind = ?kind, "Track unpublished");
                None
            }
            RoomEvent::Disconnected { reason } => Some(Departure::RoomClosed(reason.clone())),
        }
    }

    pub(crate) async fn wait(&mut self, events: &mut broadcast::Receiver<RoomEvent>) -> Departure {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Some(departure) = self.observe(&event) {
                        return departure;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Room event stream lagged");
                }
                Err(RecvError::Closed) => {
                    return Departure::RoomClosed("event stream closed".to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(identity: &str) -> ParticipantInfo {
        ParticipantInfo {
            identity: identity.to_string(),
            name: identity.to_string(),
            microphone_enabled: true,
            camera_enabled: false,
        }
    }

    #[test]
    fn avatar_leaving_is_not_a_departure() {
        let mut watcher = DepartureWatcher::new(
            Some("ai-assistant-1234abcd".into()),
            &[participant("henry-1"), participant("ai-assistant-1234abcd")],
        );
        assert_eq!(
            watcher.observe(&RoomEvent::ParticipantDisconnected(participant(
                "ai-assistant-1234abcd"
            ))),
            None
        );
        assert_eq!(
            watcher.observe(&RoomEvent::ParticipantDisconnected(participant("henry-1"))),
            Some(Departure::ParticipantLeft("henry-1".into()))
        );
    }

    #[test]
    fn departure_waits_for_last_human() {
        let mut watcher = DepartureWatcher::new(None, &[participant("henry-1")]);
        assert_eq!(
            watcher.observe(&RoomEvent::ParticipantConnected(participant("ada-2"))),
            None
        );
        assert_eq!(
            watcher.observe(&RoomEvent::ParticipantDisconnected(participant("henry-1"))),
            None
        );
        assert_eq!(
            watcher.observe(&RoomEvent::ParticipantDisconnected(participant("ada-2"))),
            Some(Departure::ParticipantLeft("ada-2".into()))
        );
    }

    #[test]
    fn room_close_ends_session() {
        let mut watcher = DepartureWatcher::new(None, &[]);
        assert_eq!(
            watcher.observe(&RoomEvent::Disconnected { reason: "deleted".into() }),
            Some(Departure::RoomClosed("deleted".into()))
        );
    }
}
