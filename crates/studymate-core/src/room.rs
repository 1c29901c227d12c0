//! LiveKit room service client.
//!
//! The agent does not carry a media stack. It "connects" by authenticating
//! against the room service, then polls `ListParticipants` and turns
//! membership changes into [`RoomEvent`]s. LiveKit creates a room when its
//! first participant joins; until then the room reads as empty.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use studymate_traits::{
    ParticipantInfo, Result, Room, RoomConnector, RoomEvent, ServiceError, TrackKind,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::credentials::CredentialIssuer;
use crate::http::{build_client, check, transport};

const SERVICE: &str = "livekit";
const AGENT_IDENTITY: &str = "studymate-agent";
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct RoomPollConfig {
    pub interval: Duration,
    /// Consecutive poll failures before the room counts as disconnected.
    pub max_failures: u32,
}

impl Default for RoomPollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_failures: 5,
        }
    }
}

/// Thin Twirp client for `livekit.RoomService`.
#[derive(Clone)]
pub struct RoomServiceClient {
    client: Client,
    issuer: CredentialIssuer,
    base_url: String,
}

#[derive(Deserialize)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<RawParticipant>,
}

#[derive(Deserialize)]
struct RawParticipant {
    identity: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tracks: Vec<RawTrack>,
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "type", default)]
    kind: Value,
    #[serde(default)]
    muted: bool,
}

impl RawTrack {
    /// Protobuf JSON encodes the enum by name or number and omits `AUDIO` (0).
    fn kind(&self) -> Option<TrackKind> {
        match &self.kind {
            Value::String(name) if name == "AUDIO" => Some(TrackKind::Audio),
            Value::String(name) if name == "VIDEO" => Some(TrackKind::Video),
            Value::Number(n) if n.as_u64() == Some(0) => Some(TrackKind::Audio),
            Value::Number(n) if n.as_u64() == Some(1) => Some(TrackKind::Video),
            Value::Null => Some(TrackKind::Audio),
            _ => None,
        }
    }
}

impl From<RawParticipant> for ParticipantInfo {
    fn from(raw: RawParticipant) -> Self {
        let enabled = |kind: TrackKind| {
            raw.tracks
                .iter()
                .any(|track| track.kind() == Some(kind) && !track.muted)
        };
        ParticipantInfo {
            microphone_enabled: enabled(TrackKind::Audio),
            camera_enabled: enabled(TrackKind::Video),
            name: if raw.name.is_empty() {
                raw.identity.clone()
            } else {
                raw.name.clone()
            },
            identity: raw.identity,
        }
    }
}

impl RoomServiceClient {
    pub fn new(issuer: CredentialIssuer) -> Self {
        let base_url = issuer.config().http_url();
        Self {
            client: build_client(Duration::from_secs(10)),
            issuer,
            base_url,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn list_participants(&self, room_name: &str) -> Result<Vec<ParticipantInfo>> {
        let token = self
            .issuer
            .issue_admin(AGENT_IDENTITY, room_name)
            .map_err(|e| ServiceError::Config(e.to_string()))?;
        let response = self
            .client
            .post(format!(
                "{}/twirp/livekit.RoomService/ListParticipants",
                self.base_url
            ))
            .bearer_auth(token)
            .json(&json!({ "room": room_name }))
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        if response.status() == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            if twirp_code(&body).as_deref() == Some("not_found") {
                debug!(room = %room_name, "Room not created yet, treating as empty");
                return Ok(Vec::new());
            }
            return Err(ServiceError::Http {
                service: SERVICE.to_string(),
                status: StatusCode::NOT_FOUND.as_u16(),
                message: body,
            });
        }
        let body: ListParticipantsResponse = check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::invalid_response(SERVICE, e))?;
        Ok(body.participants.into_iter().map(ParticipantInfo::from).collect())
    }
}

/// Twirp error bodies are `{"code": "...", "msg": "..."}`.
fn twirp_code(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct TwirpError {
        code: String,
    }
    serde_json::from_str::<TwirpError>(body)
        .ok()
        .map(|error| error.code)
}

/// Events that turn `prev` into `next`.
pub fn diff_participants(
    prev: &BTreeMap<String, ParticipantInfo>,
    next: &BTreeMap<String, ParticipantInfo>,
) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    for (identity, before) in prev {
        if !next.contains_key(identity) {
            events.push(RoomEvent::ParticipantDisconnected(before.clone()));
        }
    }
    for (identity, after) in next {
        let Some(before) = prev.get(identity) else {
            events.push(RoomEvent::ParticipantConnected(after.clone()));
            for kind in [TrackKind::Audio, TrackKind::Video] {
                if after.track_enabled(kind) {
                    events.push(RoomEvent::TrackPublished {
                        identity: identity.clone(),
                        kind,
                    });
                }
            }
            continue;
        };
        for kind in [TrackKind::Audio, TrackKind::Video] {
            match (before.track_enabled(kind), after.track_enabled(kind)) {
                (false, true) => events.push(RoomEvent::TrackPublished {
                    identity: identity.clone(),
                    kind,
                }),
                (true, false) => events.push(RoomEvent::TrackUnpublished {
                    identity: identity.clone(),
                    kind,
                }),
                _ => {}
            }
        }
    }
    events
}

fn index(participants: Vec<ParticipantInfo>) -> BTreeMap<String, ParticipantInfo> {
    participants
        .into_iter()
        .map(|p| (p.identity.clone(), p))
        .collect()
}

/// A room observed through the room service.
pub struct LiveKitRoom {
    name: String,
    service: RoomServiceClient,
    events: broadcast::Sender<RoomEvent>,
    poller: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl LiveKitRoom {
    async fn poll_loop(
        name: String,
        service: RoomServiceClient,
        events: broadcast::Sender<RoomEvent>,
        mut known: BTreeMap<String, ParticipantInfo>,
        config: RoomPollConfig,
    ) {
        let mut failures = 0u32;
        loop {
            tokio::time::sleep(config.interval).await;
            match service.list_participants(&name).await {
                Ok(participants) => {
                    failures = 0;
                    let next = index(participants);
                    for event in diff_participants(&known, &next) {
                        let _ = events.send(event);
                    }
                    known = next;
                }
                Err(err) => {
                    failures += 1;
                    warn!(room = %name, failures, error = %err, "Room poll failed");
                    if failures >= config.max_failures {
                        let _ = events.send(RoomEvent::Disconnected {
                            reason: format!("room service unreachable: {err}"),
                        });
                        break;
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Room for LiveKitRoom {
    fn name(&self) -> &str {
        &self.name
    }

    async fn participants(&self) -> Result<Vec<ParticipantInfo>> {
        self.service.list_participants(&self.name).await
    }

    fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.events.subscribe()
    }

    async fn disconnect(&self) {
        let poller = self
            .poller
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());
        if let Some(poller) = poller {
            poller.abort();
            info!(room = %self.name, "Left room");
        }
    }
}

impl Drop for LiveKitRoom {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.poller.lock()
            && let Some(poller) = slot.take()
        {
            poller.abort();
        }
    }
}

pub struct LiveKitConnector {
    service: RoomServiceClient,
    config: RoomPollConfig,
}

impl LiveKitConnector {
    pub fn new(service: RoomServiceClient) -> Self {
        Self {
            service,
            config: RoomPollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, config: RoomPollConfig) -> Self {
        self.config = config;
        self
    }
}

#[async_trait]
impl RoomConnector for LiveKitConnector {
    async fn connect(&self, room_name: &str) -> Result<Arc<dyn Room>> {
        let initial = self.service.list_participants(room_name).await?;
        debug!(room = %room_name, participants = initial.len(), "Room service reachable");

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        // Participants already present are announced to the first poll's subscribers.
        let poller = tokio::spawn(LiveKitRoom::poll_loop(
            room_name.to_string(),
            self.service.clone(),
            events.clone(),
            BTreeMap::new(),
            self.config.clone(),
        ));

        Ok(Arc::new(LiveKitRoom {
            name: room_name.to_string(),
            service: self.service.clone(),
            events,
            poller: std::sync::Mutex::new(Some(poller)),
        }))
    }
}
