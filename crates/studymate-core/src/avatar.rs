//! Tavus avatar sessions.
//!
//! Starting an avatar asks Tavus to join the room as its own participant,
//! using a join token minted here for a fresh `ai-assistant-*` identity.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use studymate_traits::{AvatarHandle, AvatarService, Result, Room, ServiceError};
use tracing::info;

use crate::config::AvatarConfig;
use crate::credentials::{CredentialIssuer, random_identity};
use crate::http::{build_client, check, transport};

const SERVICE: &str = "tavus";

/// Every avatar participant identity starts with this.
pub const AVATAR_IDENTITY_PREFIX: &str = "ai-assistant";
pub const AVATAR_DISPLAY_NAME: &str = "AI Assistant";

pub fn is_avatar_identity(identity: &str) -> bool {
    identity.starts_with(AVATAR_IDENTITY_PREFIX)
}

#[derive(Deserialize)]
struct ConversationCreated {
    conversation_id: String,
    #[serde(default)]
    status: Option<String>,
}

pub struct TavusAvatarService {
    client: Client,
    config: AvatarConfig,
    issuer: CredentialIssuer,
}

impl TavusAvatarService {
    pub fn new(config: AvatarConfig, issuer: CredentialIssuer) -> Self {
        Self {
            client: build_client(Duration::from_secs(30)),
            config,
            issuer,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl AvatarService for TavusAvatarService {
    async fn start(&self, room: &dyn Room) -> Result<AvatarHandle> {
        let identity = random_identity(AVATAR_IDENTITY_PREFIX, 8);
        let token = self
            .issuer
            .issue(&identity, Some(AVATAR_DISPLAY_NAME), room.name())
            .map_err(|e| ServiceError::Config(e.to_string()))?;

        let response = self
            .client
            .post(self.url("/v2/conversations"))
            .header("x-api-key", &self.config.api_key)
            .json(&json!({
                "replica_id": self.config.replica_id,
                "persona_id": self.config.persona_id,
                "properties": {
                    "livekit_ws_url": token.url,
                    "livekit_room_token": token.token,
                },
            }))
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        let created: ConversationCreated = check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::invalid_response(SERVICE, e))?;

        info!(
            room = %room.name(),
            identity = %identity,
            conversation = %created.conversation_id,
            status = created.status.as_deref().unwrap_or("unknown"),
            "Avatar session created"
        );
        Ok(AvatarHandle {
            participant_identity: identity,
            session_id: created.conversation_id,
        })
    }

    async fn stop(&self, handle: &AvatarHandle) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/v2/conversations/{}/end", handle.session_id)))
            .header("x-api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        check(SERVICE, response).await?;
        info!(conversation = %handle.session_id, "Avatar session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LiveKitConfig;
    use crate::testkit::FakeRoom;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> TavusAvatarService {
        let mut config = AvatarConfig::new("tv-key", "r-123", "p-456");
        config.base_url = server.uri();
        let issuer =
            CredentialIssuer::new(LiveKitConfig::new("wss://lk.example", "key", "secret")).unwrap();
        TavusAvatarService::new(config, issuer)
    }

    #[tokio::test]
    async fn start_creates_conversation_for_room() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/conversations"))
            .and(header("x-api-key", "tv-key"))
            .and(body_partial_json(json!({
                "replica_id": "r-123",
                "persona_id": "p-456",
                "properties": {"livekit_ws_url": "wss://lk.example"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "conversation_id": "c-789",
                "status": "active"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let room = FakeRoom::new("room-1");
        let handle = service(&server).start(room.as_ref()).await.unwrap();
        assert_eq!(handle.session_id, "c-789");
        assert!(is_avatar_identity(&handle.participant_identity));
        assert_eq!(handle.participant_identity.len(), "ai-assistant-".len() + 8);
    }

    #[tokio::test]
    async fn rejected_start_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(402).set_body_string("out of credits"))
            .mount(&server)
            .await;

        let room = FakeRoom::new("room-1");
        let err = service(&server).start(room.as_ref()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Http { status: 402, .. }));
    }

    #[tokio::test]
    async fn stop_ends_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/conversations/c-789/end"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let handle = AvatarHandle {
            participant_identity: "ai-assistant-00000000".into(),
            session_id: "c-789".into(),
        };
        service(&server).stop(&handle).await.unwrap();
    }
}
