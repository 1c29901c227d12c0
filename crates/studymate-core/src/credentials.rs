//! Room access tokens.
//!
//! Tokens are LiveKit-compatible HS256 JWTs signed with the API secret. The
//! grant always carries `roomJoin` for exactly one room; `roomAdmin` is
//! added for the server-side room service calls the agent makes.

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::RngExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LiveKitConfig;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential issuer is missing {0}")]
    MissingCredential(&'static str),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("failed to sign access token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoGrant {
    pub room: String,
    pub room_join: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub room_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_publish: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub can_subscribe: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub nbf: i64,
    pub exp: i64,
    pub video: VideoGrant,
}

/// A token ready to hand to a client.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub identity: String,
    pub room: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct CredentialIssuer {
    config: LiveKitConfig,
}

impl CredentialIssuer {
    pub fn new(config: LiveKitConfig) -> Result<Self, CredentialError> {
        if config.url.trim().is_empty() {
            return Err(CredentialError::MissingCredential("LIVEKIT_URL"));
        }
        if config.api_key.trim().is_empty() {
            return Err(CredentialError::MissingCredential("LIVEKIT_API_KEY"));
        }
        if config.api_secret.trim().is_empty() {
            return Err(CredentialError::MissingCredential("LIVEKIT_API_SECRET"));
        }
        Ok(Self { config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn config(&self) -> &LiveKitConfig {
        &self.config
    }

    /// Issue a join token for `identity` in `room`.
    pub fn issue(
        &self,
        identity: &str,
        display_name: Option<&str>,
        room: &str,
    ) -> Result<IssuedToken, CredentialError> {
        let grant = VideoGrant {
            room: room.to_string(),
            room_join: true,
            ..VideoGrant::default()
        };
        let token = self.sign(identity, display_name, grant, self.config.token_ttl)?;
        Ok(IssuedToken {
            token,
            identity: identity.to_string(),
            room: room.to_string(),
            url: self.config.url.clone(),
        })
    }

    /// Token for room service calls (listing participants) scoped to `room`.
    pub fn issue_admin(&self, identity: &str, room: &str) -> Result<String, CredentialError> {
        let grant = VideoGrant {
            room: room.to_string(),
            room_join: true,
            room_admin: true,
            ..VideoGrant::default()
        };
        self.sign(identity, None, grant, Duration::from_secs(10 * 60))
    }

    fn sign(
        &self,
        identity: &str,
        display_name: Option<&str>,
        grant: VideoGrant,
        ttl: Duration,
    ) -> Result<String, CredentialError> {
        if identity.trim().is_empty() {
            return Err(CredentialError::EmptyField("identity"));
        }
        if grant.room.trim().is_empty() {
            return Err(CredentialError::EmptyField("room"));
        }

        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            iss: self.config.api_key.clone(),
            sub: identity.to_string(),
            name: display_name
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string),
            nbf: now,
            exp: now + ttl.as_secs() as i64,
            video: grant,
        };
        let key = EncodingKey::from_secret(self.config.api_secret.as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &key)?)
    }
}

/// `{prefix}-{n lowercase hex chars}`.
pub fn random_identity(prefix: &str, hex_len: usize) -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::rng();
    let suffix: String = (0..hex_len)
        .map(|_| HEX[rng.random_range(0..HEX.len())] as char)
        .collect();
    format!("{prefix}-{suffix}")
}
