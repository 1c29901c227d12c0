//! Expo push notification delivery.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use studymate_traits::{Result, ServiceError};
use tracing::{debug, warn};

use crate::http::{build_client, check, transport};

const SERVICE: &str = "expo-push";
pub const EXPO_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub to: String,
    pub title: String,
    pub body: String,
    pub data: Value,
    pub sound: String,
    pub priority: String,
    #[serde(rename = "categoryId", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl PushMessage {
    pub fn new(
        to: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            to: to.into(),
            title: title.into(),
            body: body.into(),
            data,
            sound: "default".to_string(),
            priority: "high".to_string(),
            category_id: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

#[async_trait]
pub trait PushSender: Send + Sync {
    /// `Ok(true)` when the push service accepted the message.
    async fn send(&self, message: &PushMessage) -> Result<bool>;
}

pub struct ExpoPushClient {
    client: Client,
    url: String,
}

impl Default for ExpoPushClient {
    fn default() -> Self {
        Self::new(EXPO_PUSH_URL)
    }
}

impl ExpoPushClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: build_client(Duration::from_secs(10)),
            url: url.into(),
        }
    }
}

#[async_trait]
impl PushSender for ExpoPushClient {
    async fn send(&self, message: &PushMessage) -> Result<bool> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(message)
            .send()
            .await
            .map_err(|e| transport(SERVICE, e))?;
        let body: Value = check(SERVICE, response)
            .await?
            .json()
            .await
            .map_err(|e| ServiceError::invalid_response(SERVICE, e))?;

        let accepted = body["data"]["status"] == "ok";
        if accepted {
            debug!(to = %preview(&message.to), "Push accepted");
        } else {
            warn!(to = %preview(&message.to), response = %body, "Push rejected");
        }
        Ok(accepted)
    }
}

/// First 20 characters followed by `...`.
pub fn preview(token: &str) -> String {
    let head: String = token.chars().take(20).collect();
    format!("{head}...")
}
