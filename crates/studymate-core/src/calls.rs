//! Push-token and call registries.
//!
//! Both are process-lifetime stores owned by [`crate::AppCore`]; nothing
//! survives a restart.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::RngExt;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::push::{PushMessage, PushSender, preview};

pub const NOTIFICATION_MESSAGES: [&str; 5] = [
    "Hey! Your AI study buddy is online and ready to help!",
    "Come chat with your AI tutor - they're waiting to assist you!",
    "Your AI learning companion is here! Let's study together!",
    "Ready for some AI-powered study help? Come online now!",
    "Your AI mentor is available! Time for a learning session!",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushRegistration {
    pub user_id: Option<String>,
    pub device_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPreview {
    pub token_preview: String,
    pub user_id: Option<String>,
    pub device_name: Option<String>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PushTokenRegistry {
    tokens: RwLock<HashMap<String, PushRegistration>>,
}

impl PushTokenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a device token. Returns the new total.
    pub fn register(
        &self,
        token: &str,
        user_id: Option<String>,
        device_name: Option<String>,
    ) -> usize {
        let mut tokens = self.tokens.write();
        tokens.insert(
            token.to_string(),
            PushRegistration {
                user_id,
                device_name,
                registered_at: Utc::now(),
            },
        );
        info!(token = %preview(token), total = tokens.len(), "Registered push token");
        tokens.len()
    }

    /// Tokens for `user_id`, or every token when no target is given.
    pub fn targets(&self, user_id: Option<&str>) -> Vec<String> {
        let tokens = self.tokens.read();
        let mut targets: Vec<String> = tokens
            .iter()
            .filter(|(_, registration)| match user_id {
                Some(user_id) => registration.user_id.as_deref() == Some(user_id),
                None => true,
            })
            .map(|(token, _)| token.clone())
            .collect();
        targets.sort();
        targets
    }

    pub fn previews(&self) -> Vec<TokenPreview> {
        let mut previews: Vec<TokenPreview> = self
            .tokens
            .read()
            .iter()
            .map(|(token, registration)| TokenPreview {
                token_preview: preview(token),
                user_id: registration.user_id.clone(),
                device_name: registration.device_name.clone(),
                registered_at: registration.registered_at,
            })
            .collect();
        previews.sort_by_key(|preview| preview.registered_at);
        previews
    }

    pub fn len(&self) -> usize {
        self.tokens.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallRecord {
    pub call_id: String,
    pub room_name: String,
    pub caller_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    pub call: CallRecord,
    /// Devices the call was addressed to.
    pub targets: usize,
    /// Deliveries the push service accepted.
    pub notifications_sent: usize,
}

pub struct CallRegistry {
    calls: RwLock<HashMap<String, CallRecord>>,
    tokens: Arc<PushTokenRegistry>,
    push: Arc<dyn PushSender>,
}

impl CallRegistry {
    pub fn new(tokens: Arc<PushTokenRegistry>, push: Arc<dyn PushSender>) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            tokens,
            push,
        }
    }

    pub fn tokens(&self) -> &Arc<PushTokenRegistry> {
        &self.tokens
    }

    /// Record a call and notify the target devices. Delivery failures are
    /// logged per device and never fail the call.
    pub async fn initiate(
        &self,
        room_name: &str,
        caller_name: &str,
        target_user_id: Option<&str>,
    ) -> CallOutcome {
        let call = CallRecord {
            call_id: format!("call_{}", &Uuid::new_v4().simple().to_string()[..8]),
            room_name: room_name.to_string(),
            caller_name: caller_name.to_string(),
            status: "initiated".to_string(),
            created_at: Utc::now(),
        };
        self.calls.write().insert(call.call_id.clone(), call.clone());

        let targets = self.tokens.targets(target_user_id);
        let mut notifications_sent = 0;
        for token in &targets {
            let body = {
                let mut rng = rand::rng();
                NOTIFICATION_MESSAGES[rng.random_range(0..NOTIFICATION_MESSAGES.len())]
            };
            let message = PushMessage::new(
                token.clone(),
                format!("{caller_name} wants to connect with you"),
                body,
                json!({
                    "type": "incoming_call",
                    "call_id": call.call_id,
                    "room_name": room_name,
                    "caller_name": caller_name,
                    "action": "answer_call",
                }),
            )
            .with_category("incoming-call");

            match self.push.send(&message).await {
                Ok(true) => notifications_sent += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(token = %preview(token), error = %err, "Failed to send call notification")
                }
            }
        }

        info!(
            call = %call.call_id,
            room = %room_name,
            caller = %caller_name,
            targets = targets.len(),
            notifications_sent,
            "Call initiated"
        );
        CallOutcome {
            call,
            targets: targets.len(),
            notifications_sent,
        }
    }

    /// Calls ordered by creation time.
    pub fn active(&self) -> Vec<CallRecord> {
        let mut calls: Vec<CallRecord> = self.calls.read().values().cloned().collect();
        calls.sort_by_key(|call| call.created_at);
        calls
    }
}
